use std::collections::BTreeMap;

use proptest::prelude::*;

use zboard::{BoardStore, Config, Widget};

#[derive(Debug, Clone)]
enum Op {
    Create { x: i32, y: i32, z: i32 },
    CreateAtTop { x: i32 },
    Update { pick: usize, x: i32, z: i32 },
    UpdateToTop { pick: usize, x: i32 },
    Delete { pick: usize },
    Vacuum,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..50i32, 0..50i32, 0..12i32).prop_map(|(x, y, z)| Op::Create { x, y, z }),
        1 => (0..50i32).prop_map(|x| Op::CreateAtTop { x }),
        2 => (0..8usize, 0..50i32, 0..12i32).prop_map(|(pick, x, z)| Op::Update { pick, x, z }),
        1 => (0..8usize, 0..50i32).prop_map(|(pick, x)| Op::UpdateToTop { pick, x }),
        2 => (0..8usize).prop_map(|pick| Op::Delete { pick }),
        1 => Just(Op::Vacuum),
    ]
}

/// Sequential reference: the visible board keyed by z. Placing a widget on
/// an occupied z moves the occupant and everything above it up by one.
fn place(board: &mut BTreeMap<i32, Widget>, widget: Widget) {
    if board.contains_key(&widget.z) {
        let tail = board.split_off(&widget.z);
        for (_, mut moved) in tail {
            moved.z += 1;
            board.insert(moved.z, moved);
        }
    }
    board.insert(widget.z, widget);
}

fn pick_live(board: &BTreeMap<i32, Widget>, pick: usize) -> Option<Widget> {
    if board.is_empty() {
        return None;
    }
    board.values().nth(pick % board.len()).copied()
}

fn assert_store_matches(store: &BoardStore, board: &BTreeMap<i32, Widget>) {
    assert_eq!(store.len(), board.len());
    let scanned: Vec<Widget> = store.range_by_z(i32::MIN, board.len() + 1).collect();
    let expected: Vec<Widget> = board.values().copied().collect();
    assert_eq!(scanned, expected);
    for widget in board.values() {
        assert_eq!(store.get_by_id(widget.id), Some(*widget));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn any_operation_sequence_matches_the_sequential_model(
        ops in prop::collection::vec(arb_op(), 1..40)
    ) {
        let store = BoardStore::with_config(Config::for_testing()).unwrap();
        let mut board: BTreeMap<i32, Widget> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Create { x, y, z } => {
                    let created = store.create(x, y, z, 1, 1).unwrap();
                    place(&mut board, created);
                }
                Op::CreateAtTop { x } => {
                    let created = store.create_at_top(x, 0, 1, 1).unwrap();
                    let expected_z = board.keys().next_back().map_or(0, |top| top + 1);
                    prop_assert_eq!(created.z, expected_z);
                    board.insert(created.z, created);
                }
                Op::Update { pick, x, z } => {
                    let Some(old) = pick_live(&board, pick) else { continue };
                    let updated = store.update(old.id, x, old.y, z, 1, 1).unwrap();
                    prop_assert_eq!(updated.z, z);
                    if updated != old {
                        board.remove(&old.z);
                        place(&mut board, updated);
                    }
                }
                Op::UpdateToTop { pick, x } => {
                    let Some(old) = pick_live(&board, pick) else { continue };
                    let top = board.keys().next_back().copied().unwrap();
                    let expected_z = if old.z == top { old.z } else { top + 1 };
                    let updated = store.update_to_top(old.id, x, old.y, 1, 1).unwrap();
                    prop_assert_eq!(updated.z, expected_z);
                    if updated != old {
                        board.remove(&old.z);
                        board.insert(updated.z, updated);
                    }
                }
                Op::Delete { pick } => {
                    let Some(victim) = pick_live(&board, pick) else { continue };
                    store.delete(victim.id).unwrap();
                    board.remove(&victim.z);
                }
                Op::Vacuum => {
                    store.vacuum();
                    // With no reader out, exactly the live versions remain.
                    prop_assert_eq!(store.version_count(), board.len());
                }
            }
            assert_store_matches(&store, &board);
        }
    }
}
