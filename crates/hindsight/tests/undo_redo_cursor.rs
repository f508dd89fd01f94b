use hindsight::{History, HistoryError, Seek};
use hindsight_scope::ScopeTree;
use proptest::prelude::*;
use serde_json::{json, Value};

fn tracked(values: &[Value]) -> (ScopeTree, History) {
    let tree = ScopeTree::new();
    let root = tree.root();
    tree.assign(root, "n", values[0].clone()).unwrap();
    let history = History::new(tree.clone());
    history.watch(&["n"], root, None, None).unwrap();
    tree.digest();
    for value in &values[1..] {
        tree.assign(root, "n", value.clone()).unwrap();
        tree.digest();
    }
    (tree, history)
}

#[test]
fn cursor_tracks_the_latest_archive() {
    let values = vec![json!("base"), json!(1), json!(2), json!(3)];
    let (_, history) = tracked(&values);
    let root = history.tree().root();
    assert_eq!(history.cursor(root, "n"), Some(3));
    assert_eq!(history.entries(root, "n").unwrap(), values);
}

#[test]
fn undo_at_the_baseline_is_a_warned_noop() {
    let (tree, history) = tracked(&[json!("base")]);
    let root = tree.root();
    assert!(!history.can_undo("n", root));
    assert_eq!(history.undo("n", root).unwrap(), Seek::AtBoundary);
    assert_eq!(history.cursor(root, "n"), Some(0));
    assert_eq!(tree.resolve(root, "n").unwrap(), Some(json!("base")));
}

#[test]
fn redo_at_the_end_is_a_warned_noop() {
    let (tree, history) = tracked(&[json!("base"), json!(1)]);
    let root = tree.root();
    assert!(!history.can_redo("n", root));
    assert_eq!(history.redo("n", root).unwrap(), Seek::AtBoundary);
    assert_eq!(history.cursor(root, "n"), Some(1));
    assert_eq!(tree.resolve(root, "n").unwrap(), Some(json!(1)));
}

#[test]
fn seeking_an_unwatched_path_is_fatal() {
    let (_, history) = tracked(&[json!("base")]);
    let root = history.tree().root();
    assert!(matches!(
        history.undo("missing", root),
        Err(HistoryError::NoHistory { .. })
    ));
    assert!(matches!(
        history.redo("missing", root),
        Err(HistoryError::NoHistory { .. })
    ));
}

#[test]
fn undo_steps_back_and_redo_replays_forward() {
    let values = vec![json!("base"), json!(1), json!(2), json!(3)];
    let (tree, history) = tracked(&values);
    let root = tree.root();

    for expected in values.iter().rev().skip(1) {
        let seek = history.undo("n", root).unwrap();
        assert!(seek.is_applied());
        assert_eq!(tree.resolve(root, "n").unwrap(), Some(expected.clone()));
        tree.digest();
    }
    assert_eq!(history.cursor(root, "n"), Some(0));

    for expected in values.iter().skip(1) {
        let seek = history.redo("n", root).unwrap();
        assert!(seek.is_applied());
        assert_eq!(tree.resolve(root, "n").unwrap(), Some(expected.clone()));
        tree.digest();
    }
    assert_eq!(history.cursor(root, "n"), Some(values.len() - 1));
    assert_eq!(history.entries(root, "n").unwrap(), values);
}

#[test]
fn revert_preserves_redo_entries() {
    let values = vec![json!("base"), json!(1), json!(2), json!(3)];
    let (tree, history) = tracked(&values);
    let root = tree.root();

    let seek = history.revert_to("n", root, 1).unwrap();
    assert_eq!(
        seek,
        Seek::Applied {
            old_value: json!(3),
            new_value: json!(1),
        }
    );
    tree.digest();
    assert_eq!(history.cursor(root, "n"), Some(1));
    assert_eq!(history.entries(root, "n").unwrap().len(), 4);

    // Redo can still walk forward to the pre-revert value.
    history.redo("n", root).unwrap();
    tree.digest();
    history.redo("n", root).unwrap();
    tree.digest();
    assert_eq!(tree.resolve(root, "n").unwrap(), Some(json!(3)));
    assert_eq!(history.cursor(root, "n"), Some(3));
}

#[test]
fn revert_to_baseline_by_default() {
    let (tree, history) = tracked(&[json!("base"), json!(1), json!(2)]);
    let root = tree.root();
    history.revert("n", root).unwrap();
    assert_eq!(tree.resolve(root, "n").unwrap(), Some(json!("base")));
    assert_eq!(history.cursor(root, "n"), Some(0));
}

#[test]
fn revert_with_nothing_to_revert_is_a_warned_noop() {
    let (_, history) = tracked(&[json!("base")]);
    let root = history.tree().root();
    assert_eq!(history.revert("missing", root).unwrap(), Seek::AtBoundary);
    assert_eq!(history.revert_to("n", root, 5).unwrap(), Seek::AtBoundary);
    assert_eq!(history.cursor(root, "n"), Some(0));
}

#[test]
fn new_write_after_undo_truncates_the_redo_branch() {
    let (tree, history) = tracked(&[json!("base"), json!(1), json!(2)]);
    let root = tree.root();
    history.undo("n", root).unwrap();
    tree.digest();
    tree.assign(root, "n", json!(9)).unwrap();
    tree.digest();
    assert_eq!(
        history.entries(root, "n").unwrap(),
        vec![json!("base"), json!(1), json!(9)]
    );
    assert_eq!(history.cursor(root, "n"), Some(2));
    assert!(!history.can_redo("n", root));
}

proptest! {
    // After N archives the cursor is N-1, and N-1 undos followed by N-1
    // redos reproduce the exact value sequence.
    #[test]
    fn undo_redo_round_trip(raw in prop::collection::vec(any::<i64>(), 1..7)) {
        let mut values = vec![json!("base")];
        for v in raw {
            let candidate = json!(v);
            if values.last() != Some(&candidate) {
                values.push(candidate);
            }
        }

        let (tree, history) = tracked(&values);
        let root = tree.root();
        prop_assert_eq!(history.cursor(root, "n"), Some(values.len() - 1));

        for expected in values.iter().rev().skip(1) {
            history.undo("n", root).unwrap();
            tree.digest();
            let resolved = tree.resolve(root, "n").unwrap();
            prop_assert_eq!(resolved.as_ref(), Some(expected));
        }
        for expected in values.iter().skip(1) {
            history.redo("n", root).unwrap();
            tree.digest();
            let resolved = tree.resolve(root, "n").unwrap();
            prop_assert_eq!(resolved.as_ref(), Some(expected));
        }
        prop_assert_eq!(history.entries(root, "n").unwrap(), values);
    }
}
