mod common;

use std::path::Path;

use proptest::prelude::*;

use regen::{ChangeKind, ChangeLog, FsEventKind};

const ROOT: &str = "/project";

fn record(log: &mut ChangeLog, rel: &str, kind: FsEventKind) {
    let path = Path::new(ROOT).join(rel);
    log.record(Path::new(ROOT), &path, kind);
}

#[test]
fn change_does_not_overwrite_add() {
    let mut log = ChangeLog::new();
    record(&mut log, "a.txt", FsEventKind::Add);
    record(&mut log, "a.txt", FsEventKind::Change);

    let changes = log.drain();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].kind, ChangeKind::Add);
}

#[test]
fn change_does_not_overwrite_unlink() {
    let mut log = ChangeLog::new();
    record(&mut log, "a.txt", FsEventKind::Unlink);
    record(&mut log, "a.txt", FsEventKind::Change);

    let changes = log.drain();
    assert_eq!(changes[0].kind, ChangeKind::Unlink);
}

#[test]
fn repeated_add_unlink_keeps_latest() {
    let mut log = ChangeLog::new();
    record(&mut log, "a.txt", FsEventKind::Add);
    record(&mut log, "a.txt", FsEventKind::Unlink);
    record(&mut log, "a.txt", FsEventKind::Add);

    let changes = log.drain();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].kind, ChangeKind::Add);
}

#[test]
fn directory_kinds_collapse() {
    let mut log = ChangeLog::new();
    record(&mut log, "dir", FsEventKind::AddDir);
    record(&mut log, "gone", FsEventKind::UnlinkDir);

    let changes = log.drain();
    assert_eq!(changes[0].kind, ChangeKind::Add);
    assert_eq!(changes[1].kind, ChangeKind::Unlink);
}

#[test]
fn order_is_first_observation_order() {
    let mut log = ChangeLog::new();
    record(&mut log, "b.txt", FsEventKind::Change);
    record(&mut log, "a.txt", FsEventKind::Add);
    record(&mut log, "b.txt", FsEventKind::Unlink);

    let changes = log.drain();
    let rels: Vec<_> = changes.iter().map(|c| c.rel_path.clone()).collect();
    assert_eq!(rels, vec![Path::new("b.txt"), Path::new("a.txt")]);
}

#[test]
fn rel_path_is_root_relative() {
    let mut log = ChangeLog::new();
    record(&mut log, "sub/a.txt", FsEventKind::Change);

    let changes = log.drain();
    assert_eq!(changes[0].rel_path, Path::new("sub/a.txt"));
    assert_eq!(changes[0].path, Path::new(ROOT).join("sub/a.txt"));
}

#[test]
fn drain_clears_everything() {
    let mut log = ChangeLog::new();
    record(&mut log, "a.txt", FsEventKind::Add);
    log.mark_critical();

    assert!(log.is_critical());
    let changes = log.drain();
    assert_eq!(changes.len(), 1);
    assert!(log.is_empty());
    assert!(!log.is_critical());
}

/// Reference fold of an event sequence for one path.
fn fold_reference(kinds: &[FsEventKind]) -> ChangeKind {
    let mut folded = kinds[0].fold();
    for kind in &kinds[1..] {
        let next = kind.fold();
        if next == ChangeKind::Change && folded != ChangeKind::Change {
            continue;
        }
        folded = next;
    }
    folded
}

fn kind_strategy() -> impl Strategy<Value = FsEventKind> {
    prop_oneof![
        Just(FsEventKind::Add),
        Just(FsEventKind::AddDir),
        Just(FsEventKind::Change),
        Just(FsEventKind::Unlink),
        Just(FsEventKind::UnlinkDir),
    ]
}

proptest! {
    /// One entry per path, folded per the reference rules, in first-seen
    /// order.
    #[test]
    fn fold_laws(events in proptest::collection::vec((0usize..4, kind_strategy()), 1..40)) {
        let names = ["a", "b", "c", "d"];
        let mut log = ChangeLog::new();
        for (slot, kind) in &events {
            record(&mut log, names[*slot], *kind);
        }

        let changes = log.drain();

        // No duplicate paths.
        let mut seen = std::collections::HashSet::new();
        for change in &changes {
            prop_assert!(seen.insert(change.path.clone()));
        }

        // Each entry folds like the reference.
        for change in &changes {
            let kinds: Vec<FsEventKind> = events
                .iter()
                .filter(|(slot, _)| Path::new(ROOT).join(names[*slot]) == change.path)
                .map(|(_, kind)| *kind)
                .collect();
            prop_assert_eq!(change.kind, fold_reference(&kinds));
        }

        // Order is first observation order.
        let mut first_seen = Vec::new();
        for (slot, _) in &events {
            let path = Path::new(ROOT).join(names[*slot]);
            if !first_seen.contains(&path) {
                first_seen.push(path);
            }
        }
        let logged: Vec<_> = changes.iter().map(|c| c.path.clone()).collect();
        prop_assert_eq!(logged, first_seen);
    }
}
