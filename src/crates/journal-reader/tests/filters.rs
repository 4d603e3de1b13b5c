//! Integration tests for match filters

mod common;

use common::{drain_calls, ScriptedBackend};
use journal_reader::{FilterTerm, Journal, MatchGroup, MemoryStore, OpenOptions};

fn populated() -> MemoryStore {
    let store = MemoryStore::new();
    let rows = [
        ("ssh.service", "6", "accepted key"),
        ("nginx.service", "3", "upstream timed out"),
        ("ssh.service", "3", "auth failure"),
        ("cron.service", "6", "job started"),
        ("nginx.service", "6", "reloaded"),
    ];
    for (unit, priority, message) in rows {
        store.append([
            ("_SYSTEMD_UNIT", unit),
            ("PRIORITY", priority),
            ("MESSAGE", message),
        ]);
    }
    store
}

fn messages<B: journal_reader::Backend>(journal: &mut Journal<B>) -> Vec<String> {
    journal
        .entries()
        .unwrap()
        .map(|e| e.unwrap().message().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn test_filter_pushes_groups_separated_by_disjunction() {
    let (backend, script) = ScriptedBackend::new();
    let mut journal = Journal::open(backend, OpenOptions::default()).unwrap();
    drain_calls(&script);

    journal
        .filter(&[
            MatchGroup::new().with("priority", 1),
            MatchGroup::new().with("message", "x"),
        ])
        .unwrap();

    assert_eq!(
        drain_calls(&script),
        [
            "flush_matches",
            "add_match(PRIORITY=1)",
            "add_disjunction",
            "add_match(MESSAGE=x)"
        ]
    );
    assert_eq!(
        journal.filters(),
        [
            FilterTerm::matching("PRIORITY", 1),
            FilterTerm::Disjunction,
            FilterTerm::matching("MESSAGE", "x"),
        ]
    );
}

#[test]
fn test_backend_rejection_is_reported() {
    let (backend, script) = ScriptedBackend::new();
    let mut journal = Journal::open(backend, OpenOptions::default()).unwrap();
    script.lock().match_result = -libc::EINVAL;

    let err = journal.add_match("MESSAGE", "x").unwrap_err();
    assert_eq!(err.code(), Some(-libc::EINVAL));
    assert!(journal.filters().is_empty());
}

#[test]
fn test_invalid_field_name_is_rejected_by_store() {
    let store = populated();
    let mut journal = Journal::open(store.journal(), OpenOptions::default()).unwrap();

    let err = journal.add_match("not a field", "x").unwrap_err();
    assert_eq!(err.code(), Some(-libc::EINVAL));
}

#[test]
fn test_single_group_is_conjunction() {
    let store = populated();
    let mut journal = Journal::open(store.journal(), OpenOptions::default()).unwrap();

    journal
        .add_filters(
            &MatchGroup::new()
                .with("_systemd_unit", "ssh.service")
                .with("priority", 3),
        )
        .unwrap();
    assert_eq!(messages(&mut journal), ["auth failure"]);
}

#[test]
fn test_values_of_one_field_are_alternatives() {
    let store = populated();
    let mut journal = Journal::open(store.journal(), OpenOptions::default()).unwrap();

    let units = MatchGroup::new().with_any("_SYSTEMD_UNIT", ["cron.service", "nginx.service"]);
    journal.add_filters(&units).unwrap();
    assert_eq!(
        messages(&mut journal),
        ["upstream timed out", "job started", "reloaded"]
    );
}

#[test]
fn test_groups_are_ored() {
    let store = populated();
    let mut journal = Journal::open(store.journal(), OpenOptions::default()).unwrap();

    journal
        .filter(&[
            MatchGroup::new()
                .with("_SYSTEMD_UNIT", "nginx.service")
                .with("PRIORITY", 3),
            MatchGroup::new().with("MESSAGE", "job started"),
        ])
        .unwrap();
    assert_eq!(messages(&mut journal), ["upstream timed out", "job started"]);
}

#[test]
fn test_manual_disjunction() {
    let store = populated();
    let mut journal = Journal::open(store.journal(), OpenOptions::default()).unwrap();

    journal.add_match("_SYSTEMD_UNIT", "cron.service").unwrap();
    journal.add_disjunction().unwrap();
    journal.add_match("PRIORITY", 3).unwrap();
    journal.add_match("_SYSTEMD_UNIT", "ssh.service").unwrap();
    journal.add_conjunction().unwrap();
    journal.add_match("MESSAGE", "auth failure").unwrap();

    assert_eq!(messages(&mut journal), ["auth failure"]);
    assert_eq!(journal.filters().len(), 6);
}

#[test]
fn test_clear_filters_matches_everything() {
    let store = populated();
    let mut journal = Journal::open(store.journal(), OpenOptions::default()).unwrap();

    journal.add_match("PRIORITY", 3).unwrap();
    assert_eq!(messages(&mut journal).len(), 2);

    journal.clear_filters().unwrap();
    assert!(journal.filters().is_empty());
    assert_eq!(messages(&mut journal).len(), 5);
}
