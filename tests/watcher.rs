//! Lock watcher against a real filesystem.
//!
//! Notifications arrive asynchronously, so every assertion polls with a
//! timeout.

mod support;

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use repoflow::engine::{EventFreezer, LockGate, LockWatcher, NullBus};
use support::{eventually, TestRepo};

const TIMEOUT: Duration = Duration::from_secs(5);

fn start(repo: &TestRepo) -> (LockWatcher, Arc<LockGate>, Arc<EventFreezer>) {
    let gate = Arc::new(LockGate::new());
    let freezer = Arc::new(EventFreezer::new(Arc::new(NullBus)));
    let watcher =
        LockWatcher::start(&repo.git_dir(), Arc::clone(&gate), Arc::clone(&freezer)).unwrap();
    (watcher, gate, freezer)
}

#[test]
fn index_lock_closes_and_reopens_gate() {
    let repo = TestRepo::new();
    let (watcher, gate, freezer) = start(&repo);
    let lock = repo.git_dir().join("index.lock");

    fs::write(&lock, "").unwrap();
    assert!(eventually(TIMEOUT, || !gate.is_open()));
    assert!(watcher.is_locked());
    assert!(eventually(TIMEOUT, || freezer.holders() == 1));

    fs::remove_file(&lock).unwrap();
    assert!(eventually(TIMEOUT, || gate.is_open()));
    assert!(eventually(TIMEOUT, || freezer.holders() == 0));
}

#[test]
fn rename_between_locks_stays_closed() {
    let repo = TestRepo::new();
    let (_watcher, gate, _freezer) = start(&repo);
    let a = repo.git_dir().join("a.lock");
    let b = repo.git_dir().join("b.lock");

    fs::write(&a, "").unwrap();
    assert!(eventually(TIMEOUT, || !gate.is_open()));

    fs::rename(&a, &b).unwrap();
    thread::sleep(Duration::from_millis(200));
    assert!(!gate.is_open());

    fs::remove_file(&b).unwrap();
    assert!(eventually(TIMEOUT, || gate.is_open()));
}

#[test]
fn nested_ref_locks_compose() {
    let repo = TestRepo::new();
    let (_watcher, gate, _freezer) = start(&repo);
    let index = repo.git_dir().join("index.lock");
    let head = repo.git_dir().join("refs/heads/main.lock");

    fs::write(&index, "").unwrap();
    fs::write(&head, "").unwrap();
    assert!(eventually(TIMEOUT, || !gate.is_open()));

    fs::remove_file(&index).unwrap();
    thread::sleep(Duration::from_millis(200));
    assert!(!gate.is_open());

    fs::remove_file(&head).unwrap();
    assert!(eventually(TIMEOUT, || gate.is_open()));
}

#[test]
fn ordinary_files_do_not_lock() {
    let repo = TestRepo::new();
    let (watcher, gate, _freezer) = start(&repo);

    fs::write(repo.git_dir().join("description"), "changed\n").unwrap();
    thread::sleep(Duration::from_millis(200));
    assert!(gate.is_open());
    assert!(!watcher.is_locked());
}

#[test]
fn git_commit_leaves_gate_open() {
    let repo = TestRepo::new();
    let (_watcher, gate, _freezer) = start(&repo);

    repo.commit_file("a.txt", "a\n", "while watched");
    assert!(eventually(TIMEOUT, || gate.is_open()));
}

#[test]
fn stop_releases_held_lock() {
    let repo = TestRepo::new();
    let (watcher, gate, freezer) = start(&repo);

    fs::write(repo.git_dir().join("index.lock"), "").unwrap();
    assert!(eventually(TIMEOUT, || !gate.is_open()));

    watcher.stop();
    watcher.stop();
    assert!(gate.is_open());
    assert_eq!(freezer.holders(), 0);
}
