use roster::daemon::tracker::ChangeTracker;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::tempdir;

const PREFIX: &str = "student_file_";

fn write_file(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).expect("write source file");
    fs::canonicalize(&path).expect("canonical path")
}

fn set_mtime(path: &Path, when: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .expect("open for mtime")
        .set_modified(when)
        .expect("set mtime");
}

fn sorted(mut paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths.sort();
    paths
}

#[test]
fn new_files_are_reported_once() {
    let dir = tempdir().expect("tempdir");
    let a = write_file(dir.path(), "student_file_1.txt", "1 Ivanov Ivan 01.01.1990\n");
    let b = write_file(dir.path(), "student_file_2.txt", "2 Petrov Petr 02.02.1991\n");

    let mut tracker = ChangeTracker::new(dir.path(), PREFIX);
    assert_eq!(sorted(tracker.detect_changed().expect("scan")), sorted(vec![a, b]));
    assert_eq!(tracker.tracked_len(), 2);
    assert!(tracker.detect_changed().expect("rescan").is_empty());
}

#[test]
fn any_timestamp_difference_counts() {
    let dir = tempdir().expect("tempdir");
    let path = write_file(dir.path(), "student_file_1.txt", "1 Ivanov Ivan 01.01.1990\n");
    let base = SystemTime::now() - Duration::from_secs(3600);
    set_mtime(&path, base);

    let mut tracker = ChangeTracker::new(dir.path(), PREFIX);
    assert_eq!(tracker.detect_changed().expect("scan"), vec![path.clone()]);

    set_mtime(&path, base + Duration::from_secs(10));
    assert_eq!(tracker.detect_changed().expect("forward"), vec![path.clone()]);

    // Backwards counts too.
    set_mtime(&path, base - Duration::from_secs(10));
    assert_eq!(tracker.detect_changed().expect("backward"), vec![path.clone()]);

    assert!(tracker.detect_changed().expect("steady").is_empty());
}

#[test]
fn non_matching_entries_are_ignored() {
    let dir = tempdir().expect("tempdir");
    write_file(dir.path(), "student_file_1.csv", "");
    write_file(dir.path(), "staff_file_1.txt", "");
    write_file(dir.path(), "notes.txt", "");
    fs::create_dir(dir.path().join("student_file_dir.txt")).expect("mkdir");
    let wanted = write_file(dir.path(), "student_file_9.txt", "");

    let mut tracker = ChangeTracker::new(dir.path(), PREFIX);
    assert_eq!(tracker.detect_changed().expect("scan"), vec![wanted]);
}

#[test]
fn pending_changes_repeat_until_acknowledged() {
    let dir = tempdir().expect("tempdir");
    let path = write_file(dir.path(), "student_file_1.txt", "1 Ivanov Ivan 01.01.1990\n");

    let mut tracker = ChangeTracker::new(dir.path(), PREFIX);
    let first = tracker.pending_changes().expect("scan");
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].path, path);
    assert_eq!(tracker.tracked_len(), 0);

    let again = tracker.pending_changes().expect("rescan");
    assert_eq!(again, first);

    tracker.acknowledge(&again[0]);
    assert!(tracker.pending_changes().expect("after ack").is_empty());
    assert_eq!(tracker.tracked_len(), 1);
}

#[test]
fn deleted_file_stops_being_reported_but_stays_tracked() {
    let dir = tempdir().expect("tempdir");
    let path = write_file(dir.path(), "student_file_1.txt", "");

    let mut tracker = ChangeTracker::new(dir.path(), PREFIX);
    assert_eq!(tracker.detect_changed().expect("scan").len(), 1);
    fs::remove_file(&path).expect("remove");

    assert!(tracker.detect_changed().expect("rescan").is_empty());
    assert_eq!(tracker.tracked_len(), 1);
}
