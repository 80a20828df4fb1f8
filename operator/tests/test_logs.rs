//! Log file rotation tests

use std::fs;
use std::io::Write;

use stackop::logs::{LogSink, DEFAULT_ROTATE_BYTES};

#[test]
fn test_oversized_log_rotates_at_session_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stackop.log");
    let previous = vec![b'.'; DEFAULT_ROTATE_BYTES as usize + 1];
    fs::write(&path, &previous).unwrap();

    let mut sink = LogSink::open(&path, DEFAULT_ROTATE_BYTES).unwrap();
    sink.write_all(b"2026-10-19T10:00:00Z INFO new session\n").unwrap();
    sink.flush().unwrap();

    let names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"stackop.log.old".to_string()));
    assert_eq!(
        fs::metadata(sink.rotated_path()).unwrap().len(),
        previous.len() as u64
    );
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "2026-10-19T10:00:00Z INFO new session\n"
    );
}

#[test]
fn test_second_rotation_replaces_old_generation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stackop.log");
    fs::write(dir.path().join("stackop.log.old"), "ancient\n").unwrap();
    fs::write(&path, "x".repeat(64)).unwrap();

    let sink = LogSink::open(&path, 32).unwrap();

    assert_eq!(fs::read_to_string(sink.rotated_path()).unwrap(), "x".repeat(64));
    assert_eq!(fs::metadata(&path).unwrap().len(), 0);
}

#[test]
fn test_log_directory_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("logs").join("stackop.log");

    let sink = LogSink::open(&path, DEFAULT_ROTATE_BYTES).unwrap();

    assert_eq!(sink.path(), path.as_path());
    assert!(path.exists());
}
