use quarry::logging::{self, RunLogOptions};
use tempfile::tempdir;

#[test]
fn init_opens_one_run_log_per_process() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("run_19990101T000000_1.log"), "").unwrap();
    let options = RunLogOptions {
        dir: Some(dir.path().to_path_buf()),
        keep: 1,
        stderr: false,
        ..RunLogOptions::default()
    };

    let first = logging::init(&options).unwrap();
    let second = logging::init(&RunLogOptions::default()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.parent(), Some(dir.path()));

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 1, "older run log should be pruned: {names:?}");
    assert!(names[0].starts_with("run_"));
    assert!(names[0].ends_with(".log"));
}
