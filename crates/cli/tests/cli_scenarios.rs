use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn cleaners() -> Command {
    let mut cmd = Command::cargo_bin("cleaners").unwrap();
    cmd.env("CLEANERS_LOG", "info")
        .env_remove("CLEANERS_POOL_THREADS")
        .env_remove("CLEANERS_DRAIN_TIMEOUT_MS")
        .env_remove("CLEANERS_SWEEP_INTERVAL_MS")
        .env_remove("CLEANERS_FAILURE_POLICY");
    cmd
}

#[test]
fn test_rooms_release_every_room() {
    cleaners()
        .arg("rooms")
        .assert()
        .success()
        .stderr(predicate::str::contains("Garage's room has 12 units in it"))
        .stderr(predicate::str::contains(
            "Jonathan had 2 units and now has been released",
        ))
        .stderr(predicate::str::contains(
            "Garage had 12 units and now has been released",
        ))
        .stderr(predicate::str::contains(
            "Dena had 5 units and now has been released",
        ))
        .stdout(predicate::str::contains(
            "registered 3, released 2 explicitly and 1 in the background, 0 failed",
        ));
}

#[test]
fn test_threads_with_overrides() {
    cleaners()
        .args(["--threads", "2", "--tasks", "3", "--drain-timeout-ms", "1000", "threads"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Thread pool-worker-"))
        .stderr(predicate::str::contains("Task returned: main: 3"))
        .stderr(predicate::str::contains("pool shutdown"))
        .stdout(predicate::str::contains(
            "registered 3, released 2 explicitly and 1 in the background, 0 failed",
        ));
}

#[test]
fn test_all_is_the_default() {
    cleaners()
        .args(["--threads", "1", "--tasks", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("registered 6"));
}

#[test]
fn test_config_file_is_applied() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{ "pool": {{ "threads": 0 }} }}"#).unwrap();

    cleaners()
        .arg("--config")
        .arg(file.path())
        .arg("threads")
        .assert()
        .failure()
        .stderr(predicate::str::contains("pool.threads must be at least one"));
}

#[test]
fn test_invalid_thread_count_is_rejected() {
    cleaners()
        .args(["--threads", "0", "rooms"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("pool.threads must be at least one"));
}

#[test]
fn test_tasks_default_to_pool_worker_count() {
    cleaners()
        .args(["--threads", "3", "threads"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Task returned: main: 3"))
        .stderr(predicate::str::contains("Task returned: main: 4").not());
}
