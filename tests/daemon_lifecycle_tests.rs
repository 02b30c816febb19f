//! Daemon lifecycle: lock exclusivity, live updates, stop via signal.
//!
//! These tests spawn the real binary, so timings are generous; the daemon
//! default quiescence delay is shortened per test via CLI flags.

use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn bin_path() -> String {
    env!("CARGO_BIN_EXE_codegraph").to_string()
}

fn spawn_daemon(root: &std::path::Path) -> Child {
    Command::new(bin_path())
        .args(["daemon", "--quiescence-ms", "150", "--root"])
        .arg(root)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("daemon should spawn")
}

fn wait_for<F: Fn() -> bool>(what: &str, timeout: Duration, check: F) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if check() {
            return;
        }
        sleep(Duration::from_millis(100));
    }
    panic!("timed out waiting for {}", what);
}

fn stop_daemon(root: &std::path::Path, child: &mut Child) {
    let _ = Command::new(bin_path())
        .args(["stop", "--root"])
        .arg(root)
        .output();
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(10) {
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        sleep(Duration::from_millis(100));
    }
    let _ = child.kill();
}

#[test]
fn daemon_scans_watches_and_stops_cleanly() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("a.py"), "import b\n").unwrap();
    std::fs::write(tmp.path().join("b.py"), "").unwrap();

    let mut child = spawn_daemon(tmp.path());
    let lock_path = tmp.path().join(".graph/daemon.lock");
    wait_for("lock file", Duration::from_secs(15), || lock_path.exists());
    wait_for("initial snapshot", Duration::from_secs(15), || {
        tmp.path().join(".graph/python.json").exists()
    });

    // A new file shows up in the snapshot after the quiescence window
    std::fs::write(tmp.path().join("c.py"), "import a\n").unwrap();
    wait_for("incremental update", Duration::from_secs(15), || {
        std::fs::read_to_string(tmp.path().join(".graph/python.json"))
            .map(|s| s.contains("c.py"))
            .unwrap_or(false)
    });

    stop_daemon(tmp.path(), &mut child);
    let status = child.wait().unwrap();
    assert!(status.success(), "daemon should exit 0 on stop");
    assert!(!lock_path.exists(), "lock released on shutdown");
}

#[test]
fn second_daemon_instance_exits_with_code_2() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("a.py"), "").unwrap();

    let mut first = spawn_daemon(tmp.path());
    let lock_path = tmp.path().join(".graph/daemon.lock");
    wait_for("lock file", Duration::from_secs(15), || lock_path.exists());

    let second = Command::new(bin_path())
        .args(["daemon", "--root"])
        .arg(tmp.path())
        .output()
        .expect("second daemon should run to completion");
    assert_eq!(second.status.code(), Some(2), "lock held means exit 2");

    stop_daemon(tmp.path(), &mut first);
}

#[test]
fn stale_lock_from_dead_process_is_replaced() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("a.py"), "").unwrap();
    std::fs::create_dir_all(tmp.path().join(".graph")).unwrap();
    // A PID far beyond pid_max
    std::fs::write(tmp.path().join(".graph/daemon.lock"), "4194304999\n").unwrap();

    let mut child = spawn_daemon(tmp.path());
    wait_for("snapshot despite stale lock", Duration::from_secs(15), || {
        tmp.path().join(".graph/python.json").exists()
    });

    stop_daemon(tmp.path(), &mut child);
}

#[test]
fn refresh_signal_rescans() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("a.py"), "").unwrap();

    let mut child = spawn_daemon(tmp.path());
    wait_for("initial snapshot", Duration::from_secs(15), || {
        tmp.path().join(".graph/python.json").exists()
    });

    // Sneak a file in, then force a refresh
    std::fs::write(tmp.path().join("late.py"), "import a\n").unwrap();
    let refresh = Command::new(bin_path())
        .args(["refresh", "--root"])
        .arg(tmp.path())
        .output()
        .unwrap();
    assert!(refresh.status.success());

    wait_for("refresh picks up file", Duration::from_secs(15), || {
        std::fs::read_to_string(tmp.path().join(".graph/python.json"))
            .map(|s| s.contains("late.py"))
            .unwrap_or(false)
    });

    stop_daemon(tmp.path(), &mut child);
}
