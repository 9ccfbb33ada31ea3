use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn backupd_bin() -> PathBuf {
    assert_cmd::cargo::cargo_bin!("backupd").to_path_buf()
}

fn backupd_cmd(lock_file: &Path) -> Command {
    let mut cmd = Command::new(backupd_bin());
    cmd.env("BACKUPD_LOCK_FILE", lock_file);
    cmd
}

struct Workspace {
    _dir: TempDir,
    root: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = fs::canonicalize(dir.path()).expect("canonicalize");
        for sub in ["src", "dst", "staging"] {
            fs::create_dir(root.join(sub)).expect("mkdir");
        }
        let config = format!(
            "source_dir: {}\ndestination_dir: {}\n",
            root.join("src").display(),
            root.join("dst").display()
        );
        fs::write(root.join("backupd.yaml"), config).expect("write config");
        Self { _dir: dir, root }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn lock_file(&self) -> PathBuf {
        self.path("backupd.pid")
    }

    fn config(&self) -> PathBuf {
        self.path("backupd.yaml")
    }

    /// Place a file into the source tree in one step, with its mode already set.
    fn drop_into_source(&self, name: &str, body: &str, mode: u32) {
        let staged = self.path("staging").join(name);
        fs::write(&staged, body).expect("write staged");
        fs::set_permissions(&staged, fs::Permissions::from_mode(mode)).expect("chmod staged");
        fs::rename(&staged, self.path("src").join(name)).expect("rename into src");
    }
}

struct DaemonProcess {
    child: Child,
    lock_file: PathBuf,
}

impl DaemonProcess {
    fn start_foreground(ws: &Workspace) -> Self {
        let child = backupd_cmd(&ws.lock_file())
            .args(["start", "--foreground"])
            .arg(ws.config())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn daemon");
        Self {
            child,
            lock_file: ws.lock_file(),
        }
    }

    fn wait_exit(&mut self, timeout: Duration) -> Option<std::process::ExitStatus> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(Some(status)) = self.child.try_wait() {
                return Some(status);
            }
            sleep(Duration::from_millis(50));
        }
        None
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        let _ = backupd_cmd(&self.lock_file).arg("stop").status();
        if self.wait_exit(Duration::from_secs(2)).is_none() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn daemon_running(lock_file: &Path) -> bool {
    let Ok(output) = backupd_cmd(lock_file).args(["status", "--json"]).output() else {
        return false;
    };
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(&output.stdout) else {
        return false;
    };
    value
        .get("running")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(100));
    }
    false
}

#[test]
fn foreground_daemon_mirrors_and_stops_cleanly() {
    let ws = Workspace::new();
    let mut daemon = DaemonProcess::start_foreground(&ws);
    assert!(
        wait_until(Duration::from_secs(5), || daemon_running(&ws.lock_file())),
        "daemon did not report running state in time",
    );

    let recorded: u32 = fs::read_to_string(ws.lock_file())
        .expect("read lock file")
        .trim()
        .parse()
        .expect("pid");
    assert_eq!(recorded, daemon.child.id());

    ws.drop_into_source("a.txt", "hi", 0o644);
    let mirrored = ws.path("dst").join("a.txt");
    assert!(
        wait_until(Duration::from_secs(5), || {
            fs::read_to_string(&mirrored).map(|s| s == "hi").unwrap_or(false)
        }),
        "a.txt never reached the mirror",
    );
    let mode = fs::metadata(&mirrored).expect("stat").permissions().mode() & 0o7777;
    assert_eq!(mode, 0o644);

    fs::remove_file(ws.path("src").join("a.txt")).expect("remove");
    assert!(
        wait_until(Duration::from_secs(5), || !mirrored.exists()),
        "a.txt was never removed from the mirror",
    );

    backupd_cmd(&ws.lock_file())
        .args(["stop", "--wait", "--timeout-secs", "5"])
        .assert()
        .success()
        .stdout(contains("SIGTERM"));

    let status = daemon.wait_exit(Duration::from_secs(5)).expect("daemon exit");
    assert_eq!(status.code(), Some(143));
    assert_eq!(status.signal(), None);
    assert!(!ws.lock_file().exists());
}

#[test]
fn second_start_exits_without_side_effects() {
    let ws = Workspace::new();
    let daemon = DaemonProcess::start_foreground(&ws);
    assert!(
        wait_until(Duration::from_secs(5), || daemon_running(&ws.lock_file())),
        "daemon did not report running state in time",
    );
    let before = fs::read_to_string(ws.lock_file()).expect("read lock file");

    backupd_cmd(&ws.lock_file())
        .args(["start", "--foreground"])
        .arg(ws.config())
        .assert()
        .success()
        .stderr(contains("already running"));

    assert_eq!(
        fs::read_to_string(ws.lock_file()).expect("read lock file"),
        before
    );
    assert!(daemon_running(&ws.lock_file()));
    drop(daemon);
}

#[test]
fn detached_start_returns_and_keeps_running() {
    let ws = Workspace::new();
    backupd_cmd(&ws.lock_file())
        .arg("start")
        .arg(ws.config())
        .assert()
        .success();

    assert!(
        wait_until(Duration::from_secs(5), || daemon_running(&ws.lock_file())),
        "detached daemon never took the lock",
    );

    ws.drop_into_source("b.txt", "detached", 0o600);
    let mirrored = ws.path("dst").join("b.txt");
    let copied = wait_until(Duration::from_secs(5), || {
        fs::read_to_string(&mirrored)
            .map(|s| s == "detached")
            .unwrap_or(false)
    });

    backupd_cmd(&ws.lock_file())
        .args(["stop", "--wait", "--timeout-secs", "5"])
        .assert()
        .success();
    assert!(copied, "b.txt never reached the mirror");
    assert!(!ws.lock_file().exists());
}

#[test]
fn losing_the_source_directory_ends_the_daemon() {
    let ws = Workspace::new();
    let mut daemon = DaemonProcess::start_foreground(&ws);
    assert!(
        wait_until(Duration::from_secs(5), || daemon_running(&ws.lock_file())),
        "daemon did not report running state in time",
    );

    fs::remove_dir(ws.path("src")).expect("rmdir src");

    let status = daemon
        .wait_exit(Duration::from_secs(5))
        .expect("daemon kept running without its source directory");
    assert_eq!(status.code(), Some(1));
    assert!(!daemon_running(&ws.lock_file()));
}
