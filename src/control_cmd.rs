//! Daemon control verbs: stop and refresh via signals to the lock-file PID.

use codegraph::daemon::lock::signal_daemon;
use codegraph::GraphDir;
use std::path::Path;

pub fn stop(root: &Path) -> u8 {
    send(root, sysinfo::Signal::Term, "stop")
}

pub fn refresh(root: &Path) -> u8 {
    send(root, sysinfo::Signal::User1, "refresh")
}

fn send(root: &Path, signal: sysinfo::Signal, verb: &str) -> u8 {
    let graph_dir = GraphDir::for_repo(root);
    match signal_daemon(&graph_dir, signal) {
        Ok(true) => {
            println!("{} signal sent", verb);
            0
        }
        Ok(false) => {
            eprintln!("Error: no running daemon for {}", root.display());
            1
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}
