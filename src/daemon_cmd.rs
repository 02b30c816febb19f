//! Daemon command implementation.

use codegraph::daemon;
use codegraph::Config;
use std::path::Path;

pub fn run(root: &Path, config: Config) -> u8 {
    println!("codegraph watching: {}", root.display());
    match daemon::run(root, config) {
        Ok(()) => 0,
        Err(error) => {
            eprintln!("Error: {}", error);
            daemon::exit_code_for(&error) as u8
        }
    }
}
