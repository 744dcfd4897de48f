//! prefs - Inspect and edit prefstore files

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = prefstore::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
