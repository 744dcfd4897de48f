//! # Command-Line Interface
//!
//! The `prefs` binary: inspect and edit a preferences file.
//!
//! ## Commands
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `get <key>` | Print a value (`--default` when absent) |
//! | `set <key> <value>` | Store a value (`--kind` picks the type) |
//! | `remove <key>` | Delete a key |
//! | `clear` | Delete every key |
//! | `list` | Print all entries sorted by key |
//! | `contains <key>` | Print `true` or `false` |
//! | `watch` | Print changes made by other processes |
//!
//! ## Output Formats
//!
//! All commands support `--format`:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Logging
//!
//! Diagnostics go to stderr. `PREFS_LOG` takes a `tracing` filter
//! (default `warn`); `--verbose` raises it to `debug`:
//! ```bash
//! PREFS_LOG=prefstore=info prefs set theme dark
//! ```

mod app;
mod commands;
mod output;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};
