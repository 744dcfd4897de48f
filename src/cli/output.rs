//! Output formatting for CLI commands

use serde::Serialize;

use crate::domain::PrefValue;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Output helper for consistent formatting
#[derive(Debug, Clone, Copy)]
pub struct Output {
    format: OutputFormat,
}

#[derive(Serialize)]
struct Entry<'a> {
    key: &'a str,
    #[serde(flatten)]
    value: &'a PrefValue,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Prints a status message, or `{"success": true, ...}` in JSON mode
    pub fn success(&self, message: &str, key: Option<&str>, changed: bool) {
        match self.format {
            OutputFormat::Text => println!("{}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "success": true,
                        "message": message,
                        "key": key,
                        "changed": changed,
                    })
                );
            }
        }
    }

    /// Prints one value. Text mode prints the bare value so it can be
    /// captured by scripts.
    pub fn value(&self, key: &str, value: &PrefValue) {
        match self.format {
            OutputFormat::Text => println!("{}", value),
            OutputFormat::Json => self.data(&Entry { key, value }),
        }
    }

    /// Prints entries in the given order
    pub fn entries<'a>(&self, entries: impl IntoIterator<Item = (&'a String, &'a PrefValue)>) {
        match self.format {
            OutputFormat::Text => {
                for (key, value) in entries {
                    println!("{}\t{}\t{}", key, value.kind(), value);
                }
            }
            OutputFormat::Json => {
                let items: Vec<Entry<'_>> = entries
                    .into_iter()
                    .map(|(key, value)| Entry { key, value })
                    .collect();
                self.data(&items);
            }
        }
    }

    /// Prints a change observed by `watch`; `None` means the key was removed
    pub fn change(&self, key: &str, value: Option<&PrefValue>) {
        match (self.format, value) {
            (OutputFormat::Text, Some(value)) => println!("{} = {}", key, value),
            (OutputFormat::Text, None) => println!("{} removed", key),
            (OutputFormat::Json, Some(value)) => self.data(&Entry { key, value }),
            (OutputFormat::Json, None) => {
                println!("{}", serde_json::json!({ "key": key, "removed": true }));
            }
        }
    }

    /// Prints structured data
    pub fn data<T: Serialize>(&self, data: &T) {
        let json = match self.format {
            OutputFormat::Text => serde_json::to_string_pretty(data),
            OutputFormat::Json => serde_json::to_string(data),
        };
        if let Ok(json) = json {
            println!("{}", json);
        }
    }

    /// Returns true if using JSON format
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}
