//! Three-state health classification, totally ordered `KO < Warn < OK`.

use std::fmt;
use std::str::FromStr;

/// Health classification of a monitored component.
///
/// Totally ordered `KO < Warn < OK`, with numeric encodings KO=0, Warn=1,
/// OK=2 (the derived `Ord`/discriminant order already gives us this for free
/// from declaration order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    /// Sustained failure.
    KO = 0,
    /// Degraded but not failed.
    Warn = 1,
    /// Healthy.
    OK = 2,
}

impl Status {
    /// The three-letter/four-letter label used by both the text and JSON
    /// encodings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::KO => "KO",
            Status::Warn => "Warn",
            Status::OK => "OK",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = std::convert::Infallible;

    /// Case-insensitive parse; anything unrecognized maps to `KO`.
    /// Never fails — the `Infallible` error type documents that.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "ok" => Status::OK,
            "warn" => Status::Warn,
            _ => Status::KO,
        })
    }
}

impl Default for Status {
    /// A freshly constructed `LastRun` starts at `KO`.
    fn default() -> Self {
        Status::KO
    }
}
