//! Text and JSON encodings of a monitor's current status.

use crate::status::Status;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The fields a caller needs to render either encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusView {
    pub status: Status,
    pub name: String,
    pub info: String,
    pub latency: Duration,
    pub uptime: Duration,
    pub downtime: Duration,
    pub message: String,
}

/// Renders `<STATUS>: <name> (<info>) | <latency_ms> / <uptime_s> /
/// <downtime_s> | <message>`, omitting the `(<info>)` segment when `info`
/// is empty and the trailing `| <message>` segment when `message` is empty.
pub fn encode_text(view: &StatusView) -> String {
    let mut out = format!("{}: {}", view.status, view.name);
    if !view.info.is_empty() {
        out.push_str(&format!(" ({})", view.info));
    }
    out.push_str(&format!(
        " | {} / {} / {}",
        view.latency.as_millis(),
        view.uptime.as_secs(),
        view.downtime.as_secs(),
    ));
    if !view.message.is_empty() {
        out.push_str(&format!(" | {}", view.message));
    }
    out
}

/// The JSON-serializable shape of a [`StatusView`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusJson {
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Info")]
    pub info: String,
    #[serde(rename = "Latency")]
    pub latency_ms: u128,
    #[serde(rename = "Uptime")]
    pub uptime_s: u64,
    #[serde(rename = "Downtime")]
    pub downtime_s: u64,
    #[serde(rename = "Message")]
    pub message: String,
}

impl From<&StatusView> for StatusJson {
    fn from(view: &StatusView) -> Self {
        StatusJson {
            status: view.status.to_string(),
            name: view.name.clone(),
            info: view.info.clone(),
            latency_ms: view.latency.as_millis(),
            uptime_s: view.uptime.as_secs(),
            downtime_s: view.downtime.as_secs(),
            message: view.message.clone(),
        }
    }
}

pub fn encode_json(view: &StatusView) -> serde_json::Result<String> {
    serde_json::to_string(&StatusJson::from(view))
}
