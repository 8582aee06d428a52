//! NDJSON ingress: one record or track command per line.
use crate::domain::{EventRecord, Severity};
use crate::tracker::{PAGE_LEAVE_EVENT_TYPE, Tracker};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

/// Lightweight producer command, stamped with the session identity on
/// arrival.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackCommand {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Fully formed records take precedence; anything else with a `type`
/// is a track command.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IngressLine {
    Record(Box<EventRecord>),
    Track(TrackCommand),
}

impl IngressLine {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngressStats {
    pub lines: u64,
    pub records: u64,
    pub tracked: u64,
    pub skipped: u64,
    /// A `page_leave` command ended the session.
    pub left: bool,
}

/// Feed every line of `reader` to `tracker` until EOF or a `page_leave`.
/// Malformed lines, including invalid UTF-8, are logged and skipped. Only
/// a failing reader ends ingress with an error.
pub async fn pump<R>(mut reader: R, tracker: &Tracker) -> std::io::Result<IngressStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = IngressStats::default();
    let mut buf = Vec::with_capacity(1024);

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        stats.lines += 1;

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                stats.skipped += 1;
                warn!(line = stats.lines, error = %e, "Skipping ingress line that is not UTF-8");
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }

        match IngressLine::parse(line) {
            Ok(IngressLine::Record(record)) => {
                stats.records += 1;
                tracker.coordinator().enqueue(*record);
            }
            Ok(IngressLine::Track(command)) if command.event_type == PAGE_LEAVE_EVENT_TYPE => {
                stats.tracked += 1;
                stats.left = true;
                let handed_off = tracker.track_leave(command.data);
                debug!(records = handed_off, "Session left");
                break;
            }
            Ok(IngressLine::Track(command)) => {
                stats.tracked += 1;
                tracker.track_with_severity(
                    &command.event_type,
                    command.data,
                    command.category.as_deref(),
                    command.severity.unwrap_or_default(),
                );
            }
            Err(e) => {
                stats.skipped += 1;
                warn!(line = stats.lines, error = %e, "Skipping malformed ingress line");
            }
        }
    }

    Ok(stats)
}
