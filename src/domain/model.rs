use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 單筆回應記錄，例如 `{"pong":"Pong3"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    pub pong: String,
}

impl Pong {
    pub fn new(label: impl Into<String>) -> Self {
        Self { pong: label.into() }
    }

    pub fn numbered(n: u64) -> Self {
        Self::new(format!("Pong{}", n))
    }
}

impl fmt::Display for Pong {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pong)
    }
}

/// One response chunk.
pub type PongBatch = Vec<Pong>;

/// Flatten batches in order and join their labels.
pub fn concat_labels<'a, I>(batches: I) -> String
where
    I: IntoIterator<Item = &'a PongBatch>,
{
    batches
        .into_iter()
        .flat_map(|batch| batch.iter())
        .map(|pong| pong.pong.as_str())
        .collect()
}

/// How a produced sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Complete,
    Cancel,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Complete => f.write_str("Complete"),
            Signal::Cancel => f.write_str("Cancel"),
        }
    }
}

/// Outcome of one poll.
///
/// `skipped` counts undecodable elements plus at most one body transport
/// error, which ends the poll early.
#[derive(Debug, Clone)]
pub struct PollReport {
    pub poller: String,
    pub started_at: DateTime<Utc>,
    pub batches: Vec<PongBatch>,
    pub skipped: usize,
    pub label: String,
    pub elapsed: Duration,
}

impl PollReport {
    pub fn record_count(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }
}
