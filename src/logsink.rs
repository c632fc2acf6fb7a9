// =============================================================================
// Log Writer — async MPSC queue draining to three NDJSON files
// =============================================================================
//
// Grounded on the teacher's `app_state.rs` ring-buffer-with-eviction
// discipline (`push_error`, `push_decision`, capped at `MAX_RECENT_*`) for
// the in-memory echo of recent rows kept for diagnostics, generalized here
// to a single-consumer disk writer: the teacher itself has no persistent
// log queue, but `spec.md` §5 explicitly calls for an MPSC channel
// preserving the finalizer's `sequence` order, so that part is new code in
// the teacher's channel-free-but-lock-guarded spirit.

use std::path::PathBuf;

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{Receiver, Sender};
use tracing::{error, warn};

use crate::signal::Diagnostics;
use crate::types::Bar;

const CHANNEL_CAPACITY: usize = 4096;
/// In-memory echo of the most recent rows per sink, kept for diagnostics only.
const MAX_RECENT_ROWS: usize = 200;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum LogEvent {
    SystemEvent { sequence: u64, message: String },
    SignalChange {
        sequence: u64,
        symbol: String,
        signal: bool,
        diagnostics: DiagnosticsRow,
    },
    BarFinalized {
        sequence: u64,
        timestamp: i64,
        coin: String,
        candle_data: CandleRow,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsRow {
    pub low_vol: Option<PredicateRow>,
    pub narrow_rng: Option<PredicateRow>,
    pub high_mma: Option<PredicateRow>,
    pub growth_filter: Option<PredicateRow>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PredicateRow {
    pub current: f64,
    pub threshold: f64,
    pub passed: bool,
}

impl From<&Diagnostics> for DiagnosticsRow {
    fn from(d: &Diagnostics) -> Self {
        let conv = |p: &Option<crate::signal::predicates::PredicateResult>| {
            p.map(|r| PredicateRow {
                current: r.current,
                threshold: r.threshold,
                passed: r.passed,
            })
        };
        Self {
            low_vol: conv(&d.low_vol),
            narrow_rng: conv(&d.narrow_rng),
            high_mma: conv(&d.high_mma),
            growth_filter: conv(&d.growth_filter),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CandleRow {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl From<Bar> for CandleRow {
    fn from(b: Bar) -> Self {
        Self {
            open: b.open,
            high: b.high,
            low: b.low,
            close: b.close,
            volume: b.volume,
        }
    }
}

pub fn channel() -> (Sender<LogEvent>, Receiver<LogEvent>) {
    tokio::sync::mpsc::channel(CHANNEL_CAPACITY)
}

pub struct LogPaths {
    pub system_events: PathBuf,
    pub signal_changes: PathBuf,
    pub finalized_bars: PathBuf,
}

/// Drain `rx` until the channel closes, appending each event's NDJSON
/// encoding to its matching file. Runs as the sole consumer task; the
/// channel preserves the finalizer's global `sequence` order end to end.
pub async fn run(mut rx: Receiver<LogEvent>, paths: LogPaths) {
    let mut system_recent: Vec<String> = Vec::new();
    let mut signal_recent: Vec<String> = Vec::new();
    let mut bar_recent: Vec<String> = Vec::new();

    while let Some(event) = rx.recv().await {
        let line = match serde_json::to_string(&event) {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, "failed to serialize log event, dropping");
                continue;
            }
        };

        let (path, recent) = match &event {
            LogEvent::SystemEvent { .. } => (&paths.system_events, &mut system_recent),
            LogEvent::SignalChange { .. } => (&paths.signal_changes, &mut signal_recent),
            LogEvent::BarFinalized { .. } => (&paths.finalized_bars, &mut bar_recent),
        };

        if let Err(e) = append_line(path, &line).await {
            warn!(error = %e, path = %path.display(), "failed to write log line");
        }

        recent.push(line);
        while recent.len() > MAX_RECENT_ROWS {
            recent.remove(0);
        }
    }
}

async fn append_line(path: &PathBuf, line: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    Ok(())
}
