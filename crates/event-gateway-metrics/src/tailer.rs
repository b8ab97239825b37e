// File: src/tailer.rs
//
// Polling follower of the SQL execution log with a durable read offset

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use event_gateway_core::error::GatewayResult;

use crate::aggregator::ExecutionSink;
use crate::parser::QueryLogParser;
use crate::position::PositionStore;

/// Snapshot of the tailer for operators.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TailerStatus {
    pub file_path: PathBuf,
    pub file_exists: bool,
    pub current_position: u64,
    pub file_size: u64,
    pub lines_processed: u64,
    pub entries_parsed: u64,
    pub parse_errors: u64,
    pub start_time: DateTime<Utc>,
    pub last_read_time: Option<DateTime<Utc>>,
    pub is_running: bool,
}

struct TailerShared {
    position: AtomicU64,
    file_size: AtomicU64,
    file_exists: AtomicBool,
    lines_processed: AtomicU64,
    entries_parsed: AtomicU64,
    parse_errors: AtomicU64,
    last_read_millis: AtomicU64,
    is_running: AtomicBool,
}

/// Follows a growing log file on a fixed poll interval.
///
/// A shrinking file means rotation: the offset resets to zero and is
/// persisted, and reading resumes from the top on the following poll.
/// Only complete lines are consumed; a partial tail line waits for its
/// newline. The offset is persisted after every advance so a restart
/// resumes where the previous process stopped.
pub struct LogTailer {
    path: PathBuf,
    poll_interval: Duration,
    parser: QueryLogParser,
    positions: Arc<dyn PositionStore>,
    sink: Arc<dyn ExecutionSink>,
    shared: Arc<TailerShared>,
    start_time: DateTime<Utc>,
}

impl LogTailer {
    pub fn new(
        path: PathBuf,
        poll_interval: Duration,
        positions: Arc<dyn PositionStore>,
        sink: Arc<dyn ExecutionSink>,
    ) -> Self {
        Self {
            path,
            poll_interval,
            parser: QueryLogParser::new(),
            positions,
            sink,
            shared: Arc::new(TailerShared {
                position: AtomicU64::new(0),
                file_size: AtomicU64::new(0),
                file_exists: AtomicBool::new(false),
                lines_processed: AtomicU64::new(0),
                entries_parsed: AtomicU64::new(0),
                parse_errors: AtomicU64::new(0),
                last_read_millis: AtomicU64::new(0),
                is_running: AtomicBool::new(false),
            }),
            start_time: Utc::now(),
        }
    }

    pub fn status(&self) -> TailerStatus {
        let last_read = self.shared.last_read_millis.load(Ordering::Relaxed);
        TailerStatus {
            file_path: self.path.clone(),
            file_exists: self.shared.file_exists.load(Ordering::Relaxed),
            current_position: self.shared.position.load(Ordering::Relaxed),
            file_size: self.shared.file_size.load(Ordering::Relaxed),
            lines_processed: self.shared.lines_processed.load(Ordering::Relaxed),
            entries_parsed: self.shared.entries_parsed.load(Ordering::Relaxed),
            parse_errors: self.shared.parse_errors.load(Ordering::Relaxed),
            start_time: self.start_time,
            last_read_time: (last_read > 0).then(|| DateTime::from_timestamp_millis(last_read as i64))
                .flatten(),
            is_running: self.shared.is_running.load(Ordering::Relaxed),
        }
    }

    /// Restore the durable offset, then poll until shutdown. The loop
    /// suspends only between polls, so it quiesces within one interval.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            match self.positions.load().await {
                Ok(Some(position)) => {
                    self.shared.position.store(position, Ordering::Relaxed);
                    tracing::info!(position, path = %self.path.display(), "resuming log tail from durable offset");
                }
                Ok(None) => {
                    tracing::info!(path = %self.path.display(), "no durable offset, tailing from the top");
                }
                Err(error) => {
                    tracing::warn!(error = %error, "offset restore failed, tailing from the top");
                }
            }

            self.shared.is_running.store(true, Ordering::Relaxed);
            let mut ticker = tokio::time::interval(self.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if let Err(error) = self.poll_once().await {
                            tracing::warn!(path = %self.path.display(), error = %error, "log poll failed");
                        }
                    }
                }
            }
            self.shared.is_running.store(false, Ordering::Relaxed);
            tracing::info!(path = %self.path.display(), "log tailer stopped");
        })
    }

    /// One poll cycle; exposed for tests.
    pub async fn poll_once(&self) -> GatewayResult<()> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(_) => {
                self.shared.file_exists.store(false, Ordering::Relaxed);
                return Ok(());
            }
        };
        self.shared.file_exists.store(true, Ordering::Relaxed);
        let size = metadata.len();
        self.shared.file_size.store(size, Ordering::Relaxed);

        let position = self.shared.position.load(Ordering::Relaxed);
        if size < position {
            tracing::info!(
                path = %self.path.display(),
                old_position = position,
                size,
                "file shrank below read offset, assuming rotation"
            );
            self.shared.position.store(0, Ordering::Relaxed);
            self.positions.save(0).await?;
            return Ok(());
        }
        if size == position {
            return Ok(());
        }

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(std::io::SeekFrom::Start(position)).await?;
        let mut buffer = Vec::with_capacity((size - position) as usize);
        file.read_to_end(&mut buffer).await?;

        // Consume only complete lines; a partial tail waits for its
        // newline on a later poll
        let consumed = match buffer.iter().rposition(|&b| b == b'\n') {
            Some(last_newline) => last_newline + 1,
            None => return Ok(()),
        };

        let text = String::from_utf8_lossy(&buffer[..consumed]);
        for line in text.split('\n') {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            self.shared.lines_processed.fetch_add(1, Ordering::Relaxed);
            match self.parser.parse_line(line) {
                Some(parsed) => {
                    self.sink
                        .record(&parsed.query_hash, &parsed.query_pattern, parsed.point)
                        .await?;
                    self.shared.entries_parsed.fetch_add(1, Ordering::Relaxed);
                }
                None => {
                    self.shared.parse_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(path = %self.path.display(), line, "unparseable log line");
                }
            }
        }

        let new_position = position + consumed as u64;
        self.shared.position.store(new_position, Ordering::Relaxed);
        self.shared
            .last_read_millis
            .store(Utc::now().timestamp_millis() as u64, Ordering::Relaxed);
        self.positions.save(new_position).await?;
        Ok(())
    }
}
