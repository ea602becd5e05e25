//! Durable, rotating, append-only event log.
//!
//! Events are written as newline-delimited JSON into segment files named
//! `<prefix>-<YYYYMMDD-HHMMSS>-<sequence>.<extension>` (UTC). A segment grows until the next record
//! would push it past [`WalConfig::max_segment_bytes`]; it is then synced, closed and replaced by a
//! new segment with the next sequence number.
//!
//! All appends go through a single mutex guarding the open segment, its byte count and the
//! sequence counter. This gives a total order of records within a segment and is the main
//! contention point under heavy concurrent logging.
use std::{
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::Utc;

use crate::{events::Event, EventSink, Error, Result};

/// Configuration for [`WalEventSink`].
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Directory segments are written to. Created if missing.
    pub dir: PathBuf,
    /// Segment size that triggers rotation.
    ///
    /// Defaults to [`WalConfig::DEFAULT_MAX_SEGMENT_BYTES`].
    pub max_segment_bytes: u64,
    /// Sync every append to stable storage before returning.
    ///
    /// When `false` (the default), records appended since the last rotation or close may be lost
    /// on a crash or power loss. When `true`, every append waits for the storage to confirm the
    /// write, at a significant latency cost.
    pub sync_on_write: bool,
    pub prefix: String,
    pub extension: String,
}

impl WalConfig {
    /// Default value for [`WalConfig::max_segment_bytes`]: 32 MiB.
    pub const DEFAULT_MAX_SEGMENT_BYTES: u64 = 32 * 1024 * 1024;
    pub const DEFAULT_PREFIX: &'static str = "events";
    pub const DEFAULT_EXTENSION: &'static str = "wal";

    pub fn new(dir: impl Into<PathBuf>) -> WalConfig {
        WalConfig {
            dir: dir.into(),
            max_segment_bytes: WalConfig::DEFAULT_MAX_SEGMENT_BYTES,
            sync_on_write: false,
            prefix: WalConfig::DEFAULT_PREFIX.to_owned(),
            extension: WalConfig::DEFAULT_EXTENSION.to_owned(),
        }
    }

    pub fn with_max_segment_bytes(mut self, max_segment_bytes: u64) -> WalConfig {
        self.max_segment_bytes = max_segment_bytes;
        self
    }

    pub fn with_sync_on_write(mut self, sync_on_write: bool) -> WalConfig {
        self.sync_on_write = sync_on_write;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> WalConfig {
        self.prefix = prefix.into();
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> WalConfig {
        self.extension = extension.into();
        self
    }

    fn segment_file_name(&self, sequence: u64) -> String {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        format!(
            "{}-{}-{:06}.{}",
            self.prefix, stamp, sequence, self.extension
        )
    }

    /// Extract the sequence number from a segment file name produced by this configuration.
    fn parse_sequence(&self, file_name: &str) -> Option<u64> {
        let rest = file_name
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('-')?
            .strip_suffix(self.extension.as_str())?
            .strip_suffix('.')?;
        let (_stamp, sequence) = rest.rsplit_once('-')?;
        sequence.parse().ok()
    }
}

struct Segment {
    file: File,
    path: PathBuf,
}

/// State guarded by the append lock.
struct SegmentState {
    segment: Option<Segment>,
    written_bytes: u64,
    next_sequence: u64,
}

/// An [`EventSink`] writing to a local rotating write-ahead log.
///
/// Appends through [`EventSink`] never fail: serialization and I/O errors are logged and the
/// event is dropped. Use [`WalEventSink::append_event`] to observe errors.
pub struct WalEventSink {
    config: WalConfig,
    state: Mutex<SegmentState>,
}

impl WalEventSink {
    /// Open the log in `config.dir`, creating the directory and a fresh segment.
    ///
    /// Sequence numbers continue after the highest segment already present, so a restarted
    /// process never reuses a segment name.
    pub fn open(config: WalConfig) -> Result<WalEventSink> {
        std::fs::create_dir_all(&config.dir)?;

        let next_sequence = match list_segments(&config)?.last() {
            Some((sequence, path)) => sequence.checked_add(1).ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("segment sequence exhausted by {}", path.display()),
                )
            })?,
            None => 0,
        };

        let wal = WalEventSink {
            config,
            state: Mutex::new(SegmentState {
                segment: None,
                written_bytes: 0,
                next_sequence,
            }),
        };
        {
            let mut state = wal.lock_state();
            wal.open_segment(&mut state)?;
        }
        Ok(wal)
    }

    pub fn config(&self) -> &WalConfig {
        &self.config
    }

    /// Serialize and append `event`, returning any error instead of logging it.
    pub fn append_event(&self, event: &Event) -> Result<()> {
        let mut line =
            serde_json::to_vec(event).map_err(|err| Error::Serialization(Arc::new(err)))?;
        line.push(b'\n');

        let mut state = self.lock_state();
        self.rotate_if_needed(&mut state, line.len() as u64)?;
        self.write_line(&mut state, &line)
    }

    /// Path of the segment currently being written, if any.
    pub fn current_segment(&self) -> Option<PathBuf> {
        self.lock_state()
            .segment
            .as_ref()
            .map(|segment| segment.path.clone())
    }

    /// Force buffered data of the current segment to stable storage.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.lock_state();
        if let Some(segment) = state.segment.as_mut() {
            segment.file.flush()?;
            segment.file.sync_all()?;
        }
        Ok(())
    }

    /// Sync and close the current segment. A later append opens a new segment.
    pub fn close(&self) -> Result<()> {
        let mut state = self.lock_state();
        self.finalize_segment(&mut state)
    }

    /// All segments of this log, ordered by sequence number (which is also creation order).
    pub fn segments(&self) -> Result<Vec<PathBuf>> {
        Ok(list_segments(&self.config)?
            .into_iter()
            .map(|(_, path)| path)
            .collect())
    }

    fn lock_state(&self) -> MutexGuard<'_, SegmentState> {
        // A panic while holding the lock leaves the state usable: at worst the open segment ends
        // with a partial line, and `write_line` drops the handle on errors anyway.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rotate_if_needed(&self, state: &mut SegmentState, incoming: u64) -> Result<()> {
        if state.segment.is_none() {
            return self.open_segment(state);
        }
        // An oversized record still goes into an empty segment rather than rotating forever.
        if state.written_bytes == 0
            || state.written_bytes + incoming <= self.config.max_segment_bytes
        {
            return Ok(());
        }
        self.finalize_segment(state)?;
        self.open_segment(state)
    }

    fn open_segment(&self, state: &mut SegmentState) -> Result<()> {
        let sequence = state.next_sequence;
        let path = self.config.dir.join(self.config.segment_file_name(sequence));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written_bytes = file.metadata()?.len();

        state.next_sequence += 1;
        state.written_bytes = written_bytes;
        log::info!(target: "abassign", sequence; "opened event log segment {}", path.display());
        state.segment = Some(Segment { file, path });
        Ok(())
    }

    fn finalize_segment(&self, state: &mut SegmentState) -> Result<()> {
        let Some(mut segment) = state.segment.take() else {
            return Ok(());
        };
        state.written_bytes = 0;
        segment.file.flush()?;
        segment.file.sync_all()?;
        log::debug!(target: "abassign", "closed event log segment {}", segment.path.display());
        Ok(())
    }

    fn write_line(&self, state: &mut SegmentState, line: &[u8]) -> Result<()> {
        let Some(segment) = state.segment.as_mut() else {
            return Ok(());
        };
        let written = segment.file.write_all(line).and_then(|()| {
            if self.config.sync_on_write {
                segment.file.sync_data()
            } else {
                Ok(())
            }
        });
        match written {
            Ok(()) => {
                state.written_bytes += line.len() as u64;
                Ok(())
            }
            Err(err) => {
                // Never append after a possibly partial line: start over in a new segment.
                state.segment = None;
                state.written_bytes = 0;
                Err(err.into())
            }
        }
    }
}

impl EventSink for WalEventSink {
    fn append(&self, event: Event) {
        if let Err(err) = self.append_event(&event) {
            match err {
                Error::Serialization(_) => {
                    log::warn!(target: "abassign", "dropping event that failed to serialize: {err}")
                }
                _ => log::error!(target: "abassign",
                                 experiment = event.experiment();
                                 "event log write failed, event dropped: {err}"),
            }
        }
    }
}

impl Drop for WalEventSink {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(segment) = state.segment.as_mut() {
            let _ = segment.file.flush();
            let _ = segment.file.sync_all();
        }
    }
}

fn list_segments(config: &WalConfig) -> Result<Vec<(u64, PathBuf)>> {
    let mut segments = Vec::new();
    for entry in std::fs::read_dir(&config.dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        if let Some(sequence) = config.parse_sequence(&file_name.to_string_lossy()) {
            segments.push((sequence, entry.path()));
        }
    }
    segments.sort();
    Ok(segments)
}

/// Read every record of a segment, in append order.
pub fn read_segment(path: impl AsRef<Path>) -> Result<Vec<Event>> {
    let reader = BufReader::new(File::open(path)?);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line).map_err(|err| Error::Serialization(Arc::new(err)))?;
        events.push(event);
    }
    Ok(events)
}
