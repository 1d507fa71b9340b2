use anyhow::Result;
use chrono::Local;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info};

use crate::checkpoint::{Checkpoint, CheckpointFile};
use crate::error::MatchError;
use crate::store::SheetStore;
use crate::types::{CellWrite, PendingWrite};

const WRITE_WINDOW_SECS: f64 = 60.0;

fn epoch_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Wall-clock time when a deferred write should have a free slot.
pub fn resume_time_hint(retry_after_secs: f64) -> String {
    let resume = Local::now() + chrono::Duration::seconds(retry_after_secs.ceil() as i64);
    resume.format("%H:%M:%S").to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    Success,
    /// The write window was full. Unwritten cells were parked in the
    /// checkpoint and will be flushed later.
    Deferred { retry_after_secs: f64 },
    /// A cell write failed for a reason other than rate limiting. The rest
    /// of the group was skipped and nothing was parked.
    Aborted { row: usize, col: usize },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub flushed: usize,
    pub failed: usize,
    pub remaining: usize,
}

enum CellsResult {
    Done,
    Limited { at: usize, retry_after_secs: f64 },
    Failed { at: usize },
}

/// Writes cell groups through a sliding one-minute window. The window and
/// any deferred groups live in the checkpoint, so limits survive restarts.
pub struct RateLimitedWriter<S: SheetStore> {
    store: S,
    checkpoint: CheckpointFile,
    writes_per_minute: usize,
}

impl<S: SheetStore> RateLimitedWriter<S> {
    pub fn new(store: S, checkpoint: CheckpointFile, writes_per_minute: usize) -> Self {
        Self {
            store,
            checkpoint,
            writes_per_minute,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint.state
    }

    pub fn checkpoint_file_mut(&mut self) -> &mut CheckpointFile {
        &mut self.checkpoint
    }

    pub fn has_pending(&self) -> bool {
        !self.checkpoint.state.pending_writes.is_empty()
    }

    pub fn save_checkpoint(&mut self) -> Result<()> {
        self.checkpoint.save()
    }

    /// Seconds until the window frees a slot, or None when one is free now.
    fn current_wait(&mut self) -> Option<f64> {
        let now = epoch_now();
        self.checkpoint
            .state
            .write_timestamps
            .retain(|&t| now - t <= WRITE_WINDOW_SECS);
        let window = &self.checkpoint.state.write_timestamps;
        if window.len() < self.writes_per_minute {
            None
        } else {
            let oldest = window.iter().cloned().fold(f64::INFINITY, f64::min);
            let wait = (WRITE_WINDOW_SECS - (now - oldest)).max(0.0).floor() + 1.0;
            Some(wait)
        }
    }

    fn write_cell(&mut self, row: usize, col: usize, value: &str) -> Result<(), MatchError> {
        if let Some(wait) = self.current_wait() {
            println!(
                "Write limit would be exceeded ({} writes per {}s).",
                self.writes_per_minute, WRITE_WINDOW_SECS as u64
            );
            println!(
                "Please wait ~{:.0} seconds (until {}) before retrying.",
                wait,
                resume_time_hint(wait)
            );
            return Err(MatchError::RateLimited {
                retry_after_secs: wait,
            });
        }
        if let Err(err) = self.store.update_cell(row, col, value) {
            println!("  Write failed at ({}, {}): {:#}", row, col, err);
            return Err(MatchError::WriteFailed {
                row,
                col,
                source: err,
            });
        }
        self.checkpoint.state.write_timestamps.push(epoch_now());
        Ok(())
    }

    fn write_cells(&mut self, row: usize, writes: &[CellWrite]) -> CellsResult {
        for (i, cell) in writes.iter().enumerate() {
            match self.write_cell(row, cell.col, &cell.value) {
                Ok(()) => {}
                Err(MatchError::RateLimited { retry_after_secs }) => {
                    return CellsResult::Limited {
                        at: i,
                        retry_after_secs,
                    };
                }
                Err(err) => {
                    error!("Cell write failed at row {} col {}: {}", row, cell.col, err);
                    return CellsResult::Failed { at: i };
                }
            }
        }
        CellsResult::Done
    }

    /// Write one group of cells for a row. Older deferred groups are always
    /// flushed first so writes land in the order they were confirmed.
    pub fn write_group(&mut self, group: &PendingWrite) -> Result<WriteOutcome> {
        if self.has_pending() {
            let report = self.flush_pending()?;
            if report.remaining > 0 {
                let retry_after_secs = self.current_wait().unwrap_or(0.0);
                self.checkpoint.state.pending_writes.push(group.clone());
                self.checkpoint.save()?;
                return Ok(WriteOutcome::Deferred { retry_after_secs });
            }
        }

        let outcome = match self.write_cells(group.row, &group.writes) {
            CellsResult::Done => WriteOutcome::Success,
            CellsResult::Limited {
                at,
                retry_after_secs,
            } => {
                self.checkpoint.state.pending_writes.push(PendingWrite {
                    row: group.row,
                    writes: group.writes[at..].to_vec(),
                });
                WriteOutcome::Deferred { retry_after_secs }
            }
            CellsResult::Failed { at } => WriteOutcome::Aborted {
                row: group.row,
                col: group.writes[at].col,
            },
        };
        self.checkpoint.save()?;
        Ok(outcome)
    }

    /// Flush deferred groups in order. Stops at the first rate limit and
    /// parks the remainder again. A group that fails outright is dropped
    /// and reported rather than retried forever.
    pub fn flush_pending(&mut self) -> Result<FlushReport> {
        let pending = std::mem::take(&mut self.checkpoint.state.pending_writes);
        let mut report = FlushReport::default();
        if pending.is_empty() {
            return Ok(report);
        }
        info!("Flushing {} pending write group(s)", pending.len());

        for (k, group) in pending.iter().enumerate() {
            match self.write_cells(group.row, &group.writes) {
                CellsResult::Done => report.flushed += 1,
                CellsResult::Failed { at } => {
                    error!(
                        "Dropping pending group for row {} after failed write to col {}",
                        group.row, group.writes[at].col
                    );
                    report.failed += 1;
                }
                CellsResult::Limited { at, .. } => {
                    let mut remaining = vec![PendingWrite {
                        row: group.row,
                        writes: group.writes[at..].to_vec(),
                    }];
                    remaining.extend(pending[k + 1..].iter().cloned());
                    report.remaining = remaining.len();
                    self.checkpoint.state.pending_writes = remaining;
                    break;
                }
            }
        }
        self.checkpoint.save()?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::tempdir;

    struct MemStore {
        rows: Vec<Vec<String>>,
        fail_at: HashSet<(usize, usize)>,
    }

    impl MemStore {
        fn new() -> Self {
            Self {
                rows: Vec::new(),
                fail_at: HashSet::new(),
            }
        }

        fn cell(&self, row: usize, col: usize) -> &str {
            self.rows
                .get(row - 1)
                .and_then(|r| r.get(col - 1))
                .map(|s| s.as_str())
                .unwrap_or("")
        }
    }

    impl SheetStore for MemStore {
        fn read_all(&self) -> Result<Vec<Vec<String>>> {
            Ok(self.rows.clone())
        }

        fn update_cell(&mut self, row: usize, col: usize, value: &str) -> Result<()> {
            if self.fail_at.contains(&(row, col)) {
                anyhow::bail!("simulated backend failure");
            }
            if row > self.rows.len() {
                self.rows.resize(row, Vec::new());
            }
            let target = &mut self.rows[row - 1];
            if col > target.len() {
                target.resize(col, String::new());
            }
            target[col - 1] = value.to_string();
            Ok(())
        }

        fn append_row(&mut self, values: &[String]) -> Result<()> {
            self.rows.push(values.to_vec());
            Ok(())
        }
    }

    fn group(row: usize, cols: &[usize]) -> PendingWrite {
        PendingWrite {
            row,
            writes: cols
                .iter()
                .map(|&col| CellWrite {
                    col,
                    value: format!("v{}", col),
                })
                .collect(),
        }
    }

    fn writer_with_cap(
        dir: &tempfile::TempDir,
        cap: usize,
    ) -> RateLimitedWriter<MemStore> {
        let checkpoint = CheckpointFile::load(dir.path().join("cp.json")).unwrap();
        RateLimitedWriter::new(MemStore::new(), checkpoint, cap)
    }

    #[test]
    fn test_group_split_when_window_fills() {
        let dir = tempdir().unwrap();
        let mut writer = writer_with_cap(&dir, 2);

        let outcome = writer.write_group(&group(5, &[26, 27, 28])).unwrap();
        match outcome {
            WriteOutcome::Deferred { retry_after_secs } => {
                assert!(retry_after_secs > 0.0 && retry_after_secs <= 61.0);
            }
            other => panic!("expected deferral, got {:?}", other),
        }
        assert_eq!(writer.store().cell(5, 26), "v26");
        assert_eq!(writer.store().cell(5, 27), "v27");
        assert_eq!(writer.store().cell(5, 28), "");
        assert_eq!(writer.checkpoint().pending_writes.len(), 1);
        assert_eq!(writer.checkpoint().pending_writes[0].writes.len(), 1);
        assert_eq!(writer.checkpoint().pending_writes[0].writes[0].col, 28);
    }

    #[test]
    fn test_third_row_deferred_at_cap_of_two() {
        let dir = tempdir().unwrap();
        let mut writer = writer_with_cap(&dir, 2);

        assert_eq!(
            writer.write_group(&group(3, &[26])).unwrap(),
            WriteOutcome::Success
        );
        assert_eq!(
            writer.write_group(&group(4, &[26])).unwrap(),
            WriteOutcome::Success
        );
        match writer.write_group(&group(5, &[26])).unwrap() {
            WriteOutcome::Deferred { .. } => {}
            other => panic!("expected deferral, got {:?}", other),
        }
        assert_eq!(writer.store().cell(3, 26), "v26");
        assert_eq!(writer.store().cell(4, 26), "v26");
        assert_eq!(writer.store().cell(5, 26), "");
        assert_eq!(writer.checkpoint().pending_writes.len(), 1);
        assert_eq!(writer.checkpoint().pending_writes[0].row, 5);
    }

    #[test]
    fn test_old_timestamps_age_out() {
        let dir = tempdir().unwrap();
        let mut writer = writer_with_cap(&dir, 1);
        let now = epoch_now();
        writer.checkpoint_file_mut().state.write_timestamps = vec![now - 61.0];

        let outcome = writer.write_group(&group(3, &[26])).unwrap();
        assert_eq!(outcome, WriteOutcome::Success);
        assert_eq!(writer.checkpoint().write_timestamps.len(), 1);
    }

    #[test]
    fn test_fresh_timestamp_blocks() {
        let dir = tempdir().unwrap();
        let mut writer = writer_with_cap(&dir, 1);
        let now = epoch_now();
        writer.checkpoint_file_mut().state.write_timestamps = vec![now - 0.5];

        let outcome = writer.write_group(&group(3, &[26])).unwrap();
        match outcome {
            WriteOutcome::Deferred { retry_after_secs } => {
                assert!(retry_after_secs > 58.0 && retry_after_secs <= 61.0);
            }
            other => panic!("expected deferral, got {:?}", other),
        }
        assert_eq!(writer.store().cell(3, 26), "");
        assert_eq!(writer.checkpoint().pending_writes.len(), 1);
    }

    #[test]
    fn test_failed_cell_aborts_rest_of_group() {
        let dir = tempdir().unwrap();
        let mut writer = writer_with_cap(&dir, 10);
        writer.store.fail_at.insert((5, 27));

        let outcome = writer.write_group(&group(5, &[26, 27, 28])).unwrap();
        assert_eq!(outcome, WriteOutcome::Aborted { row: 5, col: 27 });
        assert_eq!(writer.store().cell(5, 26), "v26");
        assert_eq!(writer.store().cell(5, 28), "");
        // Failures are not parked for retry.
        assert!(writer.checkpoint().pending_writes.is_empty());
    }

    #[test]
    fn test_pending_flushed_before_new_group() {
        let dir = tempdir().unwrap();
        let mut writer = writer_with_cap(&dir, 10);
        writer
            .checkpoint_file_mut()
            .state
            .pending_writes
            .push(group(2, &[26]));

        let outcome = writer.write_group(&group(3, &[26])).unwrap();
        assert_eq!(outcome, WriteOutcome::Success);
        assert_eq!(writer.store().cell(2, 26), "v26");
        assert_eq!(writer.store().cell(3, 26), "v26");
        assert!(writer.checkpoint().pending_writes.is_empty());
    }

    #[test]
    fn test_deferred_writes_survive_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cp.json");

        let checkpoint = CheckpointFile::load(&path).unwrap();
        let mut writer = RateLimitedWriter::new(MemStore::new(), checkpoint, 1);
        assert_eq!(writer.write_group(&group(2, &[26])).unwrap(), WriteOutcome::Success);
        match writer.write_group(&group(3, &[26])).unwrap() {
            WriteOutcome::Deferred { .. } => {}
            other => panic!("expected deferral, got {:?}", other),
        }
        drop(writer);

        // New process: the window has expired, the parked group flushes.
        let checkpoint = CheckpointFile::load(&path).unwrap();
        assert_eq!(checkpoint.state.pending_writes.len(), 1);
        let mut writer = RateLimitedWriter::new(MemStore::new(), checkpoint, 1);
        writer.checkpoint_file_mut().state.write_timestamps.clear();

        let report = writer.flush_pending().unwrap();
        assert_eq!(report.flushed, 1);
        assert_eq!(report.remaining, 0);
        assert_eq!(writer.store().cell(3, 26), "v26");
    }

    #[test]
    fn test_flush_drops_failed_group_and_continues() {
        let dir = tempdir().unwrap();
        let mut writer = writer_with_cap(&dir, 10);
        writer.store.fail_at.insert((2, 26));
        writer
            .checkpoint_file_mut()
            .state
            .pending_writes
            .extend([group(2, &[26]), group(3, &[26])]);

        let report = writer.flush_pending().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.flushed, 1);
        assert_eq!(report.remaining, 0);
        assert_eq!(writer.store().cell(3, 26), "v26");
        assert!(writer.checkpoint().pending_writes.is_empty());
    }

    #[test]
    fn test_flush_stops_at_rate_limit_and_keeps_order() {
        let dir = tempdir().unwrap();
        let mut writer = writer_with_cap(&dir, 1);
        writer
            .checkpoint_file_mut()
            .state
            .pending_writes
            .extend([group(2, &[26]), group(3, &[26]), group(4, &[26])]);

        let report = writer.flush_pending().unwrap();
        assert_eq!(report.flushed, 1);
        assert_eq!(report.remaining, 2);
        let pending = &writer.checkpoint().pending_writes;
        assert_eq!(pending[0].row, 3);
        assert_eq!(pending[1].row, 4);
    }
}
