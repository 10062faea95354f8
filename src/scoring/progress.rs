//! Run statistics and the verbose progress display

use crate::util::truncate_str;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Totals for a finished (or running) scoring run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    /// Rows written to the output
    pub rows_written: usize,
    /// Rows dropped because scoring failed
    pub rows_errored: usize,
    /// Pages read from the dumps, eligible or not
    pub pages_processed: usize,
    pub files_processed: usize,
    pub elapsed_seconds: f64,
    pub rows_per_second: f64,
}

impl RunStats {
    pub fn update_rate(&mut self) {
        if self.elapsed_seconds > 0.0 {
            self.rows_per_second = self.rows_written as f64 / self.elapsed_seconds;
        }
    }
}

/// Progress tracker for a scoring run
pub struct ScoreProgress {
    /// Spinner on stderr, verbose mode only
    progress_bar: Option<ProgressBar>,
    start_time: Instant,
    rows_written: AtomicUsize,
    rows_errored: AtomicUsize,
    pages_processed: AtomicUsize,
    files_processed: AtomicUsize,
}

impl ScoreProgress {
    pub fn new(verbose: bool) -> Self {
        let progress_bar = verbose.then(|| {
            let pb = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {pos} scored {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb
        });

        Self {
            progress_bar,
            start_time: Instant::now(),
            rows_written: AtomicUsize::new(0),
            rows_errored: AtomicUsize::new(0),
            pages_processed: AtomicUsize::new(0),
            files_processed: AtomicUsize::new(0),
        }
    }

    /// A row reached the output
    pub fn row_written(&self, title: &str, prediction: &str) {
        let written = self.rows_written.fetch_add(1, Ordering::Relaxed) + 1;

        if let Some(ref pb) = self.progress_bar {
            pb.inc(1);
            let elapsed = self.start_time.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 { written as f64 / elapsed } else { 0.0 };
            pb.set_message(format!(
                "{:.1} rows/s | {}: {}",
                rate,
                truncate_str(title, 30),
                prediction
            ));
        }
    }

    /// A row was dropped because its score failed
    pub fn row_errored(&self) {
        self.rows_errored.fetch_add(1, Ordering::Relaxed);
        if let Some(ref pb) = self.progress_bar {
            pb.inc(1);
        }
    }

    pub fn file_finished(&self, pages: usize) {
        self.pages_processed.fetch_add(pages, Ordering::Relaxed);
        self.files_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> RunStats {
        let mut stats = RunStats {
            rows_written: self.rows_written.load(Ordering::Relaxed),
            rows_errored: self.rows_errored.load(Ordering::Relaxed),
            pages_processed: self.pages_processed.load(Ordering::Relaxed),
            files_processed: self.files_processed.load(Ordering::Relaxed),
            elapsed_seconds: self.start_time.elapsed().as_secs_f64(),
            rows_per_second: 0.0,
        };
        stats.update_rate();
        stats
    }

    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            let stats = self.get_stats();
            pb.finish_with_message(format!(
                "Done! {} rows, {} errors, {:.1} rows/s",
                stats.rows_written, stats.rows_errored, stats.rows_per_second
            ));
        }
    }

    /// Stop drawing without a final message, e.g. after a failed run
    pub fn abandon(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.abandon();
        }
    }
}
