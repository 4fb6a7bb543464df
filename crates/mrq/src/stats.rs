//! 📊 stats.rs: "How did it go?" The question every run must answer, honestly.
//!
//! 🚀 One owned accumulator per run. The pipeline loop holds it, feeds it a
//! [`BatchTally`] after every submission, and hands it over to `finish()` at the end.
//! No globals, no atomics, no shared counters lurking in a `static`.
//!
//! 🧠 Knowledge graph:
//! - `indexed` and `errors` only ever go up (saturating adds).
//! - `docs_per_sec = indexed * 1000 / elapsed_ms`, and 0 when no millisecond has passed.
//! - A run with any error, or one that was cancelled, is a failure report. The counts
//!   and the timings are in there either way. 🦆

use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};

/// 🧾 What one batch contributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchTally {
    pub indexed: u64,
    pub errors: u64,
}

/// 📦 The running totals. Created right before the first batch.
#[derive(Debug, Clone)]
pub struct RunStats {
    indexed: u64,
    errors: u64,
    batches_submitted: u64,
    started: Instant,
}

/// 🏁 The final word on a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub indexed: u64,
    pub errors: u64,
    pub batches_submitted: u64,
    pub elapsed: Duration,
    pub docs_per_sec: u64,
    pub cancelled: bool,
}

impl RunStats {
    pub fn start() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(started: Instant) -> Self {
        Self {
            indexed: 0,
            errors: 0,
            batches_submitted: 0,
            started,
        }
    }

    /// ➕ Fold one submitted batch into the totals.
    pub fn absorb(&mut self, tally: BatchTally) {
        self.indexed = self.indexed.saturating_add(tally.indexed);
        self.errors = self.errors.saturating_add(tally.errors);
        self.batches_submitted += 1;
    }

    /// ➕ Errors that never made it into a batch (skipped encodes).
    pub fn add_errors(&mut self, errors: u64) {
        self.errors = self.errors.saturating_add(errors);
    }

    pub fn indexed(&self) -> u64 {
        self.indexed
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }

    pub fn finish(self, cancelled: bool) -> RunReport {
        self.finish_at(Instant::now(), cancelled)
    }

    pub fn finish_at(self, now: Instant, cancelled: bool) -> RunReport {
        let elapsed = now.saturating_duration_since(self.started);
        RunReport {
            indexed: self.indexed,
            errors: self.errors,
            batches_submitted: self.batches_submitted,
            elapsed,
            docs_per_sec: docs_per_sec(self.indexed, elapsed),
            cancelled,
        }
    }
}

/// 🚀 Documents per second, in whole documents. 0 when the clock barely moved.
pub fn docs_per_sec(indexed: u64, elapsed: Duration) -> u64 {
    let elapsed_ms = elapsed.as_millis();
    if elapsed_ms == 0 {
        return 0;
    }
    (u128::from(indexed) * 1000 / elapsed_ms) as u64
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.errors == 0 && !self.cancelled
    }

    /// 📣 One line for the log, with commas where humans expect them.
    pub fn summary_line(&self) -> String {
        let elapsed = Duration::from_millis(self.elapsed.as_millis() as u64);
        if self.cancelled {
            format!(
                "🛑 Cancelled after indexing [{}] documents with [{}] errors in {:?} ({} docs/sec)",
                format_number(self.indexed),
                format_number(self.errors),
                elapsed,
                format_number(self.docs_per_sec)
            )
        } else if self.errors > 0 {
            format!(
                "💀 Indexed [{}] documents with [{}] errors in {:?} ({} docs/sec)",
                format_number(self.indexed),
                format_number(self.errors),
                elapsed,
                format_number(self.docs_per_sec)
            )
        } else {
            format!(
                "✅ Successfully indexed [{}] documents in {:?} ({} docs/sec)",
                format_number(self.indexed),
                elapsed,
                format_number(self.docs_per_sec)
            )
        }
    }

    /// 🍽️ The comfy version of the summary, for the terminal.
    pub fn render_table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        let outcome = if self.cancelled {
            "cancelled"
        } else if self.errors > 0 {
            "failed"
        } else {
            "succeeded"
        };
        let rows = [
            ("outcome", outcome.to_string()),
            ("indexed", format_number(self.indexed)),
            ("errors", format_number(self.errors)),
            ("batches", format_number(self.batches_submitted)),
            ("elapsed", format_duration(self.elapsed)),
            ("docs/s", format_number(self.docs_per_sec)),
        ];
        for (label, value) in rows {
            table.add_row(vec![
                Cell::new(label),
                Cell::new(value).set_alignment(CellAlignment::Right),
            ]);
        }
        table
    }
}

/// 🔢 "1000000" → "1,000,000". You're welcome, eyes.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS.mmm, or HH:MM:SS.mmm if you had time for a nap.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
    } else {
        format!("{:02}:{:02}.{:03}", minutes, seconds, millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_a_thousand_docs_in_two_seconds_is_five_hundred() {
        assert_eq!(docs_per_sec(1000, Duration::from_millis(2000)), 500);
    }

    #[test]
    fn the_one_where_zero_milliseconds_does_not_divide_by_zero() {
        assert_eq!(docs_per_sec(1000, Duration::ZERO), 0);
        assert_eq!(docs_per_sec(1000, Duration::from_micros(999)), 0);
        assert_eq!(docs_per_sec(0, Duration::from_secs(3)), 0);
    }

    #[test]
    fn the_one_where_counts_only_go_up() {
        let the_start = Instant::now();
        let mut the_stats = RunStats::started_at(the_start);
        the_stats.absorb(BatchTally {
            indexed: 255,
            errors: 0,
        });
        the_stats.absorb(BatchTally {
            indexed: 0,
            errors: 255,
        });
        the_stats.add_errors(1);
        assert_eq!(the_stats.indexed(), 255);
        assert_eq!(the_stats.errors(), 256);

        let the_report = the_stats.finish_at(the_start + Duration::from_millis(510), false);
        assert_eq!(the_report.batches_submitted, 2);
        assert_eq!(the_report.docs_per_sec, 500);
        assert!(!the_report.succeeded(), "any error makes the run a failure");
        assert!(the_report.summary_line().contains("[256] errors"));
    }

    #[test]
    fn the_one_where_a_clean_run_says_so() {
        let the_start = Instant::now();
        let mut the_stats = RunStats::started_at(the_start);
        the_stats.absorb(BatchTally {
            indexed: 45_466,
            errors: 0,
        });
        let the_report = the_stats.finish_at(the_start + Duration::from_secs(2), false);
        assert!(the_report.succeeded());
        assert_eq!(the_report.docs_per_sec, 22_733);
        let the_line = the_report.summary_line();
        assert!(the_line.contains("Successfully indexed [45,466] documents"), "{the_line}");
        assert!(the_line.contains("22,733 docs/sec"), "{the_line}");
        assert!(the_report.render_table().to_string().contains("succeeded"));
    }

    #[test]
    fn the_one_where_cancelled_is_never_a_success() {
        let the_report = RunStats::start().finish(true);
        assert!(!the_report.succeeded());
        assert!(the_report.summary_line().starts_with("🛑"));
    }

    #[test]
    fn the_one_where_commas_land_where_humans_expect() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_duration(Duration::from_millis(61_005)), "01:01.005");
    }
}
