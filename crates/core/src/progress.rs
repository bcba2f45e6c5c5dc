//! Periodic completion/ETA reporting for the tile loop.
//!
//! Purely observational: failures to emit cannot occur through `tracing`,
//! and nothing here feeds back into control flow.

use std::time::Instant;

use tracing::info;

/// Emits at most one report per half second, plus unconditionally within
/// the last few tiles so a run never ends silently.
pub struct ProgressReporter {
    total: u64,
    done: u64,
    begin: Instant,
    last_report: Option<Instant>,
}

impl ProgressReporter {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            done: 0,
            begin: Instant::now(),
            last_report: None,
        }
    }

    pub fn done(&self) -> u64 {
        self.done
    }

    pub fn tile_done(&mut self) {
        self.done += 1;
        let now = Instant::now();

        let throttled = match self.last_report {
            None => false,
            Some(at) => now.duration_since(at).as_secs_f64() <= 0.5,
        };
        let near_end = self.done + 2 >= self.total;
        if throttled && !near_end {
            return;
        }

        let progress = self.done as f64 / self.total.max(1) as f64;
        let elapsed = now.duration_since(self.begin).as_secs_f64();
        let eta = if progress > 0.0 {
            elapsed / progress - elapsed
        } else {
            0.0
        };

        info!(
            tiles_done = self.done,
            tiles_total = self.total,
            percent = (progress * 10000.0).round() / 100.0,
            elapsed_secs = elapsed,
            eta_secs = eta,
            "tile progress"
        );
        self.last_report = Some(now);
    }
}
