use std::time::{Duration, Instant};

use tracing::trace;

/// Per-second counters for the commit path, reported at trace level.
#[derive(Debug)]
pub struct FlipStats {
	window_start: Instant,
	commits: u64,
	confirmed: u64,
	mode_sets: u64,
	skipped: u64,
	poll_timeouts: u64,
	wait_sum: Duration,
	total_commits: u64,
}

impl Default for FlipStats {
	fn default() -> Self {
		Self::new(Instant::now())
	}
}

impl FlipStats {
	fn new(now: Instant) -> Self {
		Self {
			window_start: now,
			commits: 0,
			confirmed: 0,
			mode_sets: 0,
			skipped: 0,
			poll_timeouts: 0,
			wait_sum: Duration::ZERO,
			total_commits: 0,
		}
	}

	pub fn record_commit(&mut self) {
		self.commits = self.commits.saturating_add(1);
		self.total_commits = self.total_commits.saturating_add(1);
	}

	pub fn record_confirmed(&mut self, waited: Duration, timeouts: u32) {
		self.confirmed = self.confirmed.saturating_add(1);
		self.poll_timeouts = self.poll_timeouts.saturating_add(u64::from(timeouts));
		self.wait_sum += waited;
	}

	pub fn record_mode_set(&mut self) {
		self.mode_sets = self.mode_sets.saturating_add(1);
	}

	pub fn record_skipped(&mut self) {
		self.skipped = self.skipped.saturating_add(1);
	}

	/// Commits issued since the engine was created.
	pub fn total_commits(&self) -> u64 {
		self.total_commits
	}

	pub fn report_if_due(&mut self) {
		self.report_at(Instant::now());
	}

	fn report_at(&mut self, now: Instant) -> bool {
		let elapsed = now.saturating_duration_since(self.window_start);
		if elapsed < Duration::from_secs(1) {
			return false;
		}
		if self.commits > 0 {
			let hz = self.commits as f64 / elapsed.as_secs_f64();
			let avg_wait_ms = if self.confirmed > 0 {
				self.wait_sum.as_secs_f64() * 1000.0 / self.confirmed as f64
			} else {
				0.0
			};
			trace!(
				hz,
				confirmed = self.confirmed,
				mode_sets = self.mode_sets,
				skipped = self.skipped,
				poll_timeouts = self.poll_timeouts,
				avg_wait_ms,
				"flip stats"
			);
		}
		let total_commits = self.total_commits;
		*self = Self::new(now);
		self.total_commits = total_commits;
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn window_resets_after_report_but_total_survives() {
		let start = Instant::now();
		let mut stats = FlipStats::new(start);
		stats.record_commit();
		stats.record_confirmed(Duration::from_millis(16), 3);
		stats.record_commit();
		stats.record_skipped();

		assert!(!stats.report_at(start + Duration::from_millis(500)));
		assert_eq!(stats.commits, 2);

		assert!(stats.report_at(start + Duration::from_secs(1)));
		assert_eq!(stats.commits, 0);
		assert_eq!(stats.poll_timeouts, 0);
		assert_eq!(stats.total_commits(), 2);
	}
}
