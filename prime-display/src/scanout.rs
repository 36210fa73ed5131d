use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::buffer::ScanoutSource;
use crate::device::{
	ConnectorId, CrtcId, DisplayDevice, FlipEvent, FramebufferId, FramebufferLayout, Readiness,
};
use crate::error::{CommitRejection, ScanoutError};
use crate::stats::FlipStats;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A framebuffer registered on the target, with the layout it was created from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundFramebuffer {
	pub id: FramebufferId,
	pub layout: FramebufferLayout,
}

/// The one physical output this process drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayTarget {
	pub connector: ConnectorId,
	pub crtc: CrtcId,
	/// `None` while nothing is bound.
	pub framebuffer: Option<BoundFramebuffer>,
}

impl DisplayTarget {
	pub fn new(connector: ConnectorId, crtc: CrtcId) -> Self {
		Self {
			connector,
			crtc,
			framebuffer: None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanoutState {
	Idle,
	FramebufferBound,
	FlipRequested,
	FlipConfirmed,
	FlipRejected,
	ModeSet,
}

#[derive(Debug)]
pub enum CommitOutcome {
	/// The flip completed; `timeouts` counts the empty polls before the event.
	FlipConfirmed { timeouts: u32 },
	/// The flip was refused as invalid and a synchronous mode-set took its place.
	ModeSet,
	/// Soft failure for this cycle. Nothing was retried.
	Skipped(CommitRejection),
}

/// Binds buffers to a [`DisplayTarget`] and commits them, waiting for the
/// hardware to confirm each flip.
#[derive(Debug)]
pub struct ScanoutEngine {
	poll_interval: Duration,
	state: ScanoutState,
	stats: FlipStats,
}

impl Default for ScanoutEngine {
	fn default() -> Self {
		Self::new(DEFAULT_POLL_INTERVAL)
	}
}

impl ScanoutEngine {
	pub fn new(poll_interval: Duration) -> Self {
		Self {
			poll_interval,
			state: ScanoutState::Idle,
			stats: FlipStats::default(),
		}
	}

	pub fn state(&self) -> ScanoutState {
		self.state
	}

	pub fn stats(&self) -> &FlipStats {
		&self.stats
	}

	/// Retire whatever is bound on `target`, then register `source` in its place.
	pub fn bind_framebuffer<D, S>(
		&mut self,
		device: &D,
		target: &mut DisplayTarget,
		source: &S,
	) -> Result<FramebufferId, ScanoutError>
	where
		D: DisplayDevice + ?Sized,
		S: ScanoutSource + ?Sized,
	{
		self.retire(device, target);
		let layout = source.layout();
		let id = device.add_framebuffer(&layout)?;
		debug!(
			framebuffer = %id,
			width = layout.width,
			height = layout.height,
			depth = layout.depth,
			bpp = layout.bpp,
			pitch = layout.pitch,
			"framebuffer bound"
		);
		target.framebuffer = Some(BoundFramebuffer { id, layout });
		self.state = ScanoutState::FramebufferBound;
		Ok(id)
	}

	/// Present the bound framebuffer.
	///
	/// Tries a page flip first. A flip refused as invalid falls back to exactly
	/// one synchronous mode-set; any other refusal skips this cycle.
	pub fn commit<D>(&mut self, device: &D, target: &DisplayTarget) -> Result<CommitOutcome, ScanoutError>
	where
		D: DisplayDevice + ?Sized,
	{
		let framebuffer = target
			.framebuffer
			.as_ref()
			.ok_or(ScanoutError::NotBound(target.crtc))?
			.id;
		self.stats.record_commit();
		self.state = ScanoutState::FlipRequested;

		match device.request_flip(target.crtc, framebuffer) {
			Ok(()) => {
				let timeouts = self.wait_for_flip(device, target.crtc)?;
				self.state = ScanoutState::FlipConfirmed;
				Ok(CommitOutcome::FlipConfirmed { timeouts })
			}
			Err(CommitRejection::InvalidParameter) => {
				self.state = ScanoutState::FlipRejected;
				debug!(crtc = %target.crtc, "flip refused as invalid, falling back to mode-set");
				self.commit_sync(device, target, framebuffer)?;
				Ok(CommitOutcome::ModeSet)
			}
			Err(rejection) => {
				self.state = ScanoutState::FlipRejected;
				self.stats.record_skipped();
				warn!(crtc = %target.crtc, %rejection, "skipping commit this cycle");
				Ok(CommitOutcome::Skipped(rejection))
			}
		}
	}

	pub fn scan_out<D, S>(
		&mut self,
		device: &D,
		target: &mut DisplayTarget,
		source: &S,
	) -> Result<CommitOutcome, ScanoutError>
	where
		D: DisplayDevice + ?Sized,
		S: ScanoutSource + ?Sized,
	{
		self.bind_framebuffer(device, target, source)?;
		let outcome = self.commit(device, target);
		self.stats.report_if_due();
		outcome
	}

	/// Remove the bound framebuffer before the process lets go of the device.
	pub fn teardown<D>(&mut self, device: &D, target: &mut DisplayTarget)
	where
		D: DisplayDevice + ?Sized,
	{
		self.retire(device, target);
		self.state = ScanoutState::Idle;
		info!(commits = self.stats.total_commits(), "scan-out torn down");
	}

	/// Forget the bound framebuffer. The id is dropped from the target even when
	/// the kernel refuses to remove it, so one bad id cannot wedge later binds.
	fn retire<D>(&mut self, device: &D, target: &mut DisplayTarget)
	where
		D: DisplayDevice + ?Sized,
	{
		let Some(old) = target.framebuffer.take() else {
			return;
		};
		self.state = ScanoutState::Idle;
		match device.remove_framebuffer(old.id) {
			Ok(()) => debug!(framebuffer = %old.id, "framebuffer retired"),
			Err(err) => warn!(framebuffer = %old.id, %err, "removing framebuffer failed, dropping it anyway"),
		}
	}

	fn commit_sync<D>(
		&mut self,
		device: &D,
		target: &DisplayTarget,
		framebuffer: FramebufferId,
	) -> Result<(), ScanoutError>
	where
		D: DisplayDevice + ?Sized,
	{
		let current = device.crtc_state(target.crtc)?;
		if current.mode.is_none() {
			return Err(ScanoutError::NoActiveMode(target.crtc));
		}
		device
			.set_crtc(target.crtc, framebuffer, target.connector, &current)
			.map_err(|source| ScanoutError::ModeSet {
				crtc: target.crtc,
				source,
			})?;
		self.state = ScanoutState::ModeSet;
		self.stats.record_mode_set();
		info!(crtc = %target.crtc, connector = %target.connector, %framebuffer, "mode-set committed");
		Ok(())
	}

	/// Block until the flip completion event for `crtc` has been dispatched.
	///
	/// Returns the number of polls that timed out on the way.
	fn wait_for_flip<D>(&mut self, device: &D, crtc: CrtcId) -> Result<u32, ScanoutError>
	where
		D: DisplayDevice + ?Sized,
	{
		let confirmed = AtomicBool::new(false);
		let started = Instant::now();
		let mut timeouts = 0u32;
		let mut on_flip = |event: FlipEvent| {
			if event.crtc == crtc {
				confirmed.store(true, Ordering::Relaxed);
			} else {
				debug!(crtc = %event.crtc, "flip event for another crtc");
			}
		};

		while !confirmed.load(Ordering::Relaxed) {
			match device
				.wait_for_events(self.poll_interval)
				.map_err(ScanoutError::FlipWait)?
			{
				Readiness::TimedOut => {
					timeouts += 1;
					debug!(%crtc, timeouts, "still waiting for flip");
				}
				Readiness::Readable => device
					.dispatch_events(&mut on_flip)
					.map_err(ScanoutError::FlipWait)?,
			}
		}

		let waited = started.elapsed();
		self.stats.record_confirmed(waited, timeouts);
		debug!(%crtc, timeouts, waited_ms = waited.as_millis() as u64, "flip confirmed");
		Ok(timeouts)
	}
}
