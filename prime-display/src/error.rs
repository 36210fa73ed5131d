use std::path::PathBuf;

use thiserror::Error;

use crate::device::{ConnectorId, CrtcId};

#[derive(Debug, Error)]
pub enum DisplayError {
	#[error("failed to open display device {path}: {source}")]
	Open {
		path: PathBuf,
		source: std::io::Error,
	},
	#[error("{op} failed: {source}")]
	Io {
		op: &'static str,
		source: std::io::Error,
	},
	#[error("kernel returned an invalid {kind} handle ({id})")]
	InvalidHandle { kind: &'static str, id: u32 },
	#[error("waiting on the display device failed: {0}")]
	Wait(#[from] nix::Error),
}

impl DisplayError {
	pub(crate) fn io(op: &'static str) -> impl FnOnce(std::io::Error) -> Self {
		move |source| Self::Io { op, source }
	}
}

/// Why the pipeline refused an asynchronous flip.
#[derive(Debug, Error)]
pub enum CommitRejection {
	/// Usually no mode has been set on the CRTC yet; recoverable with a mode-set.
	#[error("flip rejected as invalid (no prior mode-set?)")]
	InvalidParameter,
	#[error("flip rejected: pipeline busy")]
	Busy,
	#[error("flip rejected: {0}")]
	Other(std::io::Error),
}

impl From<std::io::Error> for CommitRejection {
	fn from(err: std::io::Error) -> Self {
		match nix::errno::Errno::from_raw(err.raw_os_error().unwrap_or(0)) {
			nix::errno::Errno::EINVAL => Self::InvalidParameter,
			nix::errno::Errno::EBUSY => Self::Busy,
			_ => Self::Other(err),
		}
	}
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
	#[error(transparent)]
	Device(#[from] DisplayError),
	#[error("no connected output of an accepted connector type")]
	NoConnectedOutput,
	#[error("connector {0} is connected but not driven by any encoder/crtc")]
	NoBoundEncoder(ConnectorId),
}

#[derive(Debug, Error)]
pub enum ScanoutError {
	#[error(transparent)]
	Device(#[from] DisplayError),
	#[error("no framebuffer is bound on crtc {0}")]
	NotBound(CrtcId),
	#[error("crtc {0} has no active mode to reuse for a mode-set")]
	NoActiveMode(CrtcId),
	#[error("mode-set on crtc {crtc} refused: {source}")]
	ModeSet { crtc: CrtcId, source: DisplayError },
	#[error("flip wait aborted: {0}")]
	FlipWait(DisplayError),
}

#[derive(Debug, Error)]
pub enum LifecycleError {
	#[error("buffer allocation failed: {0}")]
	Allocation(#[source] Box<dyn std::error::Error + Send + Sync>),
	#[error("exporting the shared buffer failed: {0}")]
	Export(#[source] Box<dyn std::error::Error + Send + Sync>),
	#[error("locking the front buffer failed: {0}")]
	FrontBuffer(#[source] Box<dyn std::error::Error + Send + Sync>),
	#[error("a front buffer is already locked and has not been released")]
	FrontBufferOutstanding,
	#[error("no shared buffer has been acquired yet")]
	NoSharedBuffer,
}

#[cfg(test)]
mod tests {
	use nix::errno::Errno;

	use super::*;

	#[test]
	fn rejection_is_classified_from_errno() {
		let classify =
			|errno: Errno| CommitRejection::from(std::io::Error::from_raw_os_error(errno as i32));
		assert!(matches!(classify(Errno::EINVAL), CommitRejection::InvalidParameter));
		assert!(matches!(classify(Errno::EBUSY), CommitRejection::Busy));
		assert!(matches!(classify(Errno::EACCES), CommitRejection::Other(_)));
	}
}
