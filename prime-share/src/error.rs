use std::error::Error as StdError;

use prime_display::{DiscoveryError, DisplayError, LifecycleError, ScanoutError};
use prime_protocol::ProtocolError;
use prime_render::{ImportError, RenderError};
use thiserror::Error;
use tracing::warn;

/// How a failure affects the loop that hit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
	/// The channel itself broke.
	Transport,
	/// A message arrived but did not look like one buffer descriptor.
	Validation,
	ResourceExhaustion,
	/// The display pipeline refused a request.
	DeviceRejection,
	CapabilityMissing,
	Initialization,
}

impl FailureClass {
	/// Fatal classes end the loop; the rest are logged and the loop moves on.
	pub fn is_fatal(self) -> bool {
		matches!(self, FailureClass::Transport | FailureClass::Initialization)
	}
}

#[derive(Debug, Error)]
pub enum ShareError {
	#[error("invalid value {value:?} for {var}")]
	Config { var: &'static str, value: String },
	#[error("channel error: {0}")]
	Protocol(#[from] ProtocolError),
	#[error("display error: {0}")]
	Display(#[from] DisplayError),
	#[error("output discovery failed: {0}")]
	Discovery(#[from] DiscoveryError),
	#[error("scan-out error: {0}")]
	Scanout(#[from] ScanoutError),
	#[error("buffer lifecycle error: {0}")]
	Lifecycle(#[from] LifecycleError),
	#[error("render error: {0}")]
	Render(#[from] RenderError),
	#[error("import error: {0}")]
	Import(#[from] ImportError),
	#[error("{stage} failed: {source}")]
	Setup {
		stage: &'static str,
		source: Box<dyn StdError + Send + Sync>,
	},
	#[error("fork failed: {0}")]
	Fork(#[source] nix::Error),
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
}

impl ShareError {
	/// Wrap a startup failure; these always end the process.
	pub fn setup<E>(stage: &'static str) -> impl FnOnce(E) -> Self
	where
		E: StdError + Send + Sync + 'static,
	{
		move |err| Self::Setup {
			stage,
			source: Box::new(err),
		}
	}

	pub fn class(&self) -> FailureClass {
		match self {
			ShareError::Protocol(err) if err.is_transport() => FailureClass::Transport,
			ShareError::Protocol(_) => FailureClass::Validation,
			ShareError::Config { .. }
			| ShareError::Setup { .. }
			| ShareError::Fork(_)
			| ShareError::Discovery(_) => FailureClass::Initialization,
			ShareError::Display(_) => FailureClass::DeviceRejection,
			// Framebuffer registration and CRTC queries; refusals of the flip
			// or the mode-set itself are their own variants.
			ShareError::Scanout(ScanoutError::Device(_)) => FailureClass::ResourceExhaustion,
			ShareError::Scanout(
				ScanoutError::ModeSet { .. }
				| ScanoutError::NotBound(_)
				| ScanoutError::NoActiveMode(_)
				| ScanoutError::FlipWait(_),
			) => FailureClass::DeviceRejection,
			ShareError::Lifecycle(_) => FailureClass::ResourceExhaustion,
			ShareError::Render(err) if err.is_capability_missing() => FailureClass::CapabilityMissing,
			ShareError::Import(err) if err.is_capability_missing() => FailureClass::CapabilityMissing,
			ShareError::Render(_) | ShareError::Import(_) => FailureClass::ResourceExhaustion,
			// Operator input went away.
			ShareError::Io(_) => FailureClass::Transport,
		}
	}
}

/// Log a non-fatal failure and carry on; fatal ones are handed back.
pub fn absorb(result: Result<(), ShareError>, step: &'static str) -> Result<(), ShareError> {
	match result {
		Err(err) if !err.class().is_fatal() => {
			warn!(class = ?err.class(), %err, "{step} failed, continuing");
			Ok(())
		}
		other => other,
	}
}
