use std::fmt;
use std::time::Duration;

use drm::buffer::DrmFourcc;

use crate::error::{CommitRejection, DisplayError};

macro_rules! define_ids {
	($( $(#[$meta:meta])* $name:ident ),* $(,)?) => {
		$(
			$(#[$meta])*
			#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
			pub struct $name(pub u32);

			impl fmt::Display for $name {
				fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
					self.0.fmt(f)
				}
			}
		)*
	};
}

define_ids! {
	ConnectorId,
	EncoderId,
	/// Display pipeline (CRTC) driving a connector.
	CrtcId,
	/// Registered framebuffer; never 0.
	FramebufferId,
}

/// Physical connector class, reduced to what the output policy cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorKind {
	HdmiA,
	HdmiB,
	DisplayPort,
	EmbeddedDisplayPort,
	Dvi,
	Vga,
	Virtual,
	Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorInfo {
	pub id: ConnectorId,
	pub kind: ConnectorKind,
	pub connected: bool,
	/// Encoder currently attached to the connector, if any.
	pub encoder: Option<EncoderId>,
}

/// Current scan-out position and mode of a CRTC, as needed to redo a mode-set.
#[derive(Debug, Clone, PartialEq)]
pub struct CrtcState<M> {
	pub position: (u32, u32),
	pub mode: Option<M>,
}

/// Everything needed to register a buffer as a framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferLayout {
	pub width: u32,
	pub height: u32,
	pub format: DrmFourcc,
	pub depth: u32,
	pub bpp: u32,
	pub pitch: u32,
	/// GEM handle of the buffer on this device.
	pub handle: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
	Readable,
	TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlipEvent {
	pub crtc: CrtcId,
	pub frame: u32,
}

/// The subset of a KMS device the scan-out path drives.
///
/// Implemented by [`crate::kms::Card`] for real hardware and by an in-memory
/// fake in tests.
pub trait DisplayDevice {
	type Mode: Clone + fmt::Debug;

	fn connectors(&self) -> Result<Vec<ConnectorInfo>, DisplayError>;

	/// CRTC the encoder currently feeds, `None` if it is idle.
	fn encoder_crtc(&self, encoder: EncoderId) -> Result<Option<CrtcId>, DisplayError>;

	fn add_framebuffer(&self, layout: &FramebufferLayout) -> Result<FramebufferId, DisplayError>;

	fn remove_framebuffer(&self, framebuffer: FramebufferId) -> Result<(), DisplayError>;

	/// Queue a flip to `framebuffer` on the next vblank, asking for a completion event.
	fn request_flip(&self, crtc: CrtcId, framebuffer: FramebufferId) -> Result<(), CommitRejection>;

	fn crtc_state(&self, crtc: CrtcId) -> Result<CrtcState<Self::Mode>, DisplayError>;

	/// Synchronous mode-set binding `framebuffer` to `crtc` and `connector`.
	fn set_crtc(
		&self,
		crtc: CrtcId,
		framebuffer: FramebufferId,
		connector: ConnectorId,
		state: &CrtcState<Self::Mode>,
	) -> Result<(), DisplayError>;

	/// Block until the device has events to read or `timeout` elapses.
	fn wait_for_events(&self, timeout: Duration) -> Result<Readiness, DisplayError>;

	/// Read pending events, handing every page-flip completion to `on_flip`.
	fn dispatch_events(&self, on_flip: &mut dyn FnMut(FlipEvent)) -> Result<(), DisplayError>;
}

/// DRM master handling for the two process roles.
pub trait DisplayAuthority {
	fn acquire_authority(&self) -> Result<(), DisplayError>;
	fn relinquish_authority(&self) -> Result<(), DisplayError>;
}
