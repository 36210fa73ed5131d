use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::path::Path;
use std::time::Duration;

use drm::buffer::{self, DrmFourcc};
use drm::control::{
	self, Device as ControlDevice, Event, Mode, PageFlipFlags, RawResourceHandle, connector, crtc,
	encoder, framebuffer,
};
use drm::Device as _;
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, poll};
use tracing::{debug, trace, warn};

use crate::device::{
	ConnectorId, ConnectorInfo, ConnectorKind, CrtcId, CrtcState, DisplayAuthority, DisplayDevice,
	EncoderId, FlipEvent, FramebufferId, FramebufferLayout, Readiness,
};
use crate::error::{CommitRejection, DisplayError};

/// An opened DRM node (primary `card*` or `renderD*`).
#[derive(Debug)]
pub struct Card(File);

impl Card {
	pub fn open(path: impl AsRef<Path>) -> Result<Self, DisplayError> {
		let path = path.as_ref();
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.open(path)
			.map_err(|source| DisplayError::Open {
				path: path.to_path_buf(),
				source,
			})?;
		debug!(?path, "opened display device");
		Ok(Self(file))
	}
}

impl AsFd for Card {
	fn as_fd(&self) -> BorrowedFd<'_> {
		self.0.as_fd()
	}
}

impl drm::Device for Card {}
impl ControlDevice for Card {}

fn handle<T: From<RawResourceHandle>>(kind: &'static str, id: u32) -> Result<T, DisplayError> {
	control::from_u32(id).ok_or(DisplayError::InvalidHandle { kind, id })
}

fn connector_kind(interface: connector::Interface) -> ConnectorKind {
	use connector::Interface;
	match interface {
		Interface::HDMIA => ConnectorKind::HdmiA,
		Interface::HDMIB => ConnectorKind::HdmiB,
		Interface::DisplayPort => ConnectorKind::DisplayPort,
		Interface::EmbeddedDisplayPort => ConnectorKind::EmbeddedDisplayPort,
		Interface::DVII | Interface::DVID | Interface::DVIA => ConnectorKind::Dvi,
		Interface::VGA => ConnectorKind::Vga,
		Interface::Virtual => ConnectorKind::Virtual,
		_ => ConnectorKind::Other,
	}
}

/// Run `query` for every handle, leaving out the ones it fails on.
fn query_each<H, T>(handles: &[H], mut query: impl FnMut(H) -> io::Result<T>) -> Vec<T>
where
	H: Copy + fmt::Debug,
{
	handles
		.iter()
		.filter_map(|&handle| match query(handle) {
			Ok(info) => Some(info),
			Err(err) => {
				warn!(?handle, %err, "skipping connector the kernel would not describe");
				None
			}
		})
		.collect()
}

/// Framebuffer registration view over a raw GEM handle.
struct GemBuffer {
	layout: FramebufferLayout,
	handle: buffer::Handle,
}

impl buffer::Buffer for GemBuffer {
	fn size(&self) -> (u32, u32) {
		(self.layout.width, self.layout.height)
	}

	fn format(&self) -> DrmFourcc {
		self.layout.format
	}

	fn pitch(&self) -> u32 {
		self.layout.pitch
	}

	fn handle(&self) -> buffer::Handle {
		self.handle
	}
}

impl DisplayDevice for Card {
	type Mode = Mode;

	fn connectors(&self) -> Result<Vec<ConnectorInfo>, DisplayError> {
		let resources = self
			.resource_handles()
			.map_err(DisplayError::io("get resources"))?;
		// Current state only; forcing a probe can take hundreds of milliseconds.
		let connectors = query_each(resources.connectors(), |conn| {
			let info = self.get_connector(conn, false)?;
			Ok(ConnectorInfo {
				id: ConnectorId(conn.into()),
				kind: connector_kind(info.interface()),
				connected: info.state() == connector::State::Connected,
				encoder: info.current_encoder().map(|enc| EncoderId(enc.into())),
			})
		});
		Ok(connectors)
	}

	fn encoder_crtc(&self, id: EncoderId) -> Result<Option<CrtcId>, DisplayError> {
		let enc: encoder::Handle = handle("encoder", id.0)?;
		let info = self
			.get_encoder(enc)
			.map_err(DisplayError::io("get encoder"))?;
		Ok(info.crtc().map(|crtc| CrtcId(crtc.into())))
	}

	fn add_framebuffer(&self, layout: &FramebufferLayout) -> Result<FramebufferId, DisplayError> {
		let buffer = GemBuffer {
			layout: *layout,
			handle: handle("buffer", layout.handle)?,
		};
		let fb = ControlDevice::add_framebuffer(self, &buffer, layout.depth, layout.bpp)
			.map_err(DisplayError::io("add framebuffer"))?;
		Ok(FramebufferId(fb.into()))
	}

	fn remove_framebuffer(&self, id: FramebufferId) -> Result<(), DisplayError> {
		let fb: framebuffer::Handle = handle("framebuffer", id.0)?;
		self
			.destroy_framebuffer(fb)
			.map_err(DisplayError::io("remove framebuffer"))
	}

	fn request_flip(&self, crtc: CrtcId, framebuffer: FramebufferId) -> Result<(), CommitRejection> {
		let (Some(crtc_handle), Some(fb_handle)) = (
			control::from_u32::<crtc::Handle>(crtc.0),
			control::from_u32::<framebuffer::Handle>(framebuffer.0),
		) else {
			return Err(CommitRejection::InvalidParameter);
		};
		self
			.page_flip(crtc_handle, fb_handle, PageFlipFlags::EVENT, None)
			.map_err(CommitRejection::from)
	}

	fn crtc_state(&self, id: CrtcId) -> Result<CrtcState<Mode>, DisplayError> {
		let crtc: crtc::Handle = handle("crtc", id.0)?;
		let info = self.get_crtc(crtc).map_err(DisplayError::io("get crtc"))?;
		Ok(CrtcState {
			position: info.position(),
			mode: info.mode(),
		})
	}

	fn set_crtc(
		&self,
		crtc: CrtcId,
		framebuffer: FramebufferId,
		connector: ConnectorId,
		state: &CrtcState<Mode>,
	) -> Result<(), DisplayError> {
		let crtc: crtc::Handle = handle("crtc", crtc.0)?;
		let fb: framebuffer::Handle = handle("framebuffer", framebuffer.0)?;
		let conn: connector::Handle = handle("connector", connector.0)?;
		ControlDevice::set_crtc(self, crtc, Some(fb), state.position, &[conn], state.mode)
			.map_err(DisplayError::io("set crtc"))
	}

	fn wait_for_events(&self, timeout: Duration) -> Result<Readiness, DisplayError> {
		let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
		let mut fds = [PollFd::new(self.as_fd(), PollFlags::POLLIN)];
		match poll(&mut fds, millis) {
			Ok(0) => Ok(Readiness::TimedOut),
			Ok(_) => Ok(Readiness::Readable),
			// A signal is as good as a timeout: the caller polls again.
			Err(Errno::EINTR) => Ok(Readiness::TimedOut),
			Err(err) => Err(DisplayError::Wait(err)),
		}
	}

	fn dispatch_events(&self, on_flip: &mut dyn FnMut(FlipEvent)) -> Result<(), DisplayError> {
		let events = self
			.receive_events()
			.map_err(DisplayError::io("read drm events"))?;
		for event in events {
			match event {
				Event::PageFlip(flip) => on_flip(FlipEvent {
					crtc: CrtcId(flip.crtc.into()),
					frame: flip.frame,
				}),
				Event::Vblank(_) => trace!("ignoring vblank event"),
				Event::Unknown(raw) => trace!(len = raw.len(), "ignoring unknown drm event"),
			}
		}
		Ok(())
	}
}

impl DisplayAuthority for Card {
	fn acquire_authority(&self) -> Result<(), DisplayError> {
		self
			.acquire_master_lock()
			.map_err(DisplayError::io("acquire drm master"))
	}

	fn relinquish_authority(&self) -> Result<(), DisplayError> {
		self
			.release_master_lock()
			.map_err(DisplayError::io("drop drm master"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unreadable_connectors_are_skipped() {
		crate::fake::init_tracing();
		let handles = [31u32, 32, 33];
		let found = query_each(&handles, |handle| {
			if handle == 32 {
				Err(io::Error::from_raw_os_error(Errno::ENOENT as i32))
			} else {
				Ok(handle * 10)
			}
		});
		assert_eq!(found, vec![310, 330]);
	}

	#[test]
	fn connector_types_map_onto_the_policy_kinds() {
		assert_eq!(connector_kind(connector::Interface::HDMIA), ConnectorKind::HdmiA);
		assert_eq!(connector_kind(connector::Interface::DVID), ConnectorKind::Dvi);
		assert_eq!(connector_kind(connector::Interface::Composite), ConnectorKind::Other);
	}
}
