use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;

const ANNOUNCEMENT_PREFIX: &str = "FD : ";

/// Geometry a consumer needs to import a buffer it only knows by descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferGeometry {
	pub width: u32,
	pub height: u32,
	/// DRM fourcc code.
	pub fourcc: u32,
	/// Row pitch in bytes.
	pub stride: u32,
}

impl BufferGeometry {
	/// Geometry of a tightly packed 32 bit-per-pixel buffer. A width too large
	/// for a 32 bit pitch saturates, which no importer accepts.
	pub fn packed(width: u32, height: u32, fourcc: u32) -> Self {
		Self {
			width,
			height,
			fourcc,
			stride: width.saturating_mul(4),
		}
	}
}

/// Text payload sent alongside a buffer descriptor: `FD : <n>` with an optional
/// ` <w>x<h> <fourcc> <stride>` tail.
///
/// `descriptor` is the sender's descriptor number and is informational only; the
/// receiver gets its own number for the same buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferAnnouncement {
	pub descriptor: i32,
	pub geometry: Option<BufferGeometry>,
}

impl BufferAnnouncement {
	pub fn new(descriptor: i32) -> Self {
		Self {
			descriptor,
			geometry: None,
		}
	}

	pub fn with_geometry(mut self, geometry: BufferGeometry) -> Self {
		self.geometry = Some(geometry);
		self
	}

	pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
		let text =
			std::str::from_utf8(bytes).map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?;
		text.parse()
	}
}

impl fmt::Display for BufferAnnouncement {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{ANNOUNCEMENT_PREFIX}{}", self.descriptor)?;
		if let Some(g) = &self.geometry {
			write!(f, " {}x{} {:08x} {}", g.width, g.height, g.fourcc, g.stride)?;
		}
		Ok(())
	}
}

impl FromStr for BufferAnnouncement {
	type Err = ProtocolError;

	fn from_str(s: &str) -> Result<Self, ProtocolError> {
		let invalid = || {
			ProtocolError::InvalidPayload(format!(
				r#"expected "{ANNOUNCEMENT_PREFIX}<fd> [<w>x<h> <fourcc> <stride>]", got {s:?}"#
			))
		};
		let rest = s
			.trim_end_matches(['\0', '\n'])
			.strip_prefix(ANNOUNCEMENT_PREFIX)
			.ok_or_else(invalid)?;
		let split = rest.split_ascii_whitespace().collect::<Vec<_>>();
		match split[..] {
			[descriptor] => Ok(Self::new(descriptor.parse().map_err(|_| invalid())?)),
			[descriptor, size, fourcc, stride] => {
				let (width, height) = size.split_once('x').ok_or_else(invalid)?;
				let geometry = BufferGeometry {
					width: width.parse().map_err(|_| invalid())?,
					height: height.parse().map_err(|_| invalid())?,
					fourcc: u32::from_str_radix(fourcc, 16).map_err(|_| invalid())?,
					stride: stride.parse().map_err(|_| invalid())?,
				};
				Ok(Self::new(descriptor.parse().map_err(|_| invalid())?).with_geometry(geometry))
			}
			_ => Err(invalid()),
		}
	}
}
