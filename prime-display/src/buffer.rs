use drm::buffer::DrmFourcc;

use crate::device::FramebufferLayout;

/// Colour format the display output is driven with.
pub const DISPLAY_FORMAT: DrmFourcc = DrmFourcc::Argb8888;

/// Depth to register a framebuffer with.
///
/// Buffers already in [`DISPLAY_FORMAT`] keep their full bpp as depth. Anything
/// else gets one byte of bits knocked off, which is what an XRGB-style buffer
/// without alpha wants. This is a narrow workaround for the formats this tool
/// allocates and not a general format mapping.
pub fn framebuffer_depth(format: DrmFourcc, bpp: u32) -> u32 {
	if format == DISPLAY_FORMAT {
		bpp
	} else {
		bpp.saturating_sub(8)
	}
}

/// A GPU buffer the display engine can register as a framebuffer.
pub trait ScanoutSource {
	fn size(&self) -> (u32, u32);
	fn format(&self) -> DrmFourcc;
	fn bpp(&self) -> u32;
	fn pitch(&self) -> u32;
	/// GEM handle on the device the framebuffer is created on.
	fn kernel_handle(&self) -> u32;

	fn layout(&self) -> FramebufferLayout {
		let (width, height) = self.size();
		let format = self.format();
		let bpp = self.bpp();
		FramebufferLayout {
			width,
			height,
			format,
			depth: framebuffer_depth(format, bpp),
			bpp,
			pitch: self.pitch(),
			handle: self.kernel_handle(),
		}
	}
}

impl<T: ScanoutSource + ?Sized> ScanoutSource for &T {
	fn size(&self) -> (u32, u32) {
		(**self).size()
	}
	fn format(&self) -> DrmFourcc {
		(**self).format()
	}
	fn bpp(&self) -> u32 {
		(**self).bpp()
	}
	fn pitch(&self) -> u32 {
		(**self).pitch()
	}
	fn kernel_handle(&self) -> u32 {
		(**self).kernel_handle()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn matching_format_keeps_full_depth() {
		assert_eq!(framebuffer_depth(DrmFourcc::Argb8888, 32), 32);
	}

	#[test]
	fn other_formats_drop_one_byte() {
		assert_eq!(framebuffer_depth(DrmFourcc::Xrgb8888, 32), 24);
		assert_eq!(framebuffer_depth(DrmFourcc::Rgb565, 16), 8);
	}

	#[test]
	fn depth_never_underflows() {
		assert_eq!(framebuffer_depth(DrmFourcc::C8, 0), 0);
	}
}
