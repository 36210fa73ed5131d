use std::os::fd::OwnedFd;

use gbm::{AsRaw, BufferObject, BufferObjectFlags, FrontBufferError, InvalidFdError};
use prime_display::{
	BufferAllocator, BufferRequest, Card, DrmFourcc, ExportableBuffer, FrontBufferSource,
	ScanoutSource,
};
use prime_protocol::BufferGeometry;
use tracing::trace;

pub type GbmDevice = gbm::Device<Card>;

/// A gbm buffer object, either allocated for sharing or locked from a surface.
#[derive(Debug)]
pub struct GbmBuffer(BufferObject<()>);

impl GbmBuffer {
	pub fn geometry(&self) -> BufferGeometry {
		BufferGeometry {
			width: self.0.width(),
			height: self.0.height(),
			fourcc: self.0.format() as u32,
			stride: self.0.stride(),
		}
	}

	pub fn offset(&self) -> u32 {
		self.0.offset(0)
	}

	pub(crate) fn as_client_buffer(&self) -> *mut std::ffi::c_void {
		self.0.as_raw() as *mut std::ffi::c_void
	}
}

impl ScanoutSource for GbmBuffer {
	fn size(&self) -> (u32, u32) {
		(self.0.width(), self.0.height())
	}

	fn format(&self) -> DrmFourcc {
		self.0.format()
	}

	fn bpp(&self) -> u32 {
		self.0.bpp()
	}

	fn pitch(&self) -> u32 {
		self.0.stride()
	}

	fn kernel_handle(&self) -> u32 {
		// SAFETY: gem handles of the scan-out capable devices we open are 32 bit.
		unsafe { self.0.handle().u32_ }
	}
}

impl ExportableBuffer for GbmBuffer {
	type Error = InvalidFdError;

	fn export(&self) -> Result<OwnedFd, InvalidFdError> {
		self.0.fd()
	}
}

/// Allocates the producer's shareable buffer on a gbm device.
pub struct GbmAllocator<'a> {
	device: &'a GbmDevice,
	usage: BufferObjectFlags,
}

impl<'a> GbmAllocator<'a> {
	pub fn new(device: &'a GbmDevice) -> Self {
		Self {
			device,
			usage: BufferObjectFlags::RENDERING,
		}
	}
}

impl BufferAllocator for GbmAllocator<'_> {
	type Buffer = GbmBuffer;
	type Error = std::io::Error;

	fn allocate(&mut self, request: &BufferRequest) -> Result<GbmBuffer, std::io::Error> {
		let bo = self.device.create_buffer_object::<()>(
			request.width,
			request.height,
			request.format,
			self.usage,
		)?;
		trace!(stride = bo.stride(), "gbm buffer object created");
		Ok(GbmBuffer(bo))
	}
}

/// The buffer ring of the window surface EGL renders into.
pub struct FrontBuffers<'a> {
	surface: &'a gbm::Surface<()>,
}

impl<'a> FrontBuffers<'a> {
	pub(crate) fn new(surface: &'a gbm::Surface<()>) -> Self {
		Self { surface }
	}
}

impl FrontBufferSource for FrontBuffers<'_> {
	type Buffer = GbmBuffer;
	type Error = FrontBufferError;

	fn lock_front(&mut self) -> Result<GbmBuffer, FrontBufferError> {
		// SAFETY: only called after a successful eglSwapBuffers on this surface.
		let bo = unsafe { self.surface.lock_front_buffer() }?;
		Ok(GbmBuffer(bo))
	}

	fn release(&mut self, buffer: GbmBuffer) {
		// Surface buffer objects go back to the ring when dropped.
		drop(buffer);
	}
}
