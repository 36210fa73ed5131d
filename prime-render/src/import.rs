use std::ffi::c_void;
use std::os::fd::{AsRawFd, BorrowedFd};

use prime_display::ScanoutSource;
use prime_protocol::BufferGeometry;
use tracing::{debug, warn};

use crate::context::GpuContext;
use crate::egl;
use crate::error::ImportError;
use crate::gbm_allocator::GbmBuffer;

/// Which import path produced an image; the two need different attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOrigin {
	/// A gbm buffer this process allocated itself.
	LocalBuffer,
	/// A dma-buf descriptor received from the other process.
	ForeignDescriptor,
}

/// An EGLImage over a buffer, destroyed on drop.
pub struct ImportedImage {
	egl: egl::Egl,
	display: egl::types::EGLDisplay,
	image: egl::types::EGLImageKHR,
	origin: ImportOrigin,
	size: (u32, u32),
}

impl ImportedImage {
	pub fn origin(&self) -> ImportOrigin {
		self.origin
	}

	pub fn size(&self) -> (u32, u32) {
		self.size
	}

	pub(crate) fn raw(&self) -> *const c_void {
		self.image
	}
}

impl std::fmt::Debug for ImportedImage {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ImportedImage")
			.field("image", &self.image)
			.field("origin", &self.origin)
			.field("size", &self.size)
			.finish()
	}
}

impl Drop for ImportedImage {
	fn drop(&mut self) {
		debug!(image = ?self.image, origin = ?self.origin, "destroying EGLImage");
		// SAFETY: the image was created on this display and is not bound to any
		// texture that outlives it.
		let ok = unsafe { self.egl.DestroyImageKHR(self.display, self.image) };
		if ok != egl::TRUE {
			warn!(image = ?self.image, "eglDestroyImageKHR failed");
		}
	}
}

fn attrib(value: u32, geometry: (u32, u32, u32)) -> Result<egl::types::EGLint, ImportError> {
	let (width, height, pitch) = geometry;
	egl::types::EGLint::try_from(value).map_err(|_| ImportError::Geometry {
		width,
		height,
		pitch,
	})
}

/// Holds the single image the render backend currently samples or draws into.
#[derive(Debug, Default)]
pub struct ImageImporter {
	current: Option<ImportedImage>,
}

impl ImageImporter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn current(&self) -> Option<&ImportedImage> {
		self.current.as_ref()
	}

	pub fn release(&mut self) {
		self.current = None;
	}

	/// Wrap a buffer this process allocated.
	pub fn import_local(
		&mut self,
		context: &GpuContext,
		buffer: &GbmBuffer,
	) -> Result<&ImportedImage, ImportError> {
		self.release();
		let (width, height) = buffer.size();
		let dims = (width, height, buffer.pitch());
		let attrs = [
			egl::WIDTH as egl::types::EGLint,
			attrib(width, dims)?,
			egl::HEIGHT as egl::types::EGLint,
			attrib(height, dims)?,
			egl::NONE as egl::types::EGLint,
		];
		self.create(
			context,
			ImportOrigin::LocalBuffer,
			egl::NATIVE_PIXMAP_KHR,
			buffer.as_client_buffer() as egl::types::EGLClientBuffer,
			&attrs,
			(width, height),
		)
	}

	/// Wrap a dma-buf described only by its descriptor and `geometry`.
	///
	/// The descriptor stays owned by the caller; EGL takes its own reference.
	pub fn import_foreign(
		&mut self,
		context: &GpuContext,
		fd: BorrowedFd<'_>,
		geometry: &BufferGeometry,
	) -> Result<&ImportedImage, ImportError> {
		self.release();
		let dims = (geometry.width, geometry.height, geometry.stride);
		let attrs = [
			egl::WIDTH as egl::types::EGLint,
			attrib(geometry.width, dims)?,
			egl::HEIGHT as egl::types::EGLint,
			attrib(geometry.height, dims)?,
			egl::LINUX_DRM_FOURCC_EXT as egl::types::EGLint,
			geometry.fourcc as egl::types::EGLint,
			egl::DMA_BUF_PLANE0_FD_EXT as egl::types::EGLint,
			fd.as_raw_fd(),
			egl::DMA_BUF_PLANE0_OFFSET_EXT as egl::types::EGLint,
			0,
			egl::DMA_BUF_PLANE0_PITCH_EXT as egl::types::EGLint,
			attrib(geometry.stride, dims)?,
			egl::NONE as egl::types::EGLint,
		];
		self.create(
			context,
			ImportOrigin::ForeignDescriptor,
			egl::LINUX_DMA_BUF_EXT,
			std::ptr::null_mut::<c_void>() as egl::types::EGLClientBuffer,
			&attrs,
			(geometry.width, geometry.height),
		)
	}

	fn create(
		&mut self,
		context: &GpuContext,
		origin: ImportOrigin,
		target: egl::types::EGLenum,
		buffer: egl::types::EGLClientBuffer,
		attrs: &[egl::types::EGLint],
		size: (u32, u32),
	) -> Result<&ImportedImage, ImportError> {
		let ext = context.extensions();
		if !ext.CreateImageKHR.is_loaded() {
			return Err(ImportError::CapabilityMissing("eglCreateImageKHR"));
		}
		if !ext.DestroyImageKHR.is_loaded() {
			return Err(ImportError::CapabilityMissing("eglDestroyImageKHR"));
		}

		let display = context.raw_display();
		// SAFETY: the attribute list is NONE terminated and `buffer` matches `target`.
		let image = unsafe { ext.CreateImageKHR(display, egl::NO_CONTEXT, target, buffer, attrs.as_ptr()) };
		if image == egl::NO_IMAGE_KHR {
			return Err(ImportError::CreateImage {
				origin,
				egl_error: context.last_egl_error(),
			});
		}
		debug!(?image, ?origin, width = size.0, height = size.1, "EGLImage created");

		Ok(self.current.insert(ImportedImage {
			egl: ext.clone(),
			display,
			image,
			origin,
			size,
		}))
	}
}
