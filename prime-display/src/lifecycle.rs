use std::error::Error;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};

use drm::buffer::DrmFourcc;
use tracing::{debug, info};

use crate::error::LifecycleError;

/// Geometry of the buffer the producer shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRequest {
	pub width: u32,
	pub height: u32,
	pub format: DrmFourcc,
}

pub trait BufferAllocator {
	type Buffer;
	type Error: Error + Send + Sync + 'static;

	fn allocate(&mut self, request: &BufferRequest) -> Result<Self::Buffer, Self::Error>;
}

/// A buffer that can be handed to another process as a dma-buf descriptor.
pub trait ExportableBuffer {
	type Error: Error + Send + Sync + 'static;

	/// Every call yields a fresh descriptor owned by the caller.
	fn export(&self) -> Result<OwnedFd, Self::Error>;
}

/// The buffer ring behind a presentable surface.
pub trait FrontBufferSource {
	type Buffer;
	type Error: Error + Send + Sync + 'static;

	fn lock_front(&mut self) -> Result<Self::Buffer, Self::Error>;

	/// Hand a locked buffer back to the ring.
	fn release(&mut self, buffer: Self::Buffer);
}

/// The producer's shareable buffer and the descriptor currently exported from it.
#[derive(Debug)]
pub struct SharedBuffer<B> {
	buffer: B,
	request: BufferRequest,
	exported: Option<OwnedFd>,
}

impl<B> SharedBuffer<B> {
	pub fn buffer(&self) -> &B {
		&self.buffer
	}

	pub fn request(&self) -> &BufferRequest {
		&self.request
	}

	pub fn exported(&self) -> Option<BorrowedFd<'_>> {
		self.exported.as_ref().map(|fd| fd.as_fd())
	}
}

/// A front buffer locked out of a surface's ring. Must go back through
/// [`BufferLifecycle::release_front_buffer`].
#[derive(Debug)]
#[must_use = "a locked front buffer stalls the ring until it is released"]
pub struct SwapChainBuffer<B> {
	buffer: B,
}

impl<B> SwapChainBuffer<B> {
	pub fn buffer(&self) -> &B {
		&self.buffer
	}
}

/// Puts the two buffers back in their own slots when dropped.
struct RoleSwapGuard<'a, B> {
	shared: &'a mut B,
	front: &'a mut B,
}

impl<'a, B> RoleSwapGuard<'a, B> {
	fn new(shared: &'a mut B, front: &'a mut B) -> Self {
		std::mem::swap(shared, front);
		Self { shared, front }
	}

	/// The buffer currently sitting in the producer's slot.
	fn current(&self) -> &B {
		&*self.shared
	}
}

impl<B> Drop for RoleSwapGuard<'_, B> {
	fn drop(&mut self) {
		std::mem::swap(self.shared, self.front);
	}
}

/// Owns the producer-side buffers across cycles.
///
/// The shared buffer is a single-slot cache: allocated on first use and then
/// kept until the process exits. Releasing it back to the allocator between
/// cycles has been seen to destabilise the GBM pool, so it is never freed in
/// the loop. Its descriptor is exported fresh every cycle.
#[derive(Debug)]
pub struct BufferLifecycle<B> {
	shared: Option<SharedBuffer<B>>,
	front_outstanding: bool,
}

impl<B> Default for BufferLifecycle<B> {
	fn default() -> Self {
		Self {
			shared: None,
			front_outstanding: false,
		}
	}
}

impl<B> BufferLifecycle<B> {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn shared(&self) -> Option<&SharedBuffer<B>> {
		self.shared.as_ref()
	}

	pub fn front_outstanding(&self) -> bool {
		self.front_outstanding
	}

	pub fn acquire_exportable<A>(
		&mut self,
		allocator: &mut A,
		request: &BufferRequest,
	) -> Result<&mut SharedBuffer<B>, LifecycleError>
	where
		A: BufferAllocator<Buffer = B> + ?Sized,
	{
		match &self.shared {
			Some(shared) if shared.request != *request => {
				debug!(cached = ?shared.request, ?request, "reusing shared buffer despite new request");
			}
			Some(_) => {}
			None => {
				let buffer = allocator
					.allocate(request)
					.map_err(|err| LifecycleError::Allocation(Box::new(err)))?;
				info!(
					width = request.width,
					height = request.height,
					format = ?request.format,
					"allocated shared buffer"
				);
				self.shared = Some(SharedBuffer {
					buffer,
					request: *request,
					exported: None,
				});
			}
		}
		self.shared.as_mut().ok_or(LifecycleError::NoSharedBuffer)
	}

	/// Close the previous descriptor, if any, and export a new one.
	pub fn export_handle(&mut self) -> Result<BorrowedFd<'_>, LifecycleError>
	where
		B: ExportableBuffer,
	{
		let shared = self.shared.as_mut().ok_or(LifecycleError::NoSharedBuffer)?;
		if let Some(stale) = shared.exported.take() {
			debug!(fd = stale.as_raw_fd(), "closing stale export");
		}
		let fd = shared
			.buffer
			.export()
			.map_err(|err| LifecycleError::Export(Box::new(err)))?;
		debug!(fd = fd.as_raw_fd(), "exported shared buffer");
		let fd: &OwnedFd = shared.exported.insert(fd);
		Ok(fd.as_fd())
	}

	/// Close the exported descriptor once it has been sent. Returns whether one was open.
	pub fn release_descriptor(&mut self) -> bool {
		self
			.shared
			.as_mut()
			.and_then(|shared| shared.exported.take())
			.is_some()
	}

	pub fn lock_front_buffer<S>(&mut self, surface: &mut S) -> Result<SwapChainBuffer<B>, LifecycleError>
	where
		S: FrontBufferSource<Buffer = B> + ?Sized,
	{
		if self.front_outstanding {
			return Err(LifecycleError::FrontBufferOutstanding);
		}
		let buffer = surface
			.lock_front()
			.map_err(|err| LifecycleError::FrontBuffer(Box::new(err)))?;
		self.front_outstanding = true;
		Ok(SwapChainBuffer { buffer })
	}

	pub fn release_front_buffer<S>(&mut self, surface: &mut S, front: SwapChainBuffer<B>)
	where
		S: FrontBufferSource<Buffer = B> + ?Sized,
	{
		surface.release(front.buffer);
		self.front_outstanding = false;
	}

	/// Run `f` with the locked front buffer standing in the shared buffer's slot.
	///
	/// The swap is undone when `f` returns, fails or unwinds.
	pub fn with_swapped_roles<R>(
		&mut self,
		front: &mut SwapChainBuffer<B>,
		f: impl FnOnce(&B) -> R,
	) -> Result<R, LifecycleError> {
		let shared = self.shared.as_mut().ok_or(LifecycleError::NoSharedBuffer)?;
		let guard = RoleSwapGuard::new(&mut shared.buffer, &mut front.buffer);
		Ok(f(guard.current()))
	}

	/// Lock the surface's front buffer, run `f` on it from the shared slot, then
	/// swap back and release it.
	pub fn scan_out_front<S, R>(&mut self, surface: &mut S, f: impl FnOnce(&B) -> R) -> Result<R, LifecycleError>
	where
		S: FrontBufferSource<Buffer = B> + ?Sized,
	{
		if self.shared.is_none() {
			return Err(LifecycleError::NoSharedBuffer);
		}
		let mut front = self.lock_front_buffer(surface)?;
		let result = self.with_swapped_roles(&mut front, f);
		self.release_front_buffer(surface, front);
		result
	}
}
