//! Display side of prime-share: a thin seam over KMS, output discovery, the
//! scan-out engine and the producer's buffer lifecycle.

mod error;

pub mod buffer;
pub mod device;
pub mod discovery;
pub mod kms;
pub mod lifecycle;
pub mod scanout;
pub mod stats;

#[cfg(test)]
mod fake;

pub use buffer::{DISPLAY_FORMAT, ScanoutSource, framebuffer_depth};
pub use device::{
	ConnectorId, ConnectorInfo, ConnectorKind, CrtcId, DisplayAuthority, DisplayDevice, EncoderId,
	FramebufferId,
};
pub use discovery::{OutputPolicy, find_output};
pub use error::{CommitRejection, DiscoveryError, DisplayError, LifecycleError, ScanoutError};
pub use kms::Card;
pub use lifecycle::{
	BufferAllocator, BufferLifecycle, BufferRequest, ExportableBuffer, FrontBufferSource, SharedBuffer,
	SwapChainBuffer,
};
pub use scanout::{CommitOutcome, DisplayTarget, ScanoutEngine, ScanoutState};

pub use drm::buffer::DrmFourcc;
