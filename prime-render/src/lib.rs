//! GPU side of prime-share: gbm buffers and surfaces, an EGL/GLES2 context,
//! EGLImage import of local buffers and received dma-bufs, and a small render
//! backend.

#[macro_use]
mod macros;

mod error;

pub mod backend;
pub mod context;
#[allow(dead_code, unused_imports, non_upper_case_globals, non_snake_case)]
pub mod egl;
pub mod gbm_allocator;
#[allow(dead_code, unused_imports, non_upper_case_globals, non_snake_case)]
pub mod gl;
pub mod import;

pub use backend::RenderBackend;
pub use context::GpuContext;
pub use error::{ImportError, RenderError};
pub use gbm_allocator::{FrontBuffers, GbmAllocator, GbmBuffer, GbmDevice};
pub use import::{ImageImporter, ImportOrigin, ImportedImage};
