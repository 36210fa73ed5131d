use std::path::PathBuf;

use thiserror::Error;

use crate::import::ImportOrigin;

#[derive(Debug, Error)]
pub enum RenderError {
	#[error("failed to load libEGL: {0}")]
	EglLoad(String),
	#[error("{op} failed: {source}")]
	Egl {
		op: &'static str,
		source: khronos_egl::Error,
	},
	#[error("no EGL display for the gbm device")]
	NoDisplay,
	#[error("no EGL config matches {0:?}")]
	NoConfig(prime_display::DrmFourcc),
	#[error("gbm device initialization on {path} failed: {source}")]
	GbmInit {
		path: PathBuf,
		source: std::io::Error,
	},
	#[error("gbm surface creation failed: {0}")]
	Surface(#[source] std::io::Error),
	#[error(transparent)]
	Display(#[from] prime_display::DisplayError),
	#[error("OpenGL error 0x{code:04X} in {call}")]
	Gl { call: &'static str, code: u32 },
	#[error("shader compilation failed: {0}")]
	Shader(String),
	#[error("program link failed: {0}")]
	Program(String),
	#[error("required entry point {0} is not available")]
	CapabilityMissing(&'static str),
}

#[derive(Debug, Error)]
pub enum ImportError {
	#[error("required entry point {0} is not available")]
	CapabilityMissing(&'static str),
	#[error("eglCreateImageKHR failed for {origin:?} import ({egl_error:?})")]
	CreateImage {
		origin: ImportOrigin,
		egl_error: Option<khronos_egl::Error>,
	},
	#[error("buffer dimensions {width}x{height} (pitch {pitch}) do not fit EGL attributes")]
	Geometry { width: u32, height: u32, pitch: u32 },
}

impl ImportError {
	pub fn is_capability_missing(&self) -> bool {
		matches!(self, ImportError::CapabilityMissing(_))
	}
}

impl RenderError {
	pub fn is_capability_missing(&self) -> bool {
		matches!(self, RenderError::CapabilityMissing(_))
	}
}
