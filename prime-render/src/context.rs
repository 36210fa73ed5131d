use std::cell::OnceCell;
use std::ffi::c_void;
use std::path::Path;

use gbm::{AsRaw, BufferObjectFlags};
use khronos_egl as khr;
use prime_display::{Card, DISPLAY_FORMAT};
use tracing::{debug, info, warn};

use crate::egl;
use crate::error::RenderError;
use crate::gbm_allocator::{FrontBuffers, GbmAllocator, GbmDevice};
use crate::gl;

type EglInstance = khr::DynamicInstance<khr::EGL1_4>;

const CONFIG_ATTRIBS: [khr::Int; 13] = [
	khr::SURFACE_TYPE,
	khr::WINDOW_BIT,
	khr::RENDERABLE_TYPE,
	khr::OPENGL_ES2_BIT,
	khr::RED_SIZE,
	8,
	khr::GREEN_SIZE,
	8,
	khr::BLUE_SIZE,
	8,
	khr::ALPHA_SIZE,
	8,
	khr::NONE,
];

const CONTEXT_ATTRIBS: [khr::Int; 3] = [khr::CONTEXT_CLIENT_VERSION, 2, khr::NONE];

fn egl_failed(op: &'static str) -> impl FnOnce(khr::Error) -> RenderError {
	move |source| RenderError::Egl { op, source }
}

/// GLES2 on an EGL window surface backed by a gbm surface on one DRM node.
///
/// Field order matters: the gbm surface has to go before the device it was
/// created on.
pub struct GpuContext {
	instance: EglInstance,
	display: khr::Display,
	context: khr::Context,
	window: khr::Surface,
	gl: gl::Gles2,
	extensions: OnceCell<egl::Egl>,
	size: (u32, u32),
	surface: gbm::Surface<()>,
	device: GbmDevice,
}

impl GpuContext {
	pub fn open(path: impl AsRef<Path>, width: u32, height: u32) -> Result<Self, RenderError> {
		let path = path.as_ref();
		let card = Card::open(path)?;
		let device = GbmDevice::new(card).map_err(|source| RenderError::GbmInit {
			path: path.to_path_buf(),
			source,
		})?;
		let surface = device
			.create_surface::<()>(
				width,
				height,
				DISPLAY_FORMAT,
				BufferObjectFlags::SCANOUT | BufferObjectFlags::RENDERING,
			)
			.map_err(RenderError::Surface)?;

		// SAFETY: loads the system libEGL; nothing else in this process has a handle to it yet.
		let instance =
			unsafe { EglInstance::load_required() }.map_err(|err| RenderError::EglLoad(err.to_string()))?;
		// SAFETY: the gbm device outlives the display, see the field order above.
		let display = unsafe { instance.get_display(device.as_raw() as khr::NativeDisplayType) }
			.ok_or(RenderError::NoDisplay)?;
		let (major, minor) = instance
			.initialize(display)
			.map_err(egl_failed("eglInitialize"))?;
		debug!(major, minor, ?path, "EGL initialized");

		let (context, window) = match Self::bind_surface(&instance, display, &surface) {
			Ok(bound) => bound,
			Err(err) => {
				let _ = instance.terminate(display);
				return Err(err);
			}
		};

		let gl = gl::Gles2::load_with(|name| {
			instance
				.get_proc_address(name)
				.map_or(std::ptr::null(), |f| f as *const c_void)
		});
		info!(?path, width, height, "GPU context ready");

		Ok(Self {
			instance,
			display,
			context,
			window,
			gl,
			extensions: OnceCell::new(),
			size: (width, height),
			surface,
			device,
		})
	}

	fn bind_surface(
		instance: &EglInstance,
		display: khr::Display,
		surface: &gbm::Surface<()>,
	) -> Result<(khr::Context, khr::Surface), RenderError> {
		instance
			.bind_api(khr::OPENGL_ES_API)
			.map_err(egl_failed("eglBindAPI"))?;

		let mut configs = Vec::with_capacity(64);
		instance
			.choose_config(display, &CONFIG_ATTRIBS, &mut configs)
			.map_err(egl_failed("eglChooseConfig"))?;
		// The config has to agree with the gbm surface's format or window creation fails.
		let config = configs
			.into_iter()
			.find(|&config| {
				instance
					.get_config_attrib(display, config, khr::NATIVE_VISUAL_ID)
					.is_ok_and(|visual| visual as u32 == DISPLAY_FORMAT as u32)
			})
			.ok_or(RenderError::NoConfig(DISPLAY_FORMAT))?;

		let context = instance
			.create_context(display, config, None, &CONTEXT_ATTRIBS)
			.map_err(egl_failed("eglCreateContext"))?;
		// SAFETY: the gbm surface outlives the EGL surface, see GpuContext's field order.
		let window = unsafe {
			instance.create_window_surface(display, config, surface.as_raw() as khr::NativeWindowType, None)
		};
		let window = match window {
			Ok(window) => window,
			Err(err) => {
				let _ = instance.destroy_context(display, context);
				return Err(RenderError::Egl {
					op: "eglCreateWindowSurface",
					source: err,
				});
			}
		};
		instance
			.make_current(display, Some(window), Some(window), Some(context))
			.map_err(egl_failed("eglMakeCurrent"))?;
		Ok((context, window))
	}

	pub fn card(&self) -> &Card {
		&self.device
	}

	pub fn device(&self) -> &GbmDevice {
		&self.device
	}

	pub fn size(&self) -> (u32, u32) {
		self.size
	}

	pub fn gl(&self) -> &gl::Gles2 {
		&self.gl
	}

	pub fn allocator(&self) -> GbmAllocator<'_> {
		GbmAllocator::new(&self.device)
	}

	pub fn front_buffers(&self) -> FrontBuffers<'_> {
		FrontBuffers::new(&self.surface)
	}

	/// Image extension entry points, resolved on first use and kept for the
	/// life of the context.
	pub fn extensions(&self) -> &egl::Egl {
		self.extensions.get_or_init(|| {
			debug!("resolving EGL image extension entry points");
			egl::Egl::load_with(|name| {
				self
					.instance
					.get_proc_address(name)
					.map_or(std::ptr::null(), |f| f as *const c_void)
			})
		})
	}

	pub(crate) fn raw_display(&self) -> egl::types::EGLDisplay {
		self.display.as_ptr() as egl::types::EGLDisplay
	}

	pub(crate) fn last_egl_error(&self) -> Option<khr::Error> {
		self.instance.get_error()
	}

	pub fn swap_buffers(&self) -> Result<(), RenderError> {
		self
			.instance
			.swap_buffers(self.display, self.window)
			.map_err(egl_failed("eglSwapBuffers"))
	}
}

impl Drop for GpuContext {
	fn drop(&mut self) {
		let instance = &self.instance;
		let results = [
			instance.make_current(self.display, None, None, None),
			instance.destroy_surface(self.display, self.window),
			instance.destroy_context(self.display, self.context),
			instance.terminate(self.display),
		];
		for err in results.into_iter().filter_map(Result::err) {
			warn!(%err, "EGL teardown step failed");
		}
	}
}
