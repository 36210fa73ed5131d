use std::ffi::CString;

use tracing::debug;

use crate::context::GpuContext;
use crate::error::RenderError;
use crate::gl;
use crate::import::ImportedImage;

const TILE_VERTEX: &str = "#version 100
attribute vec3 position;
varying vec2 coordinates;
void main () {
	gl_Position = vec4 (position.xyz, 1);
	coordinates = position.xy;
}
";

const TILE_FRAGMENT: &str = "#version 100
#extension GL_OES_EGL_image_external : require
precision mediump float;
uniform samplerExternalOES sampler;
varying vec2 coordinates;
void main () {
	gl_FragColor = vec4 (texture2D (sampler, coordinates).rgb, 1.0);
}
";

const VERTEX_DIMENSIONS: i32 = 3;

/// Quad centred in the viewport, drawn as a triangle strip.
static TILE_VERTICES: [f32; 12] = [
	-0.5, -0.5, 0.0, //
	-0.5, 0.5, 0.0, //
	0.5, -0.5, 0.0, //
	0.5, 0.5, 0.0,
];

struct TileProgram {
	program: u32,
	position: u32,
}

/// Minimal GLES2 renderer: previews an image on a tile or draws into it
/// through a framebuffer object.
pub struct RenderBackend {
	gl: gl::Gles2,
	tile: Option<TileProgram>,
	texture: u32,
	framebuffer: u32,
}

impl RenderBackend {
	pub fn new(context: &GpuContext) -> Self {
		Self {
			gl: context.gl().clone(),
			tile: None,
			texture: 0,
			framebuffer: 0,
		}
	}

	/// Sample `image` as an external texture onto a tile covering the middle of the viewport.
	pub fn render_tile(&mut self, image: &ImportedImage) -> Result<(), RenderError> {
		self.bind_image(image, gl::TEXTURE_EXTERNAL_OES)?;
		let gl = &self.gl;
		gl_try!(gl, BindFramebuffer(gl::FRAMEBUFFER, 0));
		gl_try!(gl, ClearColor(0.0, 1.0, 0.0, 0.5));
		gl_try!(gl, Clear(gl::COLOR_BUFFER_BIT));

		if self.tile.is_none() {
			self.tile = Some(compile_tile(gl)?);
		}
		let Some(tile) = &self.tile else {
			return Err(RenderError::Program("tile program unavailable".into()));
		};
		gl_try!(gl, UseProgram(tile.program));
		gl_try!(
			gl,
			VertexAttribPointer(
				tile.position,
				VERTEX_DIMENSIONS,
				gl::FLOAT,
				gl::FALSE,
				0,
				TILE_VERTICES.as_ptr().cast(),
			)
		);
		gl_try!(gl, EnableVertexAttribArray(tile.position));
		gl_try!(
			gl,
			DrawArrays(
				gl::TRIANGLE_STRIP,
				0,
				TILE_VERTICES.len() as i32 / VERTEX_DIMENSIONS
			)
		);
		Ok(())
	}

	/// Make `image` the colour attachment of the backend's framebuffer object
	/// and leave that framebuffer bound for drawing.
	pub fn attach_framebuffer(&mut self, image: &ImportedImage) -> Result<(), RenderError> {
		self.bind_image(image, gl::TEXTURE_2D)?;
		let gl = &self.gl;
		if self.framebuffer != 0 {
			gl_try!(gl, DeleteFramebuffers(1, &self.framebuffer));
			self.framebuffer = 0;
		}
		let mut framebuffer = 0;
		gl_try!(gl, GenFramebuffers(1, &mut framebuffer));
		self.framebuffer = framebuffer;
		gl_try!(gl, BindFramebuffer(gl::FRAMEBUFFER, framebuffer));
		gl_try!(
			gl,
			FramebufferTexture2D(
				gl::FRAMEBUFFER,
				gl::COLOR_ATTACHMENT0,
				gl::TEXTURE_2D,
				self.texture,
				0
			)
		);
		let status = gl_try!(gl, CheckFramebufferStatus(gl::FRAMEBUFFER));
		if status != gl::FRAMEBUFFER_COMPLETE {
			return Err(RenderError::Gl {
				call: "CheckFramebufferStatus",
				code: status,
			});
		}
		debug!(framebuffer, texture = self.texture, "image attached as render target");
		Ok(())
	}

	/// Clear the bound target to a grey level that follows `cos(degrees)`.
	pub fn color_fill(&self, degrees: f32) -> Result<(), RenderError> {
		let level = degrees.to_radians().cos();
		let gl = &self.gl;
		gl_try!(gl, ClearColor(level, level, level, 1.0));
		gl_try!(gl, Clear(gl::COLOR_BUFFER_BIT));
		gl_try!(gl, Flush());
		Ok(())
	}

	fn bind_image(&mut self, image: &ImportedImage, target: u32) -> Result<(), RenderError> {
		if !self.gl.EGLImageTargetTexture2DOES.is_loaded() {
			return Err(RenderError::CapabilityMissing("glEGLImageTargetTexture2DOES"));
		}
		let gl = &self.gl;
		// Drop a stale error so it is not blamed on the first call below.
		// SAFETY: the context is current on this thread.
		unsafe { gl.GetError() };
		if self.texture != 0 {
			gl_try!(gl, DeleteTextures(1, &self.texture));
			self.texture = 0;
		}
		gl_try!(gl, ActiveTexture(gl::TEXTURE0));
		let mut texture = 0;
		gl_try!(gl, GenTextures(1, &mut texture));
		self.texture = texture;
		gl_try!(gl, BindTexture(target, texture));
		gl_try!(gl, TexParameteri(target, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as i32));
		gl_try!(gl, TexParameteri(target, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as i32));
		gl_try!(gl, TexParameteri(target, gl::TEXTURE_MIN_FILTER, gl::LINEAR as i32));
		gl_try!(gl, TexParameteri(target, gl::TEXTURE_MAG_FILTER, gl::LINEAR as i32));
		gl_try!(gl, EGLImageTargetTexture2DOES(target, image.raw()));

		let (width, height) = image.size();
		gl_try!(gl, Viewport(0, 0, width as i32, height as i32));
		Ok(())
	}
}

impl Drop for RenderBackend {
	fn drop(&mut self) {
		let gl = &self.gl;
		// SAFETY: names were created on this context; zero names are skipped.
		unsafe {
			if self.framebuffer != 0 {
				gl.DeleteFramebuffers(1, &self.framebuffer);
			}
			if self.texture != 0 {
				gl.DeleteTextures(1, &self.texture);
			}
			if let Some(tile) = &self.tile {
				gl.DeleteProgram(tile.program);
			}
		}
	}
}

fn compile_tile(gl: &gl::Gles2) -> Result<TileProgram, RenderError> {
	let vertex = compile_shader(gl, gl::VERTEX_SHADER, TILE_VERTEX)?;
	let fragment = match compile_shader(gl, gl::FRAGMENT_SHADER, TILE_FRAGMENT) {
		Ok(fragment) => fragment,
		Err(err) => {
			gl_try!(gl, DeleteShader(vertex));
			return Err(err);
		}
	};
	let program = link_program(gl, vertex, fragment);
	gl_try!(gl, DeleteShader(vertex));
	gl_try!(gl, DeleteShader(fragment));
	let program = program?;

	let name = CString::new("position").map_err(|err| RenderError::Program(err.to_string()))?;
	let location = gl_try!(gl, GetAttribLocation(program, name.as_ptr()));
	let Ok(position) = u32::try_from(location) else {
		gl_try!(gl, DeleteProgram(program));
		return Err(RenderError::Program("tile program has no position attribute".into()));
	};
	debug!(program, "tile program compiled");
	Ok(TileProgram { program, position })
}

fn compile_shader(gl: &gl::Gles2, kind: u32, source: &str) -> Result<u32, RenderError> {
	let source = CString::new(source).map_err(|err| RenderError::Shader(err.to_string()))?;
	let shader = gl_try!(gl, CreateShader(kind));
	let ptr = source.as_ptr();
	gl_try!(gl, ShaderSource(shader, 1, &ptr, std::ptr::null()));
	gl_try!(gl, CompileShader(shader));
	let mut status = 0;
	gl_try!(gl, GetShaderiv(shader, gl::COMPILE_STATUS, &mut status));
	if status == gl::TRUE as i32 {
		return Ok(shader);
	}
	let mut len = 0;
	gl_try!(gl, GetShaderiv(shader, gl::INFO_LOG_LENGTH, &mut len));
	let mut buf = vec![0u8; len.max(0) as usize];
	gl_try!(
		gl,
		GetShaderInfoLog(shader, len, std::ptr::null_mut(), buf.as_mut_ptr().cast())
	);
	gl_try!(gl, DeleteShader(shader));
	Err(RenderError::Shader(String::from_utf8_lossy(&buf).trim().to_string()))
}

fn link_program(gl: &gl::Gles2, vertex: u32, fragment: u32) -> Result<u32, RenderError> {
	let program = gl_try!(gl, CreateProgram());
	gl_try!(gl, AttachShader(program, vertex));
	gl_try!(gl, AttachShader(program, fragment));
	gl_try!(gl, LinkProgram(program));
	let mut status = 0;
	gl_try!(gl, GetProgramiv(program, gl::LINK_STATUS, &mut status));
	if status == gl::TRUE as i32 {
		return Ok(program);
	}
	let mut len = 0;
	gl_try!(gl, GetProgramiv(program, gl::INFO_LOG_LENGTH, &mut len));
	let mut buf = vec![0u8; len.max(0) as usize];
	gl_try!(
		gl,
		GetProgramInfoLog(program, len, std::ptr::null_mut(), buf.as_mut_ptr().cast())
	);
	gl_try!(gl, DeleteProgram(program));
	Err(RenderError::Program(String::from_utf8_lossy(&buf).trim().to_string()))
}
