use std::{env, fs::File, path::PathBuf};

use gl_generator::{Api, Fallbacks, Profile, Registry};

fn main() {
	let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

	// Core EGL comes from khronos-egl; only the image extensions are generated here.
	let egl_path = out_dir.join("egl_bindings.rs");
	let mut egl_file = File::create(&egl_path).unwrap();
	Registry::new(
		Api::Egl,
		(1, 5),
		Profile::Core,
		Fallbacks::All,
		&[
			"EGL_KHR_image_base",
			"EGL_KHR_image_pixmap",
			"EGL_EXT_image_dma_buf_import",
		],
	)
	.write_bindings(gl_generator::StructGenerator, &mut egl_file)
	.unwrap();

	let gl_path = out_dir.join("gl_bindings.rs");
	let mut gl_file = File::create(&gl_path).unwrap();
	Registry::new(
		Api::Gles2,
		(2, 0),
		Profile::Core,
		Fallbacks::All,
		&["GL_OES_EGL_image", "GL_OES_EGL_image_external"],
	)
	.write_bindings(gl_generator::StructGenerator, &mut gl_file)
	.unwrap();

	println!("cargo:rerun-if-changed=build.rs");
}
