//! Generated GLES2 bindings with the EGLImage extensions.
#![allow(clippy::all)]

include!(concat!(env!("OUT_DIR"), "/gl_bindings.rs"));
