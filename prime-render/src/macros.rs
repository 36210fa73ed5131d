/// Run one GL call and bail out of the enclosing function with
/// [`RenderError::Gl`](crate::error::RenderError::Gl) if it raised the error flag.
macro_rules! gl_try {
	($gl:expr, $fn:ident ( $($arg:expr),* $(,)? )) => {{
		#[allow(unused_unsafe)]
		let (result, err) = unsafe {
			let res = $gl.$fn($($arg),*);
			let err = $gl.GetError();
			(res, err)
		};
		if err != $crate::gl::NO_ERROR {
			return Err($crate::error::RenderError::Gl {
				call: stringify!($fn),
				code: err,
			});
		}
		result
	}};
}
