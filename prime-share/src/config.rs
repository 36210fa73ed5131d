use std::path::{Path, PathBuf};
use std::time::Duration;

use prime_display::{BufferRequest, DISPLAY_FORMAT, OutputPolicy};
use prime_protocol::BufferGeometry;

use crate::error::ShareError;

pub const DEFAULT_CARD_NODE: &str = "/dev/dri/card1";
pub const DEFAULT_RENDER_NODE: &str = "/dev/dri/renderD128";

pub const CARD_NODE_VAR: &str = "PRIME_CARD_NODE";
pub const RENDER_NODE_VAR: &str = "PRIME_RENDER_NODE";
pub const FLIP_POLL_VAR: &str = "PRIME_FLIP_POLL_MS";

/// Builder-style configuration shared by both roles.
#[derive(Debug, Clone)]
pub struct ShareConfig {
	card_node: PathBuf,
	render_node: PathBuf,
	width: u32,
	height: u32,
	flip_poll_interval: Duration,
	output_policy: OutputPolicy,
}

impl Default for ShareConfig {
	fn default() -> Self {
		Self::new()
	}
}

impl ShareConfig {
	pub fn new() -> Self {
		Self {
			card_node: PathBuf::from(DEFAULT_CARD_NODE),
			render_node: PathBuf::from(DEFAULT_RENDER_NODE),
			width: 1920,
			height: 1080,
			flip_poll_interval: prime_display::scanout::DEFAULT_POLL_INTERVAL,
			output_policy: OutputPolicy::default(),
		}
	}

	/// Defaults overridden by `PRIME_*` environment variables.
	pub fn from_env() -> Result<Self, ShareError> {
		Self::new().apply_env(|name| std::env::var(name).ok())
	}

	pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ShareError> {
		if let Some(path) = lookup(CARD_NODE_VAR) {
			self = self.card_node(path);
		}
		if let Some(path) = lookup(RENDER_NODE_VAR) {
			self = self.render_node(path);
		}
		if let Some(value) = lookup(FLIP_POLL_VAR) {
			let millis = value
				.trim()
				.parse::<u64>()
				.ok()
				.filter(|&ms| ms > 0)
				.ok_or_else(|| ShareError::Config {
					var: FLIP_POLL_VAR,
					value: value.clone(),
				})?;
			self = self.flip_poll_interval(Duration::from_millis(millis));
		}
		Ok(self)
	}

	pub fn card_node(mut self, path: impl AsRef<Path>) -> Self {
		self.card_node = path.as_ref().into();
		self
	}

	pub fn render_node(mut self, path: impl AsRef<Path>) -> Self {
		self.render_node = path.as_ref().into();
		self
	}

	pub fn size(mut self, width: u32, height: u32) -> Self {
		self.width = width;
		self.height = height;
		self
	}

	pub fn flip_poll_interval(mut self, interval: Duration) -> Self {
		self.flip_poll_interval = interval;
		self
	}

	pub fn card_node_path(&self) -> &Path {
		&self.card_node
	}

	pub fn render_node_path(&self) -> &Path {
		&self.render_node
	}

	pub fn dimensions(&self) -> (u32, u32) {
		(self.width, self.height)
	}

	pub fn poll_interval(&self) -> Duration {
		self.flip_poll_interval
	}

	pub fn policy(&self) -> &OutputPolicy {
		&self.output_policy
	}

	pub fn buffer_request(&self) -> BufferRequest {
		BufferRequest {
			width: self.width,
			height: self.height,
			format: DISPLAY_FORMAT,
		}
	}

	/// What the consumer assumes when an announcement carries no geometry.
	pub fn fallback_geometry(&self) -> BufferGeometry {
		BufferGeometry::packed(self.width, self.height, DISPLAY_FORMAT as u32)
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;

	fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> = pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |name| map.get(name).cloned()
	}

	#[test]
	fn defaults_match_the_reference_setup() {
		let config = ShareConfig::new();
		assert_eq!(config.card_node_path(), Path::new("/dev/dri/card1"));
		assert_eq!(config.render_node_path(), Path::new("/dev/dri/renderD128"));
		assert_eq!(config.dimensions(), (1920, 1080));
		assert_eq!(config.poll_interval(), Duration::from_secs(1));
	}

	#[test]
	fn environment_overrides_nodes_and_poll_interval() {
		let config = ShareConfig::new()
			.apply_env(env(&[
				(CARD_NODE_VAR, "/dev/dri/card0"),
				(RENDER_NODE_VAR, "/dev/dri/renderD129"),
				(FLIP_POLL_VAR, "250"),
			]))
			.unwrap();
		assert_eq!(config.card_node_path(), Path::new("/dev/dri/card0"));
		assert_eq!(config.render_node_path(), Path::new("/dev/dri/renderD129"));
		assert_eq!(config.poll_interval(), Duration::from_millis(250));
	}

	#[test]
	fn unparsable_poll_interval_is_rejected() {
		for bad in ["soon", "0", "-5"] {
			let err = ShareConfig::new()
				.apply_env(env(&[(FLIP_POLL_VAR, bad)]))
				.unwrap_err();
			assert!(matches!(err, ShareError::Config { var: FLIP_POLL_VAR, .. }), "{bad}");
		}
	}

	#[test]
	fn fallback_geometry_is_tightly_packed_argb() {
		let geometry = ShareConfig::new().size(640, 480).fallback_geometry();
		assert_eq!(geometry.stride, 640 * 4);
		assert_eq!(geometry.fourcc, DISPLAY_FORMAT as u32);
		let request = ShareConfig::new().size(640, 480).buffer_request();
		assert_eq!((request.width, request.height), (640, 480));
	}
}
