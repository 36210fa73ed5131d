use std::os::fd::AsFd;

use prime_display::DisplayAuthority;
use prime_protocol::{
	BufferAnnouncement, BufferGeometry, ChannelMessage, DescriptorChannel, MESSAGE_CAPACITY,
};
use prime_render::{GpuContext, ImageImporter, RenderBackend};
use tracing::{debug, info, warn};

use crate::config::ShareConfig;
use crate::error::{ShareError, absorb};

const DEGREE_STEP: u32 = 10;

/// The rendering side: draws into every buffer the producer shares.
pub struct Consumer {
	backend: RenderBackend,
	importer: ImageImporter,
	channel: DescriptorChannel,
	fallback: BufferGeometry,
	degrees: u32,
	gpu: GpuContext,
}

impl Consumer {
	pub fn new(config: &ShareConfig, channel: DescriptorChannel) -> Result<Self, ShareError> {
		let (width, height) = config.dimensions();
		let gpu = GpuContext::open(config.render_node_path(), width, height)
			.map_err(ShareError::setup("consumer gpu context"))?;
		// Render nodes never hold master; this only matters when pointed at a card node.
		if let Err(err) = gpu.card().relinquish_authority() {
			debug!(%err, "no drm master to drop");
		}
		Ok(Self {
			backend: RenderBackend::new(&gpu),
			importer: ImageImporter::new(),
			channel,
			fallback: config.fallback_geometry(),
			degrees: 0,
			gpu,
		})
	}

	/// Receive until the producer hangs up. Returns how many buffers were drawn.
	pub fn run(&mut self) -> Result<u64, ShareError> {
		let mut frames = 0;
		loop {
			let message = match self.channel.receive(MESSAGE_CAPACITY, true) {
				Ok(Some(message)) => message,
				Ok(None) => {
					info!("producer closed the channel");
					break;
				}
				Err(err) => {
					absorb(Err(err.into()), "receive")?;
					continue;
				}
			};
			let result = self.render_into(message);
			if result.is_ok() {
				frames += 1;
			}
			absorb(result, "consumer frame")?;
		}
		Ok(frames)
	}

	fn render_into(&mut self, mut message: ChannelMessage) -> Result<(), ShareError> {
		let fd = message.take_handle()?;
		let geometry = announced_geometry(&message.payload, self.fallback);

		let image = self.importer.import_foreign(&self.gpu, fd.as_fd(), &geometry)?;
		self.backend.attach_framebuffer(image)?;
		self.degrees = advance(self.degrees);
		self.backend.color_fill(self.degrees as f32)?;
		self.gpu.swap_buffers()?;
		debug!(degrees = self.degrees, "drew into shared buffer");
		// The image keeps its own reference to the buffer.
		drop(fd);
		Ok(())
	}
}

fn advance(degrees: u32) -> u32 {
	(degrees + DEGREE_STEP) % 360
}

/// Geometry carried by the announcement, or `fallback` when it has none or
/// cannot be parsed.
fn announced_geometry(payload: &[u8], fallback: BufferGeometry) -> BufferGeometry {
	match BufferAnnouncement::parse(payload) {
		Ok(BufferAnnouncement {
			geometry: Some(geometry),
			..
		}) => geometry,
		Ok(announcement) => {
			debug!(%announcement, "announcement without geometry, using configured size");
			fallback
		}
		Err(err) => {
			warn!(%err, "unreadable announcement, using configured size");
			fallback
		}
	}
}

pub fn run(config: &ShareConfig, channel: DescriptorChannel) -> Result<(), ShareError> {
	let mut consumer = Consumer::new(config, channel)?;
	let frames = consumer.run()?;
	info!(frames, "consumer done");
	Ok(())
}
