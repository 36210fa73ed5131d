use std::io::BufRead;
use std::os::fd::AsRawFd;

use prime_display::{
	BufferLifecycle, BufferRequest, CommitOutcome, DisplayAuthority, DisplayTarget, LifecycleError,
	ScanoutEngine, find_output,
};
use prime_protocol::{BufferAnnouncement, DescriptorChannel};
use prime_render::{GbmBuffer, GpuContext, ImageImporter, RenderBackend};
use tracing::{debug, info, warn};

use crate::config::ShareConfig;
use crate::error::{ShareError, absorb};
use crate::keys::{Command, KeyReader, PROMPT};

/// The display-owning side: shares a buffer with the consumer on demand and
/// scans out a frame for every buffer it shares.
pub struct Producer {
	backend: RenderBackend,
	importer: ImageImporter,
	lifecycle: BufferLifecycle<GbmBuffer>,
	engine: ScanoutEngine,
	target: DisplayTarget,
	request: BufferRequest,
	channel: DescriptorChannel,
	gpu: GpuContext,
}

impl Producer {
	pub fn new(config: &ShareConfig, channel: DescriptorChannel) -> Result<Self, ShareError> {
		let (width, height) = config.dimensions();
		let gpu = GpuContext::open(config.card_node_path(), width, height)
			.map_err(ShareError::setup("producer gpu context"))?;
		if let Err(err) = gpu.card().acquire_authority() {
			warn!(%err, "could not become drm master, flips will likely be refused");
		}
		let target = find_output(gpu.card(), config.policy())?;
		info!(connector = %target.connector, crtc = %target.crtc, "output selected");

		Ok(Self {
			backend: RenderBackend::new(&gpu),
			importer: ImageImporter::new(),
			lifecycle: BufferLifecycle::new(),
			engine: ScanoutEngine::new(config.poll_interval()),
			target,
			request: config.buffer_request(),
			channel,
			gpu,
		})
	}

	/// Serve key commands until the operator quits or the channel breaks.
	pub fn run<R: BufRead>(&mut self, keys: &mut KeyReader<R>) -> Result<u64, ShareError> {
		drive(keys, || self.cycle())
	}

	/// Share the buffer once and put one frame on screen.
	pub fn cycle(&mut self) -> Result<(), ShareError> {
		let mut allocator = self.gpu.allocator();
		let geometry = self
			.lifecycle
			.acquire_exportable(&mut allocator, &self.request)?
			.buffer()
			.geometry();

		let fd = self.lifecycle.export_handle()?;
		let announcement = BufferAnnouncement::new(fd.as_raw_fd()).with_geometry(geometry);
		let sent = self.channel.send(announcement.to_string().as_bytes(), Some(fd))?;
		debug!(sent, %announcement, "shared buffer announced");
		self.lifecycle.release_descriptor();

		let shared = self.lifecycle.shared().ok_or(LifecycleError::NoSharedBuffer)?;
		let image = self.importer.import_local(&self.gpu, shared.buffer())?;
		self.backend.render_tile(image)?;
		self.gpu.swap_buffers()?;

		let mut front = self.gpu.front_buffers();
		let card = self.gpu.card();
		let (engine, target) = (&mut self.engine, &mut self.target);
		let outcome = self
			.lifecycle
			.scan_out_front(&mut front, |buffer| engine.scan_out(card, target, buffer))??;
		match outcome {
			CommitOutcome::FlipConfirmed { timeouts } => debug!(timeouts, "flip confirmed"),
			CommitOutcome::ModeSet => info!("flip refused, mode-set applied instead"),
			CommitOutcome::Skipped(rejection) => warn!(%rejection, "commit skipped"),
		}
		Ok(())
	}

	/// Drop the bound framebuffer and the preview image.
	pub fn shutdown(mut self) {
		self.importer.release();
		self.engine.teardown(self.gpu.card(), &mut self.target);
	}
}

/// Run `cycle` once per `c` key. Non-fatal cycle failures are logged and the
/// prompt comes back; returns how many cycles succeeded.
pub fn drive<R: BufRead>(
	keys: &mut KeyReader<R>,
	mut cycle: impl FnMut() -> Result<(), ShareError>,
) -> Result<u64, ShareError> {
	let mut completed = 0;
	loop {
		println!("{PROMPT}");
		match keys.next_command()? {
			Command::Quit => break,
			Command::Ignored(key) => debug!(%key, "ignoring key"),
			Command::Create => {
				let result = cycle();
				if result.is_ok() {
					completed += 1;
				}
				absorb(result, "producer cycle")?;
			}
		}
	}
	Ok(completed)
}

pub fn run(config: &ShareConfig, channel: DescriptorChannel) -> Result<(), ShareError> {
	let mut producer = Producer::new(config, channel)?;
	let stdin = std::io::stdin();
	let mut keys = KeyReader::new(stdin.lock());
	let served = producer.run(&mut keys);
	producer.shutdown();
	let cycles = served?;
	info!(cycles, "producer done");
	Ok(())
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use prime_display::{LifecycleError, ScanoutError};
	use prime_protocol::ProtocolError;

	use super::*;

	#[test]
	fn one_cycle_per_create_key() {
		let mut keys = KeyReader::new(Cursor::new("c\nx\nc\nq\nc\n"));
		let mut calls = 0;
		let done = drive(&mut keys, || {
			calls += 1;
			Ok(())
		})
		.unwrap();
		assert_eq!((calls, done), (2, 2));
	}

	#[test]
	fn soft_failures_bring_the_prompt_back() {
		let mut keys = KeyReader::new(Cursor::new("c\nc\nc\n"));
		let mut calls = 0;
		let done = drive(&mut keys, || {
			calls += 1;
			match calls {
				1 => Err(LifecycleError::FrontBufferOutstanding.into()),
				2 => Err(ScanoutError::NoActiveMode(prime_display::CrtcId(3)).into()),
				_ => Ok(()),
			}
		})
		.unwrap();
		assert_eq!((calls, done), (3, 1));
	}

	#[test]
	fn broken_channel_ends_the_loop() {
		let mut keys = KeyReader::new(Cursor::new("c\nc\n"));
		let mut calls = 0;
		let err = drive(&mut keys, || {
			calls += 1;
			Err(ProtocolError::Io(std::io::ErrorKind::BrokenPipe.into()).into())
		})
		.unwrap_err();
		assert!(matches!(err, ShareError::Protocol(_)));
		assert_eq!(calls, 1);
	}
}
