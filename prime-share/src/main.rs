use std::process::ExitCode;

use nix::sys::wait::waitpid;
use nix::unistd::{ForkResult, fork};
use prime_protocol::channel_pair;

use crate::config::ShareConfig;
use crate::error::ShareError;

mod config;
mod consumer;
mod error;
mod keys;
mod producer;

fn main() -> ExitCode {
	// ---- logging/tracing ----
	tracing_subscriber::fmt()
		.with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
		.with_target(false)
		.init();

	match run() {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			tracing::error!(class = ?e.class(), "prime-share failed: {e}");
			ExitCode::FAILURE
		}
	}
}

fn run() -> Result<(), ShareError> {
	let config = ShareConfig::from_env()?;
	tracing::debug!(?config, "configuration loaded");

	// ---- channel, then split into the two roles ----
	let (producer_end, consumer_end) = channel_pair().map_err(ShareError::setup("socket pair"))?;
	// SAFETY: still single threaded, nothing but the subscriber has been set up.
	match unsafe { fork() }.map_err(ShareError::Fork)? {
		ForkResult::Child => {
			drop(producer_end);
			consumer::run(&config, consumer_end)
		}
		ForkResult::Parent { child } => {
			drop(consumer_end);
			tracing::info!(%child, "consumer started");
			let result = producer::run(&config, producer_end);
			match waitpid(child, None) {
				Ok(status) => tracing::info!(?status, "consumer exited"),
				Err(e) => tracing::warn!("waiting for consumer {child} failed: {e}"),
			}
			result
		}
	}
}
