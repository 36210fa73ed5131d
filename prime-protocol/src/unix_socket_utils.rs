use nix::sys::socket::{AddressFamily, SockFlag, SockType, socketpair};
use std::os::unix::net::UnixStream;

use crate::channel::DescriptorChannel;

/// Create a connected pair of seqpacket channels, one for each process role.
///
/// Seqpacket keeps message boundaries, so every `receive` returns exactly one
/// `send` and a zero-length read means the other end is gone.
pub fn channel_pair() -> Result<(DescriptorChannel, DescriptorChannel), nix::Error> {
	let (a, b) = socketpair(
		AddressFamily::Unix,
		SockType::SeqPacket,
		None,
		SockFlag::SOCK_CLOEXEC,
	)?;
	Ok((
		DescriptorChannel::new(UnixStream::from(a)),
		DescriptorChannel::new(UnixStream::from(b)),
	))
}
