use std::io::{IoSlice, IoSliceMut, Read};
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;

use nix::errno::Errno;
use nix::sys::socket::{ControlMessage, ControlMessageOwned, MsgFlags, recvmsg, sendmsg};
use tracing::{debug, trace};

use crate::{MESSAGE_CAPACITY, ProtocolError, ValidationFailure};

/// One message read off the channel: the payload bytes plus the descriptor that
/// travelled with them, if any. The handle is owned; dropping it closes it.
#[derive(Debug)]
pub struct ChannelMessage {
	pub payload: Vec<u8>,
	pub handle: Option<OwnedFd>,
}

impl ChannelMessage {
	pub fn payload_str(&self) -> Result<&str, ProtocolError> {
		std::str::from_utf8(&self.payload).map_err(|e| ProtocolError::InvalidPayload(e.to_string()))
	}

	/// Take the handle out, failing if the message did not carry one.
	pub fn take_handle(&mut self) -> Result<OwnedFd, ProtocolError> {
		self
			.handle
			.take()
			.ok_or(ProtocolError::Validation(ValidationFailure::MissingHandle))
	}
}

/// A single ancillary record as delivered by `recvmsg`, already converted into
/// owned descriptors so that nothing leaks if the record is rejected.
#[derive(Debug)]
pub enum AncillaryRecord {
	/// `SOL_SOCKET` / `SCM_RIGHTS`.
	Rights(Vec<OwnedFd>),
	/// Any other level/type combination.
	Foreign(String),
}

impl From<ControlMessageOwned> for AncillaryRecord {
	fn from(value: ControlMessageOwned) -> Self {
		match value {
			ControlMessageOwned::ScmRights(fds) => Self::Rights(
				fds
					.into_iter()
					// SAFETY: the kernel just installed these descriptors in our table and
					// nobody else has seen the numbers yet.
					.map(|fd| unsafe { OwnedFd::from_raw_fd(fd) })
					.collect(),
			),
			other => Self::Foreign(format!("{other:?}")),
		}
	}
}

/// Check that the ancillary data of a message is exactly what a single
/// descriptor transfer produces. Rejected descriptors are closed on return.
pub fn validate_ancillary(
	records: Vec<AncillaryRecord>,
	control_truncated: bool,
) -> Result<OwnedFd, ValidationFailure> {
	if control_truncated {
		return Err(ValidationFailure::ControlTruncated);
	}
	let found = records.len();
	let mut records = records.into_iter();
	let (Some(record), None) = (records.next(), records.next()) else {
		return Err(if found == 0 {
			ValidationFailure::MissingHandle
		} else {
			ValidationFailure::RecordCount { found }
		});
	};
	match record {
		AncillaryRecord::Foreign(kind) => Err(ValidationFailure::ForeignRecord { kind }),
		AncillaryRecord::Rights(mut fds) if fds.len() == 1 => Ok(fds.remove(0)),
		AncillaryRecord::Rights(fds) => Err(ValidationFailure::HandleCount { found: fds.len() }),
	}
}

/// Bidirectional message transport over a connected local socket that can carry
/// one descriptor per message.
#[derive(Debug)]
pub struct DescriptorChannel {
	stream: UnixStream,
}

impl DescriptorChannel {
	pub fn new(stream: UnixStream) -> Self {
		Self { stream }
	}

	/// Write `payload`, attaching `handle` as a single `SCM_RIGHTS` record when given.
	pub fn send(&self, payload: &[u8], handle: Option<BorrowedFd<'_>>) -> Result<usize, ProtocolError> {
		if payload.is_empty() {
			return Err(ProtocolError::EmptyPayload);
		}
		if payload.len() > MESSAGE_CAPACITY {
			return Err(ProtocolError::PayloadTooLarge {
				len: payload.len(),
				max: MESSAGE_CAPACITY,
			});
		}
		let iov = [IoSlice::new(payload)];
		let fds: Vec<RawFd> = handle.iter().map(|fd| fd.as_raw_fd()).collect();
		let cmsgs: Vec<ControlMessage> = if fds.is_empty() {
			Vec::new()
		} else {
			vec![ControlMessage::ScmRights(&fds)]
		};

		let written = loop {
			match sendmsg::<()>(self.as_raw_fd(), &iov, &cmsgs, MsgFlags::empty(), None) {
				Err(Errno::EINTR) => continue,
				other => break other,
			}
		}?;
		debug!(bytes = written, handle = ?fds.first(), "sent channel message");
		Ok(written)
	}

	/// Read one message of at most `capacity` bytes.
	///
	/// Returns `Ok(None)` once the peer has closed its end. When `expect_handle`
	/// is set the message must carry exactly one descriptor; otherwise this is a
	/// plain read and no ancillary data is requested.
	pub fn receive(
		&self,
		capacity: usize,
		expect_handle: bool,
	) -> Result<Option<ChannelMessage>, ProtocolError> {
		if expect_handle {
			self.receive_with_handle(capacity)
		} else {
			self.receive_plain(capacity)
		}
	}

	fn receive_plain(&self, capacity: usize) -> Result<Option<ChannelMessage>, ProtocolError> {
		let mut buf = vec![0u8; capacity];
		let read = loop {
			match (&self.stream).read(&mut buf) {
				Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
				other => break other,
			}
		}?;
		if read == 0 {
			trace!("peer closed channel");
			return Ok(None);
		}
		buf.truncate(read);
		Ok(Some(ChannelMessage {
			payload: buf,
			handle: None,
		}))
	}

	fn receive_with_handle(&self, capacity: usize) -> Result<Option<ChannelMessage>, ProtocolError> {
		let mut buf = vec![0u8; capacity];
		let mut cmsg_space = nix::cmsg_space!(RawFd);

		let (bytes, flags, records) = {
			let mut iov = [IoSliceMut::new(&mut buf)];
			let msg = loop {
				match recvmsg::<()>(
					self.as_raw_fd(),
					&mut iov,
					Some(&mut cmsg_space),
					MsgFlags::MSG_CMSG_CLOEXEC,
				) {
					Err(Errno::EINTR) => continue,
					other => break other,
				}
			}?;
			let records: Vec<AncillaryRecord> = msg.cmsgs()?.map(AncillaryRecord::from).collect();
			(msg.bytes, msg.flags, records)
		};

		if bytes == 0 && records.is_empty() {
			trace!("peer closed channel");
			return Ok(None);
		}
		if flags.contains(MsgFlags::MSG_TRUNC) {
			return Err(ProtocolError::Truncated);
		}
		let handle = validate_ancillary(records, flags.contains(MsgFlags::MSG_CTRUNC))?;
		buf.truncate(bytes);
		debug!(bytes, handle = handle.as_raw_fd(), "received channel message");
		Ok(Some(ChannelMessage {
			payload: buf,
			handle: Some(handle),
		}))
	}
}

impl From<UnixStream> for DescriptorChannel {
	fn from(stream: UnixStream) -> Self {
		Self::new(stream)
	}
}

impl AsRawFd for DescriptorChannel {
	fn as_raw_fd(&self) -> RawFd {
		self.stream.as_raw_fd()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn pipe_ends() -> (OwnedFd, OwnedFd) {
		nix::unistd::pipe().expect("pipe")
	}

	#[test]
	fn single_rights_record_is_accepted() {
		let (read_end, _write_end) = pipe_ends();
		let raw = read_end.as_raw_fd();
		let fd = validate_ancillary(vec![AncillaryRecord::Rights(vec![read_end])], false).unwrap();
		assert_eq!(fd.as_raw_fd(), raw);
	}

	#[test]
	fn missing_record_is_rejected() {
		assert_eq!(
			validate_ancillary(Vec::new(), false).unwrap_err(),
			ValidationFailure::MissingHandle
		);
	}

	#[test]
	fn foreign_record_is_rejected() {
		let err = validate_ancillary(vec![AncillaryRecord::Foreign("ScmCredentials".into())], false)
			.unwrap_err();
		assert!(matches!(err, ValidationFailure::ForeignRecord { .. }));
	}

	#[test]
	fn rights_record_with_two_descriptors_is_rejected() {
		let (a, b) = pipe_ends();
		let err = validate_ancillary(vec![AncillaryRecord::Rights(vec![a, b])], false).unwrap_err();
		assert_eq!(err, ValidationFailure::HandleCount { found: 2 });
	}

	#[test]
	fn extra_records_are_rejected() {
		let (a, b) = pipe_ends();
		let err = validate_ancillary(
			vec![
				AncillaryRecord::Rights(vec![a]),
				AncillaryRecord::Rights(vec![b]),
			],
			false,
		)
		.unwrap_err();
		assert_eq!(err, ValidationFailure::RecordCount { found: 2 });
	}

	#[test]
	fn truncated_control_data_is_rejected_even_with_a_record() {
		let (a, _b) = pipe_ends();
		let err = validate_ancillary(vec![AncillaryRecord::Rights(vec![a])], true).unwrap_err();
		assert_eq!(err, ValidationFailure::ControlTruncated);
	}
}
