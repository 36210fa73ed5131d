use std::fs::File;
use std::io::{ErrorKind, IoSlice, Read, Write};
use std::os::fd::{AsFd, AsRawFd, OwnedFd};

use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::sys::socket::{ControlMessage, MsgFlags, sendmsg};
use prime_protocol::{
	BufferAnnouncement, MESSAGE_CAPACITY, ProtocolError, ValidationFailure, channel_pair,
};

fn nonblocking_pipe() -> (File, OwnedFd) {
	let (read_end, write_end) = nix::unistd::pipe().unwrap();
	fcntl(read_end.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK)).unwrap();
	(File::from(read_end), write_end)
}

fn drain(reader: &mut File) -> (Vec<u8>, bool) {
	let mut out = Vec::new();
	let mut chunk = [0u8; 64];
	loop {
		match reader.read(&mut chunk) {
			Ok(0) => return (out, true),
			Ok(n) => out.extend_from_slice(&chunk[..n]),
			Err(e) if e.kind() == ErrorKind::WouldBlock => return (out, false),
			Err(e) => panic!("read failed: {e}"),
		}
	}
}

#[test]
fn handle_round_trip_refers_to_the_same_resource() {
	let (producer, consumer) = channel_pair().unwrap();
	let (mut reader, writer) = nonblocking_pipe();

	let payload = BufferAnnouncement::new(writer.as_raw_fd()).to_string();
	let sent = producer.send(payload.as_bytes(), Some(writer.as_fd())).unwrap();
	assert_eq!(sent, payload.len());

	let mut msg = consumer.receive(MESSAGE_CAPACITY, true).unwrap().unwrap();
	assert_eq!(msg.payload_str().unwrap(), payload);
	let received = msg.take_handle().unwrap();
	assert_ne!(received.as_raw_fd(), -1);

	File::from(received).write_all(b"through the copy").unwrap();
	let (bytes, _) = drain(&mut reader);
	assert_eq!(bytes, b"through the copy");
}

#[test]
fn plain_message_without_expected_handle_is_a_plain_read() {
	let (producer, consumer) = channel_pair().unwrap();
	producer.send(b"hello", None).unwrap();
	let msg = consumer.receive(MESSAGE_CAPACITY, false).unwrap().unwrap();
	assert_eq!(msg.payload, b"hello");
	assert!(msg.handle.is_none());
}

#[test]
fn missing_handle_is_a_validation_failure() {
	let (producer, consumer) = channel_pair().unwrap();
	producer.send(b"FD : 7", None).unwrap();
	let err = consumer.receive(MESSAGE_CAPACITY, true).unwrap_err();
	assert!(matches!(
		err,
		ProtocolError::Validation(ValidationFailure::MissingHandle)
	));
}

#[test]
fn two_descriptors_in_one_record_are_rejected_and_closed() {
	let (producer, consumer) = channel_pair().unwrap();
	let (mut reader_a, writer_a) = nonblocking_pipe();
	let (mut reader_b, writer_b) = nonblocking_pipe();

	let fds = [writer_a.as_raw_fd(), writer_b.as_raw_fd()];
	let cmsgs = [ControlMessage::ScmRights(&fds)];
	sendmsg::<()>(
		producer.as_raw_fd(),
		&[IoSlice::new(b"FD : 2")],
		&cmsgs,
		MsgFlags::empty(),
		None,
	)
	.unwrap();
	drop(writer_a);
	drop(writer_b);

	let err = consumer.receive(MESSAGE_CAPACITY, true).unwrap_err();
	assert!(matches!(err, ProtocolError::Validation(_)), "got {err:?}");

	// No copy may survive a rejected receive.
	assert_eq!(drain(&mut reader_a), (Vec::new(), true));
	assert_eq!(drain(&mut reader_b), (Vec::new(), true));
}

#[test]
fn closed_peer_ends_the_receive_loop() {
	let (producer, consumer) = channel_pair().unwrap();
	producer.send(b"last", None).unwrap();
	drop(producer);

	let mut received = Vec::new();
	while let Some(msg) = consumer.receive(MESSAGE_CAPACITY, false).unwrap() {
		received.push(msg.payload);
	}
	assert_eq!(received, vec![b"last".to_vec()]);
	assert!(consumer.receive(MESSAGE_CAPACITY, true).unwrap().is_none());
}

#[test]
fn oversized_payload_is_refused_before_sending() {
	let (producer, _consumer) = channel_pair().unwrap();
	let payload = vec![b'x'; MESSAGE_CAPACITY + 1];
	assert!(matches!(
		producer.send(&payload, None),
		Err(ProtocolError::PayloadTooLarge { .. })
	));
}

#[test]
fn empty_payload_is_refused_so_it_cannot_look_like_a_close() {
	let (producer, consumer) = channel_pair().unwrap();
	let (_reader, writer) = nonblocking_pipe();
	assert!(matches!(producer.send(b"", None), Err(ProtocolError::EmptyPayload)));
	assert!(matches!(
		producer.send(b"", Some(writer.as_fd())),
		Err(ProtocolError::EmptyPayload)
	));

	// The peer is still there: the next real message is the first thing read.
	producer.send(b"FD : 3", Some(writer.as_fd())).unwrap();
	let mut msg = consumer
		.receive(MESSAGE_CAPACITY, true)
		.unwrap()
		.expect("refused sends must not read as a closed peer");
	assert_eq!(msg.payload, b"FD : 3");
	assert!(msg.take_handle().is_ok());
}

#[test]
fn consecutive_descriptors_are_each_closed_exactly_once() {
	let (producer, consumer) = channel_pair().unwrap();
	let (mut reader, writer) = nonblocking_pipe();

	for frame in 1..=2 {
		// Re-export: a fresh descriptor number for the same underlying resource.
		let exported = writer.try_clone().unwrap();
		let payload = BufferAnnouncement::new(exported.as_raw_fd()).to_string();
		producer.send(payload.as_bytes(), Some(exported.as_fd())).unwrap();
		drop(exported);

		let mut msg = consumer
			.receive(MESSAGE_CAPACITY, true)
			.unwrap()
			.expect("second receive must not depend on the first close");
		let mut file = File::from(msg.take_handle().unwrap());
		write!(file, "frame {frame};").unwrap();
		drop(file);
	}
	drop(writer);

	let (bytes, closed) = drain(&mut reader);
	assert_eq!(bytes, b"frame 1;frame 2;");
	assert!(closed, "a received descriptor was leaked");
}
