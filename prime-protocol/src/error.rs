/// Ways an ancillary record can fail to describe a single transferred descriptor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationFailure {
	#[error("a descriptor was expected but the message carried no ancillary record")]
	MissingHandle,
	#[error("ancillary data was truncated by the kernel (control buffer too small)")]
	ControlTruncated,
	#[error("expected exactly one ancillary record, got {found}")]
	RecordCount { found: usize },
	#[error("ancillary record has unexpected origin/kind: {kind}")]
	ForeignRecord { kind: String },
	#[error("SCM_RIGHTS record must carry exactly one descriptor, carried {found}")]
	HandleCount { found: usize },
}

/// Channel level errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
	#[error("nix error: {0}")]
	Nix(#[from] nix::Error),
	#[error("invalid ancillary record: {0}")]
	Validation(#[from] ValidationFailure),
	#[error("message payload was truncated (buffer too small)")]
	Truncated,
	/// A zero-length seqpacket read is how the peer's close shows up, so empty
	/// messages are never sent.
	#[error("refusing to send an empty payload")]
	EmptyPayload,
	#[error("payload of {len} bytes exceeds the {max} byte message limit")]
	PayloadTooLarge { len: usize, max: usize },
	#[error("invalid payload: {0}")]
	InvalidPayload(String),
}

impl ProtocolError {
	/// True when the failure came from the transport itself rather than from the
	/// contents of a message.
	pub fn is_transport(&self) -> bool {
		matches!(self, ProtocolError::Io(_) | ProtocolError::Nix(_))
	}
}
