//! Descriptor channel shared by the producer and consumer processes.
//! - Message transport over a Unix socket pair (sendmsg/recvmsg + SCM_RIGHTS)
//! - Validation of the ancillary record that carries a buffer descriptor
//! - The `FD : <n>` announcement payload that travels with each buffer

mod error;
pub mod channel;
pub mod message;
pub mod unix_socket_utils;

pub use channel::{AncillaryRecord, ChannelMessage, DescriptorChannel, validate_ancillary};
pub use error::{ProtocolError, ValidationFailure};
pub use message::{BufferAnnouncement, BufferGeometry};
pub use unix_socket_utils::channel_pair;

/// Largest payload a single channel message may carry.
pub const MESSAGE_CAPACITY: usize = 255;
