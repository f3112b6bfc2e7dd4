//! Message reassembly for the meterlink remote-control transport.
//!
//! The transport moves opaque byte sequences; turning a stream of partial
//! reads into one complete logical message is the job of a
//! [`FrameAssembler`]. The transport depends only on the trait contract
//! (one assembler per connection, one complete message or a timeout) and
//! ships [`LengthPrefixAssembler`] as the default implementation:
//! - A 2-byte magic number ("ML") for stream synchronization
//! - A 4-byte little-endian payload length
//!
//! Applications with their own wire format substitute their own assembler
//! through an [`AssemblerFactory`].

pub mod assembler;
pub mod codec;
pub mod error;
pub mod length_prefix;

pub use assembler::{AssemblerFactory, AssemblyStatus, FrameAssembler};
pub use codec::{
    decode_message, encode_message, MessageConfig, DEFAULT_MAX_PAYLOAD, DEFAULT_REPLY_TIMEOUT,
    HEADER_SIZE, MAGIC,
};
pub use error::{FrameError, Result};
pub use length_prefix::{LengthPrefixAssembler, LengthPrefixFactory};
