/// Errors that can occur while assembling a message from a byte stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The message header contains an invalid magic number.
    #[error("invalid message magic (expected 0x4D4C \"ML\")")]
    InvalidMagic,

    /// The announced payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// More bytes were pushed into an assembler that already completed.
    #[error("assembler already yielded its message")]
    AlreadyComplete,
}

pub type Result<T> = std::result::Result<T, FrameError>;
