use std::time::Duration;

use bytes::BytesMut;

use crate::assembler::{AssemblerFactory, AssemblyStatus, FrameAssembler};
use crate::codec::{decode_message, MessageConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Default [`FrameAssembler`]: magic + little-endian length header.
///
/// Accumulates partial reads until the announced payload length is
/// buffered, however small the fragments arrive.
pub struct LengthPrefixAssembler {
    buf: BytesMut,
    config: MessageConfig,
    complete: bool,
}

impl LengthPrefixAssembler {
    /// Create an assembler with default configuration.
    pub fn new() -> Self {
        Self::with_config(MessageConfig::default())
    }

    /// Create an assembler with explicit configuration.
    pub fn with_config(config: MessageConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            complete: false,
        }
    }
}

impl Default for LengthPrefixAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler for LengthPrefixAssembler {
    fn push(&mut self, chunk: &[u8]) -> Result<AssemblyStatus> {
        if self.complete {
            return Err(FrameError::AlreadyComplete);
        }

        self.buf.extend_from_slice(chunk);
        match decode_message(&mut self.buf, self.config.max_payload_size)? {
            Some(message) => {
                self.complete = true;
                Ok(AssemblyStatus::Complete(message))
            }
            None => Ok(AssemblyStatus::Incomplete),
        }
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }
}

/// [`AssemblerFactory`] for [`LengthPrefixAssembler`] instances.
#[derive(Debug, Clone, Default)]
pub struct LengthPrefixFactory {
    config: MessageConfig,
}

impl LengthPrefixFactory {
    /// Factory producing assemblers with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory producing assemblers with explicit configuration.
    pub fn with_config(config: MessageConfig) -> Self {
        Self { config }
    }

    /// Override the reply timeout carried by produced assemblers.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }
}

impl AssemblerFactory for LengthPrefixFactory {
    fn create(&self) -> Box<dyn FrameAssembler> {
        Box::new(LengthPrefixAssembler::with_config(self.config.clone()))
    }
}
