use thiserror::Error;

use crate::command::{CommandSubtype, CommandType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown command type 0x{0:02x}")]
    UnknownType(u8),

    #[error("unknown command subtype 0x{0:02x}")]
    UnknownSubtype(u8),

    #[error("{ty:?} does not support subtype {subtype:?}")]
    InvalidPair {
        ty: CommandType,
        subtype: CommandSubtype,
    },

    #[error("unknown pin mode 0x{0:04x}")]
    InvalidPinMode(u16),

    #[error("integer width {0} is out of range (1-8)")]
    BadWidth(usize),

    #[error("buffer too small: needed {needed} bytes, {available} available")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("device name longer than {0} bytes")]
    NameTooLong(usize),

    #[error("device name is not NUL-terminated")]
    UnterminatedName,
}
