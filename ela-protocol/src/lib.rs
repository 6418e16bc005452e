//! Codec for the ELAP wire protocol, as spoken by serial-attached embedded
//! logic analyzers.
//!
//! Frames start with a one-byte command type. The short commands (`RESET`,
//! `HANDSHAKE`, `START`, `STOP`) are just that byte; the long commands
//! (`SET`, `GET`, `REPORT`) carry a subtype byte and a subtype-specific
//! payload. All multi-byte integers are big-endian.
//!
//! This crate only converts between [`Command`] values and bytes; it performs
//! no I/O. The driver layers sit on top of it.

mod command;
mod cursor;
mod error;

pub use command::{
    payload_len, subtype_is_valid, Command, CommandSubtype, CommandType, GetRequest,
    MetadataHeader, PinMode, Report, SampledDataInfo, SetRequest, HANDSHAKE_REPLY, MAX_FRAME_SIZE,
    METADATA_WIRE_SIZE, SAMPLED_INFO_WIRE_SIZE,
};
pub use cursor::{ReadCursor, WriteCursor, NAME_MAX_LEN};
pub use error::ProtocolError;
