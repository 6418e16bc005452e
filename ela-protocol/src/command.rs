use crate::cursor::{ReadCursor, WriteCursor};
use crate::error::ProtocolError;

/// Size of a `REPORT SAMPLED_DATA` info frame: type, subtype, sampled count,
/// trigger index.
pub const SAMPLED_INFO_WIRE_SIZE: usize = 1 + 1 + 4 + 4;

/// Size of the fixed portion of a `REPORT METADATA` frame: type, subtype,
/// string size, max sample rate, max sample count, pin count. The device name
/// bytes follow separately.
pub const METADATA_WIRE_SIZE: usize = 1 + 1 + 1 + 4 + 4 + 2;

/// Largest frame the codec produces or consumes in one piece.
pub const MAX_FRAME_SIZE: usize = METADATA_WIRE_SIZE;

/// The fixed reply to `HANDSHAKE`, 7 bytes including the trailing NUL.
pub const HANDSHAKE_REPLY: &[u8; 7] = b"ELAPV1\0";

/// Command type opcode. `Reset` through `Stop` are short commands carried as
/// a single byte; `Set`, `Get` and `Report` are followed by a subtype byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Reset = 0x00,
    Handshake = 0x01,
    Start = 0x02,
    Stop = 0x03,
    Set = 0x04,
    Get = 0x05,
    Report = 0x06,
}

impl CommandType {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(CommandType::Reset),
            0x01 => Some(CommandType::Handshake),
            0x02 => Some(CommandType::Start),
            0x03 => Some(CommandType::Stop),
            0x04 => Some(CommandType::Set),
            0x05 => Some(CommandType::Get),
            0x06 => Some(CommandType::Report),
            _ => None,
        }
    }

    pub fn has_subtype(self) -> bool {
        matches!(self, CommandType::Set | CommandType::Get | CommandType::Report)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandSubtype {
    Samplerate = 0x01,
    SampleCount = 0x02,
    PretrigCount = 0x03,
    PinMode = 0x04,
    Metadata = 0x05,
    SampledData = 0x06,
}

impl CommandSubtype {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(CommandSubtype::Samplerate),
            0x02 => Some(CommandSubtype::SampleCount),
            0x03 => Some(CommandSubtype::PretrigCount),
            0x04 => Some(CommandSubtype::PinMode),
            0x05 => Some(CommandSubtype::Metadata),
            0x06 => Some(CommandSubtype::SampledData),
            _ => None,
        }
    }
}

/// Whether `subtype` is legal for `ty`. Types without a subtype accept
/// anything (the subtype byte is not on the wire for them); `SET` rejects the
/// report-only subtypes.
pub fn subtype_is_valid(ty: CommandType, subtype: CommandSubtype) -> bool {
    if !ty.has_subtype() {
        return true;
    }
    !(ty == CommandType::Set
        && matches!(subtype, CommandSubtype::Metadata | CommandSubtype::SampledData))
}

/// Payload size of a `(type, subtype)` pair, excluding the type and subtype
/// bytes, or `None` if the pair is unsupported. For `REPORT METADATA` this is
/// the fixed header only; the variable name bytes follow it.
pub fn payload_len(ty: CommandType, subtype: CommandSubtype) -> Option<usize> {
    match ty {
        CommandType::Reset | CommandType::Handshake | CommandType::Start | CommandType::Stop => {
            Some(0)
        }
        CommandType::Set | CommandType::Report => match subtype {
            CommandSubtype::Samplerate
            | CommandSubtype::SampleCount
            | CommandSubtype::PretrigCount
            | CommandSubtype::PinMode => Some(4),
            CommandSubtype::Metadata if ty == CommandType::Report => Some(METADATA_WIRE_SIZE - 2),
            CommandSubtype::SampledData if ty == CommandType::Report => Some(4 + 4),
            _ => None,
        },
        CommandType::Get => match subtype {
            CommandSubtype::PinMode => Some(2),
            _ => Some(0),
        },
    }
}

/// Per-channel sampling configuration. `Invalid` is a reserved sentinel; the
/// legal wire values are 0x01 through 0x07. Carried as 2 bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PinMode {
    Invalid = 0x00,
    DigitalOff = 0x01,
    DigitalOn = 0x02,
    TriggerHigh = 0x03,
    TriggerLow = 0x04,
    TriggerRising = 0x05,
    TriggerFalling = 0x06,
    TriggerBoth = 0x07,
}

impl PinMode {
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0x00 => Some(PinMode::Invalid),
            0x01 => Some(PinMode::DigitalOff),
            0x02 => Some(PinMode::DigitalOn),
            0x03 => Some(PinMode::TriggerHigh),
            0x04 => Some(PinMode::TriggerLow),
            0x05 => Some(PinMode::TriggerRising),
            0x06 => Some(PinMode::TriggerFalling),
            0x07 => Some(PinMode::TriggerBoth),
            _ => None,
        }
    }

    pub fn is_trigger(self) -> bool {
        matches!(
            self,
            PinMode::TriggerHigh
                | PinMode::TriggerLow
                | PinMode::TriggerRising
                | PinMode::TriggerFalling
                | PinMode::TriggerBoth
        )
    }
}

/// Fixed portion of a metadata report. `str_size` is the number of name
/// bytes that follow the header on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataHeader {
    pub str_size: u8,
    pub max_samplerate: u32,
    pub max_sample_count: u32,
    pub num_pins: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampledDataInfo {
    pub sampled_count: u32,
    pub trigger_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetRequest {
    Samplerate(u32),
    SampleCount(u32),
    PretrigCount(u32),
    PinMode { pin: u16, mode: PinMode },
}

impl SetRequest {
    pub fn subtype(&self) -> CommandSubtype {
        match self {
            SetRequest::Samplerate(_) => CommandSubtype::Samplerate,
            SetRequest::SampleCount(_) => CommandSubtype::SampleCount,
            SetRequest::PretrigCount(_) => CommandSubtype::PretrigCount,
            SetRequest::PinMode { .. } => CommandSubtype::PinMode,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetRequest {
    Samplerate,
    SampleCount,
    PretrigCount,
    PinMode { pin: u16 },
    Metadata,
    SampledData,
}

impl GetRequest {
    pub fn subtype(&self) -> CommandSubtype {
        match self {
            GetRequest::Samplerate => CommandSubtype::Samplerate,
            GetRequest::SampleCount => CommandSubtype::SampleCount,
            GetRequest::PretrigCount => CommandSubtype::PretrigCount,
            GetRequest::PinMode { .. } => CommandSubtype::PinMode,
            GetRequest::Metadata => CommandSubtype::Metadata,
            GetRequest::SampledData => CommandSubtype::SampledData,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    Samplerate(u32),
    SampleCount(u32),
    PretrigCount(u32),
    PinMode { pin: u16, mode: PinMode },
    Metadata(MetadataHeader),
    SampledData(SampledDataInfo),
}

impl Report {
    pub fn subtype(&self) -> CommandSubtype {
        match self {
            Report::Samplerate(_) => CommandSubtype::Samplerate,
            Report::SampleCount(_) => CommandSubtype::SampleCount,
            Report::PretrigCount(_) => CommandSubtype::PretrigCount,
            Report::PinMode { .. } => CommandSubtype::PinMode,
            Report::Metadata(_) => CommandSubtype::Metadata,
            Report::SampledData(_) => CommandSubtype::SampledData,
        }
    }
}

/// One protocol frame, indexed by command type first. Invalid
/// `(type, subtype)` pairs are unrepresentable; the payload always matches
/// the subtype it is carried under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reset,
    Handshake,
    Start,
    Stop,
    Set(SetRequest),
    Get(GetRequest),
    Report(Report),
}

impl Command {
    pub fn ty(&self) -> CommandType {
        match self {
            Command::Reset => CommandType::Reset,
            Command::Handshake => CommandType::Handshake,
            Command::Start => CommandType::Start,
            Command::Stop => CommandType::Stop,
            Command::Set(_) => CommandType::Set,
            Command::Get(_) => CommandType::Get,
            Command::Report(_) => CommandType::Report,
        }
    }

    pub fn subtype(&self) -> Option<CommandSubtype> {
        match self {
            Command::Set(req) => Some(req.subtype()),
            Command::Get(req) => Some(req.subtype()),
            Command::Report(rep) => Some(rep.subtype()),
            _ => None,
        }
    }

    /// Total encoded size: type byte, subtype byte where present, payload.
    pub fn encoded_len(&self) -> usize {
        let header = if self.ty().has_subtype() { 2 } else { 1 };
        let payload = match self.subtype() {
            Some(subtype) => payload_len(self.ty(), subtype).unwrap_or(0),
            None => 0,
        };
        header + payload
    }

    /// Serializes the frame at the cursor and returns the new position. The
    /// required size is checked up front; on failure nothing is written.
    pub fn encode(&self, cur: &mut WriteCursor) -> Result<usize, ProtocolError> {
        let needed = self.encoded_len();
        if cur.remaining() < needed {
            return Err(ProtocolError::BufferTooSmall {
                needed,
                available: cur.remaining(),
            });
        }
        cur.write_uint(self.ty() as u64, 1)?;
        if let Some(subtype) = self.subtype() {
            cur.write_uint(subtype as u64, 1)?;
        }
        match *self {
            Command::Reset | Command::Handshake | Command::Start | Command::Stop => {}
            Command::Set(req) => match req {
                SetRequest::Samplerate(value)
                | SetRequest::SampleCount(value)
                | SetRequest::PretrigCount(value) => cur.write_uint(value as u64, 4)?,
                SetRequest::PinMode { pin, mode } => {
                    cur.write_uint(pin as u64, 2)?;
                    cur.write_uint(mode as u64, 2)?;
                }
            },
            Command::Get(req) => {
                if let GetRequest::PinMode { pin } = req {
                    cur.write_uint(pin as u64, 2)?;
                }
            }
            Command::Report(rep) => match rep {
                Report::Samplerate(value)
                | Report::SampleCount(value)
                | Report::PretrigCount(value) => cur.write_uint(value as u64, 4)?,
                Report::PinMode { pin, mode } => {
                    cur.write_uint(pin as u64, 2)?;
                    cur.write_uint(mode as u64, 2)?;
                }
                Report::Metadata(md) => {
                    cur.write_uint(md.str_size as u64, 1)?;
                    cur.write_uint(md.max_samplerate as u64, 4)?;
                    cur.write_uint(md.max_sample_count as u64, 4)?;
                    cur.write_uint(md.num_pins as u64, 2)?;
                }
                Report::SampledData(info) => {
                    cur.write_uint(info.sampled_count as u64, 4)?;
                    cur.write_uint(info.trigger_index as u64, 4)?;
                }
            },
        }
        Ok(cur.position())
    }

    /// Parses one frame at the cursor. Decoding a metadata report stops at
    /// the end of the fixed header; the caller consumes the following
    /// `str_size` name bytes from the transport.
    pub fn decode(cur: &mut ReadCursor) -> Result<Command, ProtocolError> {
        let raw_ty = cur.read_uint(1)? as u8;
        let ty = CommandType::from_raw(raw_ty).ok_or(ProtocolError::UnknownType(raw_ty))?;
        if !ty.has_subtype() {
            return Ok(match ty {
                CommandType::Reset => Command::Reset,
                CommandType::Handshake => Command::Handshake,
                CommandType::Start => Command::Start,
                _ => Command::Stop,
            });
        }

        let raw_subtype = cur.read_uint(1)? as u8;
        let subtype = CommandSubtype::from_raw(raw_subtype)
            .ok_or(ProtocolError::UnknownSubtype(raw_subtype))?;

        let cmd = match ty {
            CommandType::Set => Command::Set(match subtype {
                CommandSubtype::Samplerate => SetRequest::Samplerate(cur.read_uint(4)? as u32),
                CommandSubtype::SampleCount => SetRequest::SampleCount(cur.read_uint(4)? as u32),
                CommandSubtype::PretrigCount => SetRequest::PretrigCount(cur.read_uint(4)? as u32),
                CommandSubtype::PinMode => {
                    let pin = cur.read_uint(2)? as u16;
                    let raw_mode = cur.read_uint(2)? as u16;
                    let mode =
                        PinMode::from_raw(raw_mode).ok_or(ProtocolError::InvalidPinMode(raw_mode))?;
                    SetRequest::PinMode { pin, mode }
                }
                CommandSubtype::Metadata | CommandSubtype::SampledData => {
                    return Err(ProtocolError::InvalidPair { ty, subtype })
                }
            }),
            CommandType::Get => Command::Get(match subtype {
                CommandSubtype::Samplerate => GetRequest::Samplerate,
                CommandSubtype::SampleCount => GetRequest::SampleCount,
                CommandSubtype::PretrigCount => GetRequest::PretrigCount,
                CommandSubtype::PinMode => GetRequest::PinMode {
                    pin: cur.read_uint(2)? as u16,
                },
                CommandSubtype::Metadata => GetRequest::Metadata,
                CommandSubtype::SampledData => GetRequest::SampledData,
            }),
            _ => Command::Report(match subtype {
                CommandSubtype::Samplerate => Report::Samplerate(cur.read_uint(4)? as u32),
                CommandSubtype::SampleCount => Report::SampleCount(cur.read_uint(4)? as u32),
                CommandSubtype::PretrigCount => Report::PretrigCount(cur.read_uint(4)? as u32),
                CommandSubtype::PinMode => {
                    let pin = cur.read_uint(2)? as u16;
                    let raw_mode = cur.read_uint(2)? as u16;
                    let mode =
                        PinMode::from_raw(raw_mode).ok_or(ProtocolError::InvalidPinMode(raw_mode))?;
                    Report::PinMode { pin, mode }
                }
                CommandSubtype::Metadata => Report::Metadata(MetadataHeader {
                    str_size: cur.read_uint(1)? as u8,
                    max_samplerate: cur.read_uint(4)? as u32,
                    max_sample_count: cur.read_uint(4)? as u32,
                    num_pins: cur.read_uint(2)? as u16,
                }),
                CommandSubtype::SampledData => Report::SampledData(SampledDataInfo {
                    sampled_count: cur.read_uint(4)? as u32,
                    trigger_index: cur.read_uint(4)? as u32,
                }),
            }),
        };
        Ok(cmd)
    }
}
