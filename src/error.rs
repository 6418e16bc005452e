use ela_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("unexpected frame from the device: {0}")]
    UnexpectedFrame(&'static str),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport5::Error),

    #[error("serial I/O error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("timed out waiting for {0} bytes from the device")]
    Timeout(usize),

    #[error("could not allocate a {0}-byte sample buffer")]
    Resource(usize),

    #[error("not supported in this context")]
    NotApplicable,
}
