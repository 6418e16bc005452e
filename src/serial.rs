use std::fmt;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use serialport5::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};

use crate::error::DriverError;

pub const DEFAULT_SERIALCOMM: &str = "115200/8n1";

/// Added on top of the transfer time of every computed timeout, to absorb
/// scheduling latency on both ends of the link.
const TIMEOUT_SLACK_MS: u64 = 100;

/// Serial line parameters in `baud/frame` notation, e.g. `115200/8n1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineParams {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for LineParams {
    fn default() -> Self {
        LineParams {
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl LineParams {
    pub fn parse(s: &str) -> Result<Self, DriverError> {
        let malformed =
            || DriverError::Argument(format!("malformed serial line parameters \"{s}\""));
        let (baud, frame) = s.split_once('/').ok_or_else(malformed)?;
        let baud_rate: u32 = baud.parse().map_err(|_| malformed())?;
        let frame = frame.as_bytes();
        if frame.len() != 3 {
            return Err(malformed());
        }
        let data_bits = match frame[0] {
            b'5' => DataBits::Five,
            b'6' => DataBits::Six,
            b'7' => DataBits::Seven,
            b'8' => DataBits::Eight,
            _ => return Err(malformed()),
        };
        let parity = match frame[1] {
            b'n' => Parity::None,
            b'e' => Parity::Even,
            b'o' => Parity::Odd,
            _ => return Err(malformed()),
        };
        let stop_bits = match frame[2] {
            b'1' => StopBits::One,
            b'2' => StopBits::Two,
            _ => return Err(malformed()),
        };
        Ok(LineParams {
            baud_rate,
            data_bits,
            parity,
            stop_bits,
        })
    }

    /// How long transferring `byte_count` bytes may take on this line,
    /// assuming ten bit times per byte, plus fixed slack.
    pub fn transfer_timeout(&self, byte_count: usize) -> Duration {
        let millis = (byte_count as u64 * 10 * 1000).div_ceil(self.baud_rate as u64);
        Duration::from_millis(millis + TIMEOUT_SLACK_MS)
    }
}

impl fmt::Display for LineParams {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let data = match self.data_bits {
            DataBits::Five => '5',
            DataBits::Six => '6',
            DataBits::Seven => '7',
            DataBits::Eight => '8',
        };
        let parity = match self.parity {
            Parity::None => 'n',
            Parity::Even => 'e',
            Parity::Odd => 'o',
        };
        let stop = match self.stop_bits {
            StopBits::One => '1',
            StopBits::Two => '2',
        };
        write!(f, "{}/{}{}{}", self.baud_rate, data, parity, stop)
    }
}

/// What the session controller needs from a serial byte stream. The real
/// implementation wraps a serial port; tests substitute a scripted link.
pub trait SerialLink {
    /// Blocking write of the whole buffer, bounded by `timeout`. Returns the
    /// number of bytes written.
    fn write_all(&mut self, bytes: &[u8], timeout: Duration) -> Result<usize, DriverError>;

    /// Blocking read of exactly `buf.len()` bytes, bounded by `timeout`.
    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, DriverError>;

    /// Reads whatever is immediately available, never blocking.
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> Result<usize, DriverError>;

    /// Whether at least one byte is waiting in the receive buffer.
    fn has_receive_data(&mut self) -> bool;

    /// Waits until everything written has left the transmit buffer.
    fn drain(&mut self) -> Result<(), DriverError>;

    /// Throws away anything waiting in the receive buffer.
    fn discard_input(&mut self) -> Result<(), DriverError>;

    /// Timeout appropriate for transferring `byte_count` bytes on this link.
    fn transfer_timeout(&self, byte_count: usize) -> Duration;
}

pub struct SerialPortLink {
    port: SerialPort,
    params: LineParams,
}

impl SerialPortLink {
    pub fn open(path: &str, params: LineParams) -> Result<Self, DriverError> {
        let port = SerialPort::builder()
            .baud_rate(params.baud_rate)
            .data_bits(params.data_bits)
            .parity(params.parity)
            .stop_bits(params.stop_bits)
            .read_timeout(Some(params.transfer_timeout(1)))
            .open(PathBuf::from(path))?;
        Ok(SerialPortLink { port, params })
    }
}

impl SerialLink for SerialPortLink {
    fn write_all(&mut self, bytes: &[u8], timeout: Duration) -> Result<usize, DriverError> {
        self.port.set_write_timeout(Some(timeout))?;
        self.port.write_all(bytes)?;
        Ok(bytes.len())
    }

    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, DriverError> {
        self.port.set_read_timeout(Some(timeout))?;
        match self.port.read_exact(buf) {
            Ok(()) => Ok(buf.len()),
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::UnexpectedEof
                ) =>
            {
                Err(DriverError::Timeout(buf.len()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn read_nonblocking(&mut self, buf: &mut [u8]) -> Result<usize, DriverError> {
        let available = self.port.bytes_to_read()? as usize;
        if available == 0 {
            return Ok(0);
        }
        self.port.set_read_timeout(Some(Duration::from_millis(1)))?;
        let want = buf.len().min(available);
        let read = self.port.read(&mut buf[..want])?;
        Ok(read)
    }

    fn has_receive_data(&mut self) -> bool {
        self.port.bytes_to_read().map(|n| n > 0).unwrap_or(false)
    }

    fn drain(&mut self) -> Result<(), DriverError> {
        self.port.flush()?;
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), DriverError> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn transfer_timeout(&self, byte_count: usize) -> Duration {
        self.params.transfer_timeout(byte_count)
    }
}
