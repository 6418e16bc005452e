use std::thread;
use std::time::Duration;

use ela_protocol::{
    Command, GetRequest, MetadataHeader, ProtocolError, ReadCursor, Report, SetRequest,
    WriteCursor, HANDSHAKE_REPLY, MAX_FRAME_SIZE, METADATA_WIRE_SIZE, NAME_MAX_LEN,
};
use log::{debug, info, warn};

use crate::acquire::Acquisition;
use crate::device::{Device, DeviceInfo};
use crate::error::DriverError;
use crate::serial::{LineParams, SerialLink, SerialPortLink};
use crate::session::{Datafeed, Session};

/// How long the device gets to put a reply on the wire before we look for it.
pub const RESPONSE_DELAY: Duration = Duration::from_micros(20_000);

/// Poll interval of the receive source while an acquisition is running.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct ScanOptions {
    /// Serial port path.
    pub conn: String,
    /// Line parameters in `baud/frame` notation; 115200/8n1 if absent.
    pub serialcomm: Option<String>,
}

/// Encodes `cmd` and pushes it down the link, waiting for the transmit
/// buffer to drain.
pub fn send_cmd(link: &mut dyn SerialLink, cmd: &Command) -> Result<(), DriverError> {
    let mut buf = [0u8; MAX_FRAME_SIZE];
    let mut cur = WriteCursor::new(&mut buf);
    let len = cmd.encode(&mut cur)?;
    debug!("sending {:?} frame ({len} bytes)", cmd.ty());
    let timeout = link.transfer_timeout(len);
    let written = link.write_all(&buf[..len], timeout)?;
    if written != len {
        return Err(DriverError::Timeout(len));
    }
    link.drain()?;
    Ok(())
}

/// Sends `RESET` five times. The device could be in the middle of parsing a
/// multi-byte command, so up to four stray bytes must be absorbed before a
/// reset is guaranteed to land on a command boundary.
pub fn send_reset(link: &mut dyn SerialLink) -> Result<(), DriverError> {
    for _ in 0..5 {
        send_cmd(link, &Command::Reset)?;
    }
    Ok(())
}

/// Pushes the configured mode of every channel, one `SET PIN_MODE` frame per
/// pin.
pub fn send_pinmodes(link: &mut dyn SerialLink, device: &Device) -> Result<(), DriverError> {
    for channel in &device.channels {
        send_cmd(
            link,
            &Command::Set(SetRequest::PinMode {
                pin: channel.index as u16,
                mode: device.pin_modes[channel.index],
            }),
        )?;
    }
    Ok(())
}

/// Reads the fixed metadata header and then the device name that follows it.
pub fn receive_metadata(
    link: &mut dyn SerialLink,
) -> Result<(MetadataHeader, String), DriverError> {
    let mut buf = [0u8; METADATA_WIRE_SIZE];
    let timeout = link.transfer_timeout(buf.len());
    link.read_exact(&mut buf, timeout)?;
    let mut cur = ReadCursor::new(&buf);
    let header = match Command::decode(&mut cur)? {
        Command::Report(Report::Metadata(header)) => header,
        _ => return Err(DriverError::UnexpectedFrame("expected a metadata report")),
    };
    if header.str_size as usize > NAME_MAX_LEN {
        return Err(ProtocolError::NameTooLong(NAME_MAX_LEN).into());
    }

    let mut name_bytes = vec![0u8; header.str_size as usize];
    if !name_bytes.is_empty() {
        let timeout = link.transfer_timeout(name_bytes.len());
        link.read_exact(&mut name_bytes, timeout)?;
    }
    let end = name_bytes
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(name_bytes.len());
    let name = String::from_utf8_lossy(&name_bytes[..end]).into_owned();
    Ok((header, name))
}

/// The discovery handshake. Returns `None` when whatever is on the other end
/// of the link does not identify as an ELAP analyzer.
pub fn probe(link: &mut dyn SerialLink) -> Result<Option<DeviceInfo>, DriverError> {
    send_reset(link)?;
    send_cmd(link, &Command::Handshake)?;
    thread::sleep(RESPONSE_DELAY);

    if !link.has_receive_data() {
        debug!("no reply to the handshake");
        return Ok(None);
    }

    let mut reply = [0u8; HANDSHAKE_REPLY.len()];
    let timeout = link.transfer_timeout(reply.len());
    link.read_exact(&mut reply, timeout)?;
    if reply != *HANDSHAKE_REPLY {
        warn!("unexpected handshake reply {reply:02x?}");
        return Ok(None);
    }

    send_cmd(link, &Command::Get(GetRequest::Metadata))?;
    thread::sleep(RESPONSE_DELAY);
    let (header, name) = receive_metadata(link)?;
    debug!(
        "metadata: \"{name}\", {} pins, {} Hz, {} samples",
        header.num_pins, header.max_samplerate, header.max_sample_count
    );
    Ok(Some(DeviceInfo {
        name,
        version: "v1.0",
        max_channels: header.num_pins,
        max_samples: header.max_sample_count,
        max_samplerate: header.max_samplerate,
    }))
}

/// Probes the port named in `options`. Probe failures other than an
/// unopenable port report "no device" rather than an error; the port is
/// closed again either way.
pub fn scan(options: &ScanOptions) -> Result<Option<Device>, DriverError> {
    let line = match &options.serialcomm {
        Some(s) => LineParams::parse(s)?,
        None => LineParams::default(),
    };
    info!("probing {} ({line})", options.conn);
    let mut link = SerialPortLink::open(&options.conn, line)?;
    let info = match probe(&mut link) {
        Ok(Some(info)) => info,
        Ok(None) => return Ok(None),
        Err(err) => {
            warn!("probe of {} failed: {err}", options.conn);
            return Ok(None);
        }
    };
    drop(link);
    info!(
        "found \"{}\" on {}: {} channels, max {} Hz, max {} samples",
        info.name, options.conn, info.max_channels, info.max_samplerate, info.max_samples
    );
    Ok(Some(Device::new(options.conn.clone(), line, info)))
}

/// Pushes the acquisition configuration, starts the capture and installs the
/// receive source. The link stays owned by the source until the acquisition
/// ends.
pub fn acquisition_start(
    device: &Device,
    mut link: Box<dyn SerialLink>,
    session: &mut Session,
    feed: &mut dyn Datafeed,
) -> Result<(), DriverError> {
    send_cmd(
        link.as_mut(),
        &Command::Set(SetRequest::Samplerate(device.cur_samplerate as u32)),
    )?;
    send_cmd(
        link.as_mut(),
        &Command::Set(SetRequest::SampleCount(device.limit_samples as u32)),
    )?;
    send_cmd(
        link.as_mut(),
        &Command::Set(SetRequest::PretrigCount(device.pretrig_count())),
    )?;
    send_pinmodes(link.as_mut(), device)?;
    send_cmd(link.as_mut(), &Command::Start)?;

    feed.header();
    session.register_source(
        Box::new(Acquisition::new(link, device.num_of_triggers)),
        POLL_INTERVAL,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::mock::MockLink;

    // type=REPORT, subtype=METADATA, str_size=4, max_sr=1000, max_sc=5000,
    // pins=8, name="dev\0"
    const METADATA_REPLY: &[u8] = &[
        0x06, 0x05, 0x04, 0x00, 0x00, 0x03, 0xE8, 0x00, 0x00, 0x13, 0x88, 0x00, 0x08, 0x64, 0x65,
        0x76, 0x00,
    ];

    #[test]
    fn probe_discovers_a_device() {
        let mut link = MockLink::new();
        link.queue_read(HANDSHAKE_REPLY);
        link.queue_read(METADATA_REPLY);

        let info = probe(&mut link).unwrap().unwrap();
        assert_eq!(info.name, "dev");
        assert_eq!(info.version, "v1.0");
        assert_eq!(info.max_channels, 8);
        assert_eq!(info.max_samplerate, 1000);
        assert_eq!(info.max_samples, 5000);

        // Five resets to land on a command boundary, the handshake, then the
        // metadata query.
        assert_eq!(
            *link.writes.borrow(),
            vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x05, 0x05]
        );
    }

    #[test]
    fn probe_abandons_a_silent_port() {
        let mut link = MockLink::new();
        assert_eq!(probe(&mut link).unwrap(), None);
    }

    #[test]
    fn probe_abandons_on_a_bad_handshake_reply() {
        let mut link = MockLink::new();
        link.queue_read(b"OLSV1\0\0");
        assert_eq!(probe(&mut link).unwrap(), None);
    }

    #[test]
    fn receive_metadata_rejects_a_wrong_frame() {
        let mut link = MockLink::new();
        // A samplerate report where the metadata report should be. Pad to
        // the fixed header size so the read itself succeeds.
        link.queue_read(&[0x06, 0x01, 0x00, 0x00, 0x03, 0xE8]);
        link.queue_read(&[0u8; 7]);
        assert!(receive_metadata(&mut link).is_err());
    }

    #[test]
    fn receive_metadata_rejects_an_oversized_name() {
        let mut link = MockLink::new();
        let mut frame = METADATA_REPLY[..METADATA_WIRE_SIZE].to_vec();
        frame[2] = 30; // str_size beyond NAME_MAX_LEN
        link.queue_read(&frame);
        assert!(receive_metadata(&mut link).is_err());
    }

    #[test]
    fn acquisition_start_pushes_the_configuration_in_order() {
        use crate::config::ConfigKey;
        use crate::session::collect::{CollectingFeed, Packet};

        let mut device = Device::new(
            "/dev/ttyACM0".to_string(),
            LineParams::default(),
            DeviceInfo {
                name: "dev".to_string(),
                version: "v1.0",
                max_channels: 2,
                max_samples: 100_000,
                max_samplerate: 1_000_000,
            },
        );
        device.config_set(ConfigKey::Samplerate, 1000).unwrap();
        device.config_set(ConfigKey::LimitSamples, 1000).unwrap();
        device.config_set(ConfigKey::CaptureRatio, 25).unwrap();

        let link = MockLink::new();
        let writes = link.writes_handle();
        let mut session = Session::new();
        let mut feed = CollectingFeed::default();
        acquisition_start(&device, Box::new(link), &mut session, &mut feed).unwrap();

        assert!(session.has_source());
        assert_eq!(feed.packets, vec![Packet::Header]);
        assert_eq!(
            *writes.borrow(),
            vec![
                0x04, 0x01, 0x00, 0x00, 0x03, 0xE8, // SET SAMPLERATE 1000
                0x04, 0x02, 0x00, 0x00, 0x03, 0xE8, // SET SAMPLE_COUNT 1000
                0x04, 0x03, 0x00, 0x00, 0x00, 0xFA, // SET PRETRIG_COUNT 250
                0x04, 0x04, 0x00, 0x00, 0x00, 0x02, // SET PIN_MODE D0 on
                0x04, 0x04, 0x00, 0x01, 0x00, 0x02, // SET PIN_MODE D1 on
                0x02, // START
            ]
        );
    }
}
