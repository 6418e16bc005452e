use ela_protocol::PinMode;

use crate::serial::LineParams;

/// Upper bound on the number of inputs the driver will configure, regardless
/// of how many pins the device reports.
pub const MAX_NUMBER_OF_INPUTS: usize = 16;

/// Channels are numbered 0-31 on the PCB silkscreen.
pub const CHANNEL_NAMES: [&str; 32] = [
    "D0", "D1", "D2", "D3", "D4", "D5", "D6", "D7", "D8", "D9", "D10", "D11", "D12", "D13", "D14",
    "D15", "D16", "D17", "D18", "D19", "D20", "D21", "D22", "D23", "D24", "D25", "D26", "D27",
    "D28", "D29", "D30", "D31",
];

/// Resolves a channel label like `D3` (or a bare index) to its index.
pub fn channel_index(name: &str) -> Option<usize> {
    let digits = name.strip_prefix(['D', 'd']).unwrap_or(name);
    let index: usize = digits.parse().ok()?;
    if index < CHANNEL_NAMES.len() {
        Some(index)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub index: usize,
    pub name: &'static str,
    pub enabled: bool,
}

/// What the device reported about itself during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub version: &'static str,
    pub max_channels: u16,
    pub max_samples: u32,
    pub max_samplerate: u32,
}

/// One discovered analyzer plus the driver-owned acquisition settings.
#[derive(Debug)]
pub struct Device {
    pub conn: String,
    pub line: LineParams,
    pub info: DeviceInfo,

    pub cur_samplerate: u64,
    pub limit_samples: u64,
    pub capture_ratio: u64,

    pub channels: Vec<Channel>,
    pub pin_modes: [PinMode; MAX_NUMBER_OF_INPUTS],
    pub num_of_triggers: u32,
}

impl Device {
    pub fn new(conn: String, line: LineParams, info: DeviceInfo) -> Self {
        let channel_count = (info.max_channels as usize).min(MAX_NUMBER_OF_INPUTS);
        let channels = (0..channel_count)
            .map(|index| Channel {
                index,
                name: CHANNEL_NAMES[index],
                enabled: true,
            })
            .collect();
        Device {
            conn,
            line,
            info,
            cur_samplerate: crate::config::DEFAULT_SAMPLERATE,
            limit_samples: crate::config::DEFAULT_SAMPLE_COUNT,
            capture_ratio: crate::config::DEFAULT_CAPTURE_RATIO,
            channels,
            pin_modes: [PinMode::DigitalOn; MAX_NUMBER_OF_INPUTS],
            num_of_triggers: 0,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of samples to retain from before the trigger event.
    pub fn pretrig_count(&self) -> u32 {
        (self.limit_samples * self.capture_ratio / 100) as u32
    }
}
