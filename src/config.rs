use crate::device::Device;
use crate::error::DriverError;
use crate::trigger::TriggerMatch;

pub const MIN_NUM_SAMPLES: u64 = 10;
pub const MIN_SAMPLERATE: u64 = 100;
pub const DEFAULT_SAMPLERATE: u64 = 200_000;
pub const DEFAULT_SAMPLE_COUNT: u64 = 5000;
pub const DEFAULT_CAPTURE_RATIO: u64 = 10;

/// Sample rates the firmware is known to support, in Hz.
pub const SAMPLERATES: [u64; 18] = [
    100,
    200,
    500,
    1_000,
    2_000,
    5_000,
    10_000,
    20_000,
    50_000,
    100_000,
    200_000,
    500_000,
    1_000_000,
    2_000_000,
    4_000_000,
    6_000_000,
    9_000_000,
    12_000_000,
];

pub const TRIGGER_MATCHES: [TriggerMatch; 3] =
    [TriggerMatch::Rising, TriggerMatch::Falling, TriggerMatch::Edge];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    Samplerate,
    LimitSamples,
    CaptureRatio,
}

impl Device {
    pub fn config_get(&self, key: ConfigKey) -> Result<u64, DriverError> {
        match key {
            ConfigKey::Samplerate => Ok(self.cur_samplerate),
            ConfigKey::LimitSamples => Ok(self.limit_samples),
            ConfigKey::CaptureRatio => Ok(self.capture_ratio),
        }
    }

    pub fn config_set(&mut self, key: ConfigKey, value: u64) -> Result<(), DriverError> {
        match key {
            ConfigKey::Samplerate => {
                if value < MIN_SAMPLERATE || value > self.info.max_samplerate as u64 {
                    return Err(DriverError::Argument(format!(
                        "sample rate {value} Hz is outside {MIN_SAMPLERATE}-{} Hz",
                        self.info.max_samplerate
                    )));
                }
                self.cur_samplerate = value;
            }
            ConfigKey::LimitSamples => {
                if value < MIN_NUM_SAMPLES || value > self.info.max_samples as u64 {
                    return Err(DriverError::Argument(format!(
                        "sample count {value} is outside {MIN_NUM_SAMPLES}-{}",
                        self.info.max_samples
                    )));
                }
                self.limit_samples = value;
            }
            ConfigKey::CaptureRatio => {
                if value > 100 {
                    return Err(DriverError::Argument(format!(
                        "capture ratio {value} is not a percentage"
                    )));
                }
                self.capture_ratio = value;
            }
        }
        Ok(())
    }

    /// The supported sample rates, clipped to what this device can do.
    pub fn samplerate_list(&self) -> Result<Vec<u64>, DriverError> {
        if self.info.max_samplerate == 0 {
            return Err(DriverError::NotApplicable);
        }
        Ok(SAMPLERATES
            .iter()
            .copied()
            .filter(|&rate| rate <= self.info.max_samplerate as u64)
            .collect())
    }

    pub fn limit_samples_range(&self) -> Result<(u64, u64), DriverError> {
        if self.info.max_samples == 0 {
            return Err(DriverError::NotApplicable);
        }
        Ok((MIN_NUM_SAMPLES, self.info.max_samples as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceInfo;
    use crate::serial::LineParams;

    fn test_device() -> Device {
        Device::new(
            "/dev/ttyACM0".to_string(),
            LineParams::default(),
            DeviceInfo {
                name: "dev".to_string(),
                version: "v1.0",
                max_channels: 8,
                max_samples: 100_000,
                max_samplerate: 1_000_000,
            },
        )
    }

    #[test]
    fn defaults_are_applied() {
        let device = test_device();
        assert_eq!(device.config_get(ConfigKey::Samplerate).unwrap(), 200_000);
        assert_eq!(device.config_get(ConfigKey::LimitSamples).unwrap(), 5000);
        assert_eq!(device.config_get(ConfigKey::CaptureRatio).unwrap(), 10);
    }

    #[test]
    fn config_set_validates_ranges() {
        let mut device = test_device();
        assert!(device.config_set(ConfigKey::Samplerate, 99).is_err());
        assert!(device.config_set(ConfigKey::Samplerate, 1_000_001).is_err());
        device.config_set(ConfigKey::Samplerate, 500_000).unwrap();
        assert_eq!(device.cur_samplerate, 500_000);

        assert!(device.config_set(ConfigKey::LimitSamples, 9).is_err());
        assert!(device.config_set(ConfigKey::LimitSamples, 100_001).is_err());
        device.config_set(ConfigKey::LimitSamples, 10_000).unwrap();

        assert!(device.config_set(ConfigKey::CaptureRatio, 101).is_err());
        device.config_set(ConfigKey::CaptureRatio, 100).unwrap();
    }

    #[test]
    fn pretrig_count_is_the_floored_percentage() {
        let mut device = test_device();
        device.config_set(ConfigKey::LimitSamples, 10_000).unwrap();
        device.config_set(ConfigKey::CaptureRatio, 25).unwrap();
        assert_eq!(device.pretrig_count(), 2500);

        for (limit, ratio, expected) in [
            (5000u64, 0u64, 0u32),
            (5000, 10, 500),
            (5000, 50, 2500),
            (5000, 100, 5000),
            (333, 10, 33),
            (99, 50, 49),
        ] {
            device.config_set(ConfigKey::LimitSamples, limit).unwrap();
            device.config_set(ConfigKey::CaptureRatio, ratio).unwrap();
            assert_eq!(device.pretrig_count(), expected, "{limit} at {ratio}%");
            assert!(device.pretrig_count() as u64 <= limit);
        }
    }

    #[test]
    fn samplerate_list_is_clipped_to_device_maximum() {
        let device = test_device();
        let rates = device.samplerate_list().unwrap();
        assert_eq!(rates.first(), Some(&100));
        assert_eq!(rates.last(), Some(&1_000_000));
        assert!(rates.iter().all(|&r| r <= 1_000_000));
        assert_eq!(device.limit_samples_range().unwrap(), (10, 100_000));
    }
}
