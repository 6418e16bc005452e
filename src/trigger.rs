use ela_protocol::PinMode;

use crate::device::{channel_index, Device};
use crate::error::DriverError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMatch {
    Rising,
    Falling,
    Edge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMatch {
    pub channel: usize,
    pub match_kind: TriggerMatch,
}

/// The host-side trigger description: which channels participate and on what
/// condition each one fires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerSpec {
    pub matches: Vec<ChannelMatch>,
}

impl TriggerSpec {
    /// Parses `D3=rising` style arguments, one channel match per argument.
    pub fn parse_args(args: &[String]) -> Result<Self, DriverError> {
        let mut matches = Vec::with_capacity(args.len());
        for arg in args {
            let (name, kind) = arg.split_once('=').ok_or_else(|| {
                DriverError::Argument(format!(
                    "trigger \"{arg}\" is not of the form CHANNEL=CONDITION"
                ))
            })?;
            let channel = channel_index(name).ok_or_else(|| {
                DriverError::Argument(format!("unknown trigger channel \"{name}\""))
            })?;
            let match_kind = match kind.to_ascii_lowercase().as_str() {
                "rising" | "r" => TriggerMatch::Rising,
                "falling" | "f" => TriggerMatch::Falling,
                "edge" | "e" => TriggerMatch::Edge,
                _ => {
                    return Err(DriverError::Argument(format!(
                        "unknown trigger condition \"{kind}\" (expected rising, falling or edge)"
                    )))
                }
            };
            matches.push(ChannelMatch {
                channel,
                match_kind,
            });
        }
        Ok(TriggerSpec { matches })
    }
}

/// Derives the per-pin modes from the channel enable flags and the trigger
/// description, and counts the participating triggers. A channel the user
/// has disabled stays off even when the trigger description mentions it.
pub fn apply_trigger(device: &mut Device, trigger: Option<&TriggerSpec>) -> Result<(), DriverError> {
    for channel in &device.channels {
        device.pin_modes[channel.index] = if channel.enabled {
            PinMode::DigitalOn
        } else {
            PinMode::DigitalOff
        };
    }
    device.num_of_triggers = 0;

    let Some(trigger) = trigger else {
        return Ok(());
    };

    for m in &trigger.matches {
        let channel = device.channels.get(m.channel).ok_or_else(|| {
            DriverError::Argument(format!(
                "trigger channel D{} does not exist on this device",
                m.channel
            ))
        })?;
        if !channel.enabled {
            device.pin_modes[m.channel] = PinMode::DigitalOff;
            continue;
        }
        device.pin_modes[m.channel] = match m.match_kind {
            TriggerMatch::Edge => PinMode::TriggerBoth,
            TriggerMatch::Rising => PinMode::TriggerRising,
            TriggerMatch::Falling => PinMode::TriggerFalling,
        };
        device.num_of_triggers += 1;
    }
    Ok(())
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
    fn parses_trigger_arguments() {
        let spec = TriggerSpec::parse_args(&[
            "D3=rising".to_string(),
            "d5=FALLING".to_string(),
            "2=edge".to_string(),
        ])
        .unwrap();
        assert_eq!(
            spec.matches,
            vec![
                ChannelMatch {
                    channel: 3,
                    match_kind: TriggerMatch::Rising
                },
                ChannelMatch {
                    channel: 5,
                    match_kind: TriggerMatch::Falling
                },
                ChannelMatch {
                    channel: 2,
                    match_kind: TriggerMatch::Edge
                },
            ]
        );

        assert!(TriggerSpec::parse_args(&["D3".to_string()]).is_err());
        assert!(TriggerSpec::parse_args(&["D3=high".to_string()]).is_err());
        assert!(TriggerSpec::parse_args(&["D99=rising".to_string()]).is_err());
    }

    #[test]
    fn enabled_channels_default_to_digital_on() {
        let mut device = test_device();
        device.channels[6].enabled = false;
        apply_trigger(&mut device, None).unwrap();
        assert_eq!(device.pin_modes[0], PinMode::DigitalOn);
        assert_eq!(device.pin_modes[6], PinMode::DigitalOff);
        assert_eq!(device.num_of_triggers, 0);
    }

    #[test]
    fn trigger_matches_map_to_pin_modes() {
        let mut device = test_device();
        let spec = TriggerSpec::parse_args(&[
            "D1=rising".to_string(),
            "D2=falling".to_string(),
            "D3=edge".to_string(),
        ])
        .unwrap();
        apply_trigger(&mut device, Some(&spec)).unwrap();
        assert_eq!(device.pin_modes[1], PinMode::TriggerRising);
        assert_eq!(device.pin_modes[2], PinMode::TriggerFalling);
        assert_eq!(device.pin_modes[3], PinMode::TriggerBoth);
        assert_eq!(device.pin_modes[0], PinMode::DigitalOn);
        assert_eq!(device.num_of_triggers, 3);
    }

    #[test]
    fn disabled_channel_overrides_its_trigger() {
        let mut device = test_device();
        device.channels[4].enabled = false;
        let spec = TriggerSpec::parse_args(&["D4=rising".to_string()]).unwrap();
        apply_trigger(&mut device, Some(&spec)).unwrap();
        assert_eq!(device.pin_modes[4], PinMode::DigitalOff);
        assert_eq!(device.num_of_triggers, 0);
    }

    #[test]
    fn trigger_on_missing_channel_is_an_error() {
        let mut device = test_device();
        let spec = TriggerSpec {
            matches: vec![ChannelMatch {
                channel: 12,
                match_kind: TriggerMatch::Rising,
            }],
        };
        assert!(apply_trigger(&mut device, Some(&spec)).is_err());
    }
}
