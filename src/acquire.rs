use std::mem;
use std::time::Duration;

use ela_protocol::{Command, ReadCursor, Report, SampledDataInfo, SAMPLED_INFO_WIRE_SIZE};
use log::{debug, warn};

use crate::driver;
use crate::error::DriverError;
use crate::serial::SerialLink;
use crate::session::{poll_readiness, Datafeed, Readiness, Source};

/// Receive progress of one acquisition. Each state owns exactly the data it
/// needs, so an aborted capture drops its sample buffer with the state.
enum ReceiveState {
    /// Nothing from the device yet.
    Waiting,
    /// Collecting the sampled-data info frame, one byte per dispatch.
    ReceivingInfo {
        buf: [u8; SAMPLED_INFO_WIRE_SIZE],
        filled: usize,
    },
    /// Collecting the raw sample bytes announced by the info frame.
    ReceivingData {
        info: SampledDataInfo,
        samples: Vec<u8>,
        filled: usize,
    },
    /// All samples are in; emit and shut down.
    Finish {
        info: SampledDataInfo,
        samples: Vec<u8>,
    },
}

impl ReceiveState {
    #[cfg(test)]
    fn label(&self) -> &'static str {
        match self {
            ReceiveState::Waiting => "waiting",
            ReceiveState::ReceivingInfo { .. } => "receiving_info",
            ReceiveState::ReceivingData { .. } => "receiving_data",
            ReceiveState::Finish { .. } => "finish",
        }
    }
}

/// The receive half of a running acquisition: owns the serial link and the
/// state machine driven by the session's event loop. One `SAMPLED_DATA`
/// report is expected per `START`.
pub struct Acquisition {
    link: Box<dyn SerialLink>,
    state: ReceiveState,
    num_of_triggers: u32,
}

impl Acquisition {
    pub fn new(link: Box<dyn SerialLink>, num_of_triggers: u32) -> Self {
        Acquisition {
            link,
            state: ReceiveState::Waiting,
            num_of_triggers,
        }
    }

    #[cfg(test)]
    pub fn state_label(&self) -> &'static str {
        self.state.label()
    }

    fn read_one_byte(&mut self) -> Result<u8, DriverError> {
        let mut byte = [0u8; 1];
        match self.link.read_nonblocking(&mut byte)? {
            1 => Ok(byte[0]),
            _ => Err(DriverError::Timeout(1)),
        }
    }

    /// One transition. Returns the next state, or `None` when the source is
    /// done and wants to be removed.
    fn step(
        &mut self,
        state: ReceiveState,
        revents: Readiness,
        feed: &mut dyn Datafeed,
    ) -> Option<ReceiveState> {
        match state {
            ReceiveState::Waiting => {
                if revents != Readiness::In {
                    return Some(ReceiveState::Waiting);
                }
                let mut buf = [0u8; SAMPLED_INFO_WIRE_SIZE];
                match self.read_one_byte() {
                    Ok(byte) => {
                        buf[0] = byte;
                        Some(ReceiveState::ReceivingInfo { buf, filled: 1 })
                    }
                    Err(err) => {
                        debug!("error receiving sampled-data info: {err}");
                        self.abort(feed)
                    }
                }
            }
            ReceiveState::ReceivingInfo { mut buf, filled } => {
                if revents != Readiness::In {
                    debug!("timeout while receiving sampled-data info");
                    return self.abort(feed);
                }
                let byte = match self.read_one_byte() {
                    Ok(byte) => byte,
                    Err(err) => {
                        debug!("error receiving sampled-data info: {err}");
                        return self.abort(feed);
                    }
                };
                buf[filled] = byte;
                let filled = filled + 1;
                if filled < SAMPLED_INFO_WIRE_SIZE {
                    return Some(ReceiveState::ReceivingInfo { buf, filled });
                }

                let mut cur = ReadCursor::new(&buf);
                let info = match Command::decode(&mut cur) {
                    Ok(Command::Report(Report::SampledData(info))) => info,
                    Ok(cmd) => {
                        warn!("expected a sampled-data report, got {:?}", cmd.ty());
                        return self.abort(feed);
                    }
                    Err(err) => {
                        warn!("could not decode the sampled-data info frame: {err}");
                        return self.abort(feed);
                    }
                };
                if info.trigger_index > info.sampled_count {
                    warn!(
                        "trigger index {} is beyond the {} announced samples",
                        info.trigger_index, info.sampled_count
                    );
                    return self.abort(feed);
                }
                debug!(
                    "sampled-data info: {} samples, trigger index {}",
                    info.sampled_count, info.trigger_index
                );

                let count = info.sampled_count as usize;
                let mut samples = Vec::new();
                if samples.try_reserve_exact(count).is_err() {
                    warn!("{}", DriverError::Resource(count));
                    return self.abort(feed);
                }
                samples.resize(count, 0);
                if count == 0 {
                    return Some(ReceiveState::Finish { info, samples });
                }
                Some(ReceiveState::ReceivingData {
                    info,
                    samples,
                    filled: 0,
                })
            }
            ReceiveState::ReceivingData {
                info,
                mut samples,
                filled,
            } => {
                if revents != Readiness::In {
                    debug!("timeout while receiving sample data at index {filled}");
                    return self.abort(feed);
                }
                let mut byte = [0u8; 1];
                let timeout = self.link.transfer_timeout(1);
                match self.link.read_exact(&mut byte, timeout) {
                    Ok(1) => {}
                    _ => {
                        debug!("sample data badly received at index {filled}");
                        return self.abort(feed);
                    }
                }
                samples[filled] = byte[0];
                let filled = filled + 1;
                if filled < info.sampled_count as usize {
                    Some(ReceiveState::ReceivingData {
                        info,
                        samples,
                        filled,
                    })
                } else {
                    Some(ReceiveState::Finish { info, samples })
                }
            }
            ReceiveState::Finish { .. } => Some(state),
        }
    }

    /// Ends the acquisition on an error path: the host still sees a clean
    /// close. Any partially filled sample buffer was dropped with the state.
    fn abort(&mut self, feed: &mut dyn Datafeed) -> Option<ReceiveState> {
        feed.end();
        None
    }

    /// Emits the capture. With triggers armed the samples are partitioned
    /// around the trigger index; without any, they go out as one packet.
    fn finish(&mut self, info: &SampledDataInfo, samples: &[u8], feed: &mut dyn Datafeed) {
        let count = info.sampled_count as usize;
        let trigger_at = info.trigger_index as usize;
        if self.num_of_triggers > 0 {
            if trigger_at > 0 {
                feed.logic(1, &samples[..trigger_at]);
            }
            feed.trigger();
            if count > trigger_at {
                feed.logic(1, &samples[trigger_at..count]);
            }
        } else {
            feed.logic(1, &samples[..count]);
        }
        if let Err(err) = self.link.discard_input() {
            debug!("could not flush the port: {err}");
        }
        feed.end();
    }
}

impl Source for Acquisition {
    fn poll(&mut self, timeout: Duration) -> Readiness {
        poll_readiness(timeout, || self.link.has_receive_data())
    }

    fn ready(&mut self, revents: Readiness, feed: &mut dyn Datafeed) -> bool {
        let state = mem::replace(&mut self.state, ReceiveState::Waiting);
        match self.step(state, revents, feed) {
            Some(ReceiveState::Finish { info, samples }) => {
                self.finish(&info, &samples, feed);
                false
            }
            Some(next) => {
                self.state = next;
                true
            }
            None => false,
        }
    }

    fn cancel(&mut self, feed: &mut dyn Datafeed) {
        if let Err(err) = driver::send_cmd(self.link.as_mut(), &Command::Stop) {
            debug!("STOP was not delivered: {err}");
        }
        feed.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::mock::MockLink;
    use crate::session::collect::{CollectingFeed, Packet};

    const INFO_N4_T2: &[u8] = &[0x06, 0x06, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x02];

    fn drive(acq: &mut Acquisition, feed: &mut CollectingFeed) -> Vec<&'static str> {
        let mut states = vec![acq.state_label()];
        loop {
            let revents = if acq.link.has_receive_data() {
                Readiness::In
            } else {
                Readiness::None
            };
            let keep = acq.ready(revents, feed);
            states.push(acq.state_label());
            if !keep {
                break;
            }
        }
        states
    }

    #[test]
    fn sampled_data_is_partitioned_around_the_trigger() {
        let mut link = MockLink::new();
        link.queue_read(INFO_N4_T2);
        link.queue_read(&[0xA5, 0x5A, 0xF0, 0x0F]);
        let mut acq = Acquisition::new(Box::new(link), 1);
        let mut feed = CollectingFeed::default();
        drive(&mut acq, &mut feed);

        assert_eq!(
            feed.packets,
            vec![
                Packet::Logic {
                    unitsize: 1,
                    data: vec![0xA5, 0x5A]
                },
                Packet::Trigger,
                Packet::Logic {
                    unitsize: 1,
                    data: vec![0xF0, 0x0F]
                },
                Packet::End,
            ]
        );
    }

    #[test]
    fn states_advance_monotonically() {
        let mut link = MockLink::new();
        link.queue_read(INFO_N4_T2);
        link.queue_read(&[1, 2, 3, 4]);
        let mut acq = Acquisition::new(Box::new(link), 1);
        let mut feed = CollectingFeed::default();
        let states = drive(&mut acq, &mut feed);

        let order = ["waiting", "receiving_info", "receiving_data"];
        let rank = |label: &str| order.iter().position(|&o| o == label);
        let mut last = 0;
        // The final entry is the post-removal placeholder; everything before
        // it must only ever move forward.
        for label in &states[..states.len() - 1] {
            let rank = rank(label).unwrap();
            assert!(rank >= last, "state went backwards: {states:?}");
            last = rank;
        }
        assert_eq!(states[0], "waiting");
        assert!(states.contains(&"receiving_info"));
        assert!(states.contains(&"receiving_data"));
    }

    #[test]
    fn all_logic_bytes_concatenate_to_the_capture() {
        let samples: Vec<u8> = (0..32).collect();
        let info = [
            0x06, 0x06, 0x00, 0x00, 0x00, 32, 0x00, 0x00, 0x00, 13,
        ];
        let mut link = MockLink::new();
        link.queue_read(&info);
        link.queue_read(&samples);
        let mut acq = Acquisition::new(Box::new(link), 2);
        let mut feed = CollectingFeed::default();
        drive(&mut acq, &mut feed);

        let mut emitted = Vec::new();
        let mut trigger_offset = None;
        for packet in &feed.packets {
            match packet {
                Packet::Logic { unitsize, data } => {
                    assert_eq!(*unitsize, 1);
                    emitted.extend_from_slice(data);
                }
                Packet::Trigger => trigger_offset = Some(emitted.len()),
                _ => {}
            }
        }
        assert_eq!(emitted, samples);
        assert_eq!(trigger_offset, Some(13));
    }

    #[test]
    fn zero_trigger_index_omits_the_pretrigger_packet() {
        let mut link = MockLink::new();
        link.queue_read(&[0x06, 0x06, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00]);
        link.queue_read(&[0xAA, 0xBB]);
        let mut acq = Acquisition::new(Box::new(link), 1);
        let mut feed = CollectingFeed::default();
        drive(&mut acq, &mut feed);

        assert_eq!(
            feed.packets,
            vec![
                Packet::Trigger,
                Packet::Logic {
                    unitsize: 1,
                    data: vec![0xAA, 0xBB]
                },
                Packet::End,
            ]
        );
    }

    #[test]
    fn trigger_at_the_last_sample_omits_the_posttrigger_packet() {
        let mut link = MockLink::new();
        link.queue_read(&[0x06, 0x06, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x02]);
        link.queue_read(&[0xAA, 0xBB]);
        let mut acq = Acquisition::new(Box::new(link), 1);
        let mut feed = CollectingFeed::default();
        drive(&mut acq, &mut feed);

        assert_eq!(
            feed.packets,
            vec![
                Packet::Logic {
                    unitsize: 1,
                    data: vec![0xAA, 0xBB]
                },
                Packet::Trigger,
                Packet::End,
            ]
        );
    }

    #[test]
    fn without_triggers_the_capture_is_one_packet() {
        let mut link = MockLink::new();
        link.queue_read(INFO_N4_T2);
        link.queue_read(&[1, 2, 3, 4]);
        let mut acq = Acquisition::new(Box::new(link), 0);
        let mut feed = CollectingFeed::default();
        drive(&mut acq, &mut feed);

        assert_eq!(
            feed.packets,
            vec![
                Packet::Logic {
                    unitsize: 1,
                    data: vec![1, 2, 3, 4]
                },
                Packet::End,
            ]
        );
    }

    #[test]
    fn timeout_during_info_aborts_with_a_clean_close() {
        let mut link = MockLink::new();
        // Only half the info frame ever arrives.
        link.queue_read(&INFO_N4_T2[..5]);
        let mut acq = Acquisition::new(Box::new(link), 0);
        let mut feed = CollectingFeed::default();

        for _ in 0..5 {
            assert!(acq.ready(Readiness::In, &mut feed));
        }
        // The poll interval elapses with nothing readable.
        assert!(!acq.ready(Readiness::None, &mut feed));
        assert_eq!(feed.packets, vec![Packet::End]);
    }

    #[test]
    fn wrong_frame_in_place_of_the_info_report_aborts() {
        // A well-formed SET SAMPLERATE frame (plus padding) where the
        // sampled-data report should be. It decodes fine, but it is not a
        // REPORT SAMPLED_DATA, so the acquisition must not proceed.
        let mut link = MockLink::new();
        link.queue_read(&[0x04, 0x01, 0x00, 0x00, 0x03, 0xE8, 0x00, 0x00, 0x00, 0x00]);
        let mut acq = Acquisition::new(Box::new(link), 0);
        let mut feed = CollectingFeed::default();
        let states = drive(&mut acq, &mut feed);
        assert!(!states.contains(&"receiving_data"));
        assert_eq!(feed.packets, vec![Packet::End]);
    }

    #[test]
    fn undecodable_info_frame_aborts() {
        let mut link = MockLink::new();
        // 0xFF is not a command type.
        link.queue_read(&[0xFF; 10]);
        let mut acq = Acquisition::new(Box::new(link), 0);
        let mut feed = CollectingFeed::default();
        drive(&mut acq, &mut feed);
        assert_eq!(feed.packets, vec![Packet::End]);
    }

    #[test]
    fn trigger_index_beyond_the_sample_count_aborts() {
        let mut link = MockLink::new();
        link.queue_read(&[0x06, 0x06, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x03]);
        let mut acq = Acquisition::new(Box::new(link), 1);
        let mut feed = CollectingFeed::default();
        drive(&mut acq, &mut feed);
        assert_eq!(feed.packets, vec![Packet::End]);
    }

    #[test]
    fn truncated_sample_data_aborts() {
        let mut link = MockLink::new();
        link.queue_read(INFO_N4_T2);
        link.queue_read(&[0xA5, 0x5A]); // two of the four announced bytes
        let mut acq = Acquisition::new(Box::new(link), 1);
        let mut feed = CollectingFeed::default();
        drive(&mut acq, &mut feed);
        assert_eq!(feed.packets, vec![Packet::End]);
    }

    #[test]
    fn cancel_sends_stop_and_closes_the_stream() {
        let link = MockLink::new();
        let writes = link.writes_handle();
        let mut acq = Acquisition::new(Box::new(link), 0);
        let mut feed = CollectingFeed::default();
        acq.cancel(&mut feed);
        assert_eq!(*writes.borrow(), vec![0x03]);
        assert_eq!(feed.packets, vec![Packet::End]);
    }
}
