use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

/// Ready-events mask handed to a registered source callback. `In` means the
/// link has receive data waiting; `None` means the poll interval elapsed
/// without any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    None,
    In,
}

/// Where acquired data goes: the packets of one capture session, in order.
/// One header, zero or more logic packets, optionally a trigger marker, one
/// end marker.
pub trait Datafeed {
    fn header(&mut self);
    fn logic(&mut self, unitsize: usize, data: &[u8]);
    fn trigger(&mut self);
    fn end(&mut self);
}

/// A callback installed in the session's event loop.
///
/// `poll` waits for receive readiness up to the registered poll interval and
/// reports what it saw; `ready` is then invoked with that mask and keeps the
/// source installed by returning `true`. `cancel` is called when the user
/// stops the acquisition while the source is still installed.
pub trait Source {
    fn poll(&mut self, timeout: Duration) -> Readiness;
    fn ready(&mut self, revents: Readiness, feed: &mut dyn Datafeed) -> bool;
    fn cancel(&mut self, feed: &mut dyn Datafeed);
}

/// A capture session: at most one registered source, dispatched from a
/// single-threaded cooperative loop. The serial port and all per-device
/// state are owned by the source for the lifetime of the registration.
pub struct Session {
    source: Option<(Box<dyn Source>, Duration)>,
}

impl Session {
    pub fn new() -> Self {
        Session { source: None }
    }

    pub fn register_source(&mut self, source: Box<dyn Source>, poll_interval: Duration) {
        self.source = Some((source, poll_interval));
    }

    pub fn unregister_source(&mut self) -> Option<Box<dyn Source>> {
        self.source.take().map(|(source, _)| source)
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Dispatches the registered source until it asks to be removed or the
    /// cancel channel fires. On cancellation the source gets to send its
    /// best-effort stop and the end-of-stream marker before being dropped.
    pub fn run(&mut self, feed: &mut dyn Datafeed, cancel: &Receiver<()>) {
        while self.has_source() {
            if cancel.try_recv().is_ok() {
                if let Some(mut source) = self.unregister_source() {
                    source.cancel(feed);
                }
                break;
            }
            let Some((source, poll_interval)) = self.source.as_mut() else {
                break;
            };
            let revents = source.poll(*poll_interval);
            if !source.ready(revents, feed) {
                self.source = None;
            }
        }
    }
}

/// Waits until `is_ready` reports true or `timeout` has elapsed, sleeping in
/// millisecond steps in between, and returns the resulting event mask.
pub fn poll_readiness(timeout: Duration, mut is_ready: impl FnMut() -> bool) -> Readiness {
    let deadline = Instant::now() + timeout;
    loop {
        if is_ready() {
            return Readiness::In;
        }
        if Instant::now() >= deadline {
            return Readiness::None;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}
