//! Hand-off between the detector and the render loop.
//!
//! Detection is slower than rendering and only the newest result matters, so
//! frames travel through single-slot mailboxes that overwrite unread values
//! instead of queueing them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::pose::PoseFrame;
use crate::Result;

/// How long the worker sleeps on an empty slot before rechecking for stop
const IDLE_WAIT: Duration = Duration::from_millis(20);

struct Slot<T> {
    value: Option<T>,
    published: u64,
    dropped: u64,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

/// One-slot mailbox keeping only the most recent value
pub struct LatestFrame<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for LatestFrame<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for LatestFrame<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestFrame<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    value: None,
                    published: 0,
                    dropped: 0,
                }),
                ready: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.shared.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value`, replacing any unread one. Returns true if a value was dropped.
    pub fn publish(&self, value: T) -> bool {
        let mut slot = self.lock();
        let replaced = slot.value.replace(value).is_some();
        slot.published += 1;
        if replaced {
            slot.dropped += 1;
        }
        drop(slot);
        self.shared.ready.notify_one();
        replaced
    }

    /// Take the pending value without waiting
    pub fn take(&self) -> Option<T> {
        self.lock().value.take()
    }

    /// Take the pending value, waiting up to `timeout` for one to arrive
    pub fn wait_take(&self, timeout: Duration) -> Option<T> {
        let guard = self.lock();
        let (mut slot, _) = self
            .shared
            .ready
            .wait_timeout_while(guard, timeout, |slot| slot.value.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        slot.value.take()
    }

    /// Values overwritten before anyone read them
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    pub fn published(&self) -> u64 {
        self.lock().published
    }
}

/// Outcome of one detection; `None` when no face was found
pub type Detection = Option<PoseFrame>;

/// Anything that turns a captured input into landmarks and a head pose
pub trait Detector: Send + 'static {
    type Input: Send + 'static;

    fn detect(&mut self, input: Self::Input) -> Detection;
}

/// Runs a [`Detector`] on its own thread, one detection at a time.
///
/// Inputs submitted while a detection is running overwrite each other, so
/// the worker always starts on the newest capture.
pub struct DetectorThread<D: Detector> {
    input: LatestFrame<D::Input>,
    output: LatestFrame<Detection>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl<D: Detector> DetectorThread<D> {
    pub fn spawn(mut detector: D) -> Result<Self> {
        let input = LatestFrame::new();
        let output = LatestFrame::new();
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let input = input.clone();
            let output = output.clone();
            let stop = Arc::clone(&stop);
            thread::Builder::new().name("detector".to_string()).spawn(move || {
                log::debug!("detector thread started");
                while !stop.load(Ordering::Acquire) {
                    if let Some(captured) = input.wait_take(IDLE_WAIT) {
                        output.publish(detector.detect(captured));
                    }
                }
                log::debug!("detector thread stopped");
            })?
        };

        Ok(Self {
            input,
            output,
            stop,
            handle: Some(handle),
        })
    }

    /// Hand a new capture to the worker
    pub fn submit(&self, input: D::Input) {
        self.input.publish(input);
    }

    /// Newest finished detection, if one arrived since the last poll
    pub fn poll(&self) -> Option<Detection> {
        self.output.take()
    }

    /// Wait up to `timeout` for a finished detection
    pub fn wait(&self, timeout: Duration) -> Option<Detection> {
        self.output.wait_take(timeout)
    }

    /// Captures and results that were overwritten unread
    pub fn dropped(&self) -> u64 {
        self.input.dropped() + self.output.dropped()
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("detector thread panicked");
            }
        }
    }
}

impl<D: Detector> Drop for DetectorThread<D> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix4;

    #[test]
    fn test_publish_overwrites_unread() {
        let slot = LatestFrame::new();
        assert!(!slot.publish(1));
        assert!(slot.publish(2));
        assert_eq!(slot.take(), Some(2));
        assert_eq!(slot.take(), None);
        assert_eq!(slot.dropped(), 1);
        assert_eq!(slot.published(), 2);
    }

    #[test]
    fn test_wait_take_times_out_empty() {
        let slot: LatestFrame<u32> = LatestFrame::new();
        assert_eq!(slot.wait_take(Duration::from_millis(5)), None);
    }

    #[test]
    fn test_wait_take_wakes_on_publish() {
        let slot = LatestFrame::new();
        let producer = slot.clone();
        let handle = thread::spawn(move || producer.publish(7u32));
        assert_eq!(slot.wait_take(Duration::from_secs(5)), Some(7));
        handle.join().unwrap();
    }

    struct Stamp;

    impl Detector for Stamp {
        type Input = u64;

        fn detect(&mut self, input: u64) -> Detection {
            (input % 2 == 0).then(|| PoseFrame {
                landmarks: Vec::new(),
                transform: Matrix4::identity(),
                expressions: Vec::new(),
                timestamp_ms: input,
            })
        }
    }

    #[test]
    fn test_detector_thread_round_trip() {
        let mut detector = DetectorThread::spawn(Stamp).unwrap();

        detector.submit(42);
        let frame = detector.wait(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(frame.timestamp_ms, 42);

        detector.submit(3);
        assert_eq!(detector.wait(Duration::from_secs(5)), Some(None));

        detector.stop();
        assert!(detector.poll().is_none());
    }
}
