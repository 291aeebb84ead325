//! Per-frame callback scheduling.
//!
//! Mirrors the browser's animation-frame API: [`FrameClock::request_frame`]
//! schedules a one-shot callback for the next tick and returns a
//! [`FrameHandle`]; a loop re-requests from inside its callback. Cancelling a
//! handle is a single map removal. The clock never cancels anything on its
//! own: a module that forgets to cancel in `unmount` keeps ticking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Retained by the caller to cancel a pending callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameHandle(u64);

/// Passed to each callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Sequence number of the tick running the callback, starting at 1.
    pub frame: u64,
}

type FrameCallback = Box<dyn FnOnce(FrameInfo) + Send>;

#[derive(Default)]
struct Schedule {
    next_handle: u64,
    frame: u64,
    pending: HashMap<u64, FrameCallback>,
}

/// Shared frame scheduler. Clones refer to the same schedule.
#[derive(Clone, Default)]
pub struct FrameClock {
    inner: Arc<Mutex<Schedule>>,
}

impl std::fmt::Debug for FrameClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let schedule = self.lock();
        f.debug_struct("FrameClock")
            .field("frame", &schedule.frame)
            .field("pending", &schedule.pending.len())
            .finish()
    }
}

impl FrameClock {
    /// Create an idle clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Schedule> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `callback` once on the next tick.
    pub fn request_frame<F>(&self, callback: F) -> FrameHandle
    where
        F: FnOnce(FrameInfo) + Send + 'static,
    {
        let mut schedule = self.lock();
        let id = schedule.next_handle;
        schedule.next_handle = schedule.next_handle.wrapping_add(1);
        schedule.pending.insert(id, Box::new(callback));
        FrameHandle(id)
    }

    /// Drop a pending callback. Returns `false` if it already ran or was
    /// cancelled.
    pub fn cancel(&self, handle: FrameHandle) -> bool {
        self.lock().pending.remove(&handle.0).is_some()
    }

    /// Advance one frame, running every callback that was pending when the
    /// tick started. Callbacks requested during the tick wait for the next.
    ///
    /// Returns the number of callbacks run.
    pub fn tick(&self) -> usize {
        let (frame, mut due) = {
            let mut schedule = self.lock();
            schedule.frame = schedule.frame.wrapping_add(1);
            (schedule.frame, std::mem::take(&mut schedule.pending))
        };
        let mut order: Vec<u64> = due.keys().copied().collect();
        order.sort_unstable();

        let info = FrameInfo { frame };
        let mut ran: usize = 0;
        for id in order {
            if let Some(callback) = due.remove(&id) {
                callback(info);
                ran = ran.saturating_add(1);
            }
        }
        trace!(frame, ran, "frame tick");
        ran
    }

    /// Number of callbacks waiting for the next tick.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Number of ticks so far.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.lock().frame
    }

    /// Tick at `fps` on a tokio interval until the returned task is aborted.
    #[must_use]
    pub fn drive(&self, fps: u32) -> JoinHandle<()> {
        let clock = self.clone();
        let period = Duration::from_secs(1)
            .checked_div(fps)
            .unwrap_or(Duration::from_secs(1));
        debug!(fps, period_us = period.as_micros(), "frame clock driving");
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                clock.tick();
            }
        })
    }
}
