//! A repeating update loop on top of the one-shot frame clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use deepfly_hub::{FrameClock, FrameHandle, FrameInfo};

type Step = Arc<Mutex<Box<dyn FnMut() + Send>>>;

/// Re-requests a frame from inside each callback and keeps the latest
/// handle so [`FrameLoop::stop`] can cancel it.
pub(crate) struct FrameLoop {
    frames: FrameClock,
    handle: Arc<Mutex<Option<FrameHandle>>>,
    running: Arc<AtomicBool>,
}

impl FrameLoop {
    /// Schedule `step` on every tick from the next one on.
    pub(crate) fn start<F>(frames: FrameClock, step: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let handle = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));
        let step: Step = Arc::new(Mutex::new(Box::new(step)));
        schedule(&frames, &handle, &running, step);
        Self {
            frames,
            handle,
            running,
        }
    }

    /// Cancel the pending frame. Returns `false` if already stopped.
    pub(crate) fn stop(&self) -> bool {
        if !self.running.swap(false, Ordering::SeqCst) {
            return false;
        }
        if let Some(handle) = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            self.frames.cancel(handle);
        }
        true
    }
}

fn schedule(
    frames: &FrameClock,
    slot: &Arc<Mutex<Option<FrameHandle>>>,
    running: &Arc<AtomicBool>,
    step: Step,
) {
    let next = {
        let frames = frames.clone();
        let slot = Arc::clone(slot);
        let running = Arc::clone(running);
        move |_: FrameInfo| {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            {
                let mut step = step.lock().unwrap_or_else(PoisonError::into_inner);
                (*step)();
            }
            schedule(&frames, &slot, &running, step);
        }
    };
    let handle = frames.request_frame(next);
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

    // `stop` may have run between the check in the callback and now.
    if !running.load(Ordering::SeqCst) {
        frames.cancel(handle);
    }
}
