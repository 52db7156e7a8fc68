use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

/// Single-shot timer slot with cancel-and-replace semantics
///
/// Each schedule arms the slot with a fresh token and aborts whatever was
/// pending. The callback receives the token; the owner redeems it with
/// [`TimerHandle::fire`], which only succeeds for the currently armed timer.
/// A firing that raced with a cancel or a reschedule is therefore dropped.
pub struct TimerHandle {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
    generation: u64,
    armed: bool,
}

impl TimerHandle {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handle: None,
            generation: 0,
            armed: false,
        }
    }

    /// Call `on_fire` with this timer's token after `delay`, replacing any pending timer
    pub fn schedule<F>(&mut self, delay: Duration, on_fire: F)
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        self.armed = true;

        let token = self.generation;
        debug!("Scheduling {} timer in {:?}", self.name, delay);

        self.handle = Some(tokio::spawn(async move {
            sleep(delay).await;
            on_fire(token);
        }));
    }

    /// Disarm the slot, returning whether a timer was pending
    pub fn cancel(&mut self) -> bool {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }

        let was_armed = self.armed;
        self.armed = false;
        if was_armed {
            debug!("Cancelled {} timer", self.name);
        }
        was_armed
    }

    /// Redeem a fired token; true only for the currently armed timer
    pub fn fire(&mut self, token: u64) -> bool {
        if !self.armed || token != self.generation {
            debug!("Dropping stale {} timer", self.name);
            return false;
        }

        self.armed = false;
        self.handle = None;
        true
    }

    pub fn is_pending(&self) -> bool {
        self.armed
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
