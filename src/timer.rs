//! Cancellable one-shot timers on a virtual clock.
//!
//! The playback engine never sleeps. The shell reports elapsed time and the
//! engine fires whichever slots are due. A [`TimerSlot`] holds at most one
//! live timer; arming it always cancels the previous one first.

/// Milliseconds on the engine's virtual clock.
pub type Millis = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerHandle {
    deadline: Millis,
}

impl TimerHandle {
    pub fn deadline(&self) -> Millis {
        self.deadline
    }
}

#[derive(Clone, Debug, Default)]
pub struct TimerSlot {
    live: Option<TimerHandle>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a timer `delay` after `now`, replacing any live one.
    pub fn arm(&mut self, now: Millis, delay: Millis) -> TimerHandle {
        self.cancel();
        let handle = TimerHandle {
            deadline: now.saturating_add(delay),
        };
        self.live = Some(handle);
        handle
    }

    /// Drops the live timer, if any. Safe to call unconditionally.
    pub fn cancel(&mut self) -> Option<TimerHandle> {
        self.live.take()
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    pub fn deadline(&self) -> Option<Millis> {
        self.live.map(|handle| handle.deadline)
    }

    /// Disarms and returns the live timer if it is due at `now`.
    pub fn take_due(&mut self, now: Millis) -> Option<TimerHandle> {
        match self.live {
            Some(handle) if handle.deadline <= now => self.live.take(),
            _ => None,
        }
    }
}
