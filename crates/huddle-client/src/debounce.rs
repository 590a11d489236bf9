//! Typing debouncer.
//!
//! Converts raw input events into a low-frequency "is typing" signal with
//! hysteresis. The debouncer only decides *what* to signal; it emits `true`
//! or `false` as a return value and the caller forwards it to
//! [`Session::set_typing`](crate::Session::set_typing).
//!
//! # Timer
//!
//! At most one idle timer is armed at a time, represented by the instant of
//! the last keystroke. The caller polls [`TypingDebouncer::tick`]; there are
//! no callbacks to cancel. The timer is tagged with the session generation it
//! was armed under, so a membership change disarms it without firing.

use std::{
    ops::{Add, Sub},
    time::Duration,
};

/// Signal `false` after this long without a keystroke.
pub const TYPING_IDLE_TIMEOUT: Duration = Duration::from_millis(3000);

/// Keystroke-to-signal state machine.
#[derive(Debug, Clone)]
pub struct TypingDebouncer<I> {
    idle_timeout: Duration,
    signaling: bool,
    last_input: Option<I>,
    last_content: String,
    generation: u64,
}

impl<I> Default for TypingDebouncer<I> {
    fn default() -> Self {
        Self::new(TYPING_IDLE_TIMEOUT)
    }
}

impl<I> TypingDebouncer<I> {
    /// Debouncer with a custom idle timeout.
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            signaling: false,
            last_input: None,
            last_content: String::new(),
            generation: 0,
        }
    }

    /// Whether `true` was the last value emitted.
    pub fn is_signaling(&self) -> bool {
        self.signaling
    }

    /// Whether `true` was emitted under `generation` and has not been
    /// withdrawn since.
    pub fn is_signaling_in(&self, generation: u64) -> bool {
        self.signaling && self.generation == generation
    }

    #[cfg(test)]
    fn timer_armed(&self) -> bool {
        self.last_input.is_some()
    }

    /// The input box was submitted.
    pub fn on_submit(&mut self, generation: u64) -> Option<bool> {
        self.sync(generation);
        self.last_content.clear();
        self.stop()
    }

    /// The input box lost focus.
    pub fn on_blur(&mut self, generation: u64) -> Option<bool> {
        self.sync(generation);
        self.stop()
    }

    /// The input surface is going away.
    pub fn on_teardown(&mut self) -> Option<bool> {
        self.last_content.clear();
        self.stop()
    }

    fn stop(&mut self) -> Option<bool> {
        self.last_input = None;
        if self.signaling {
            self.signaling = false;
            Some(false)
        } else {
            None
        }
    }

    /// Drop state armed under an older membership without emitting.
    ///
    /// The session already cleared its own typing flag when the membership
    /// changed, so a trailing `false` would be redundant.
    fn sync(&mut self, generation: u64) {
        if self.generation != generation {
            tracing::trace!(old = self.generation, new = generation, "debouncer generation reset");
            self.generation = generation;
            self.signaling = false;
            self.last_input = None;
            self.last_content.clear();
        }
    }
}

impl<I> TypingDebouncer<I>
where
    I: Copy + Ord + Sub<Output = Duration> + Add<Duration, Output = I>,
{
    /// The input content changed to `content`.
    ///
    /// Emits `true` on the first keystroke and `false` as soon as the input
    /// becomes empty. Repeats of the current content are ignored.
    pub fn on_input(&mut self, content: &str, now: I, generation: u64) -> Option<bool> {
        self.sync(generation);

        if content == self.last_content {
            return None;
        }
        content.clone_into(&mut self.last_content);

        if content.is_empty() {
            return self.stop();
        }

        self.last_input = Some(now);
        if self.signaling {
            None
        } else {
            self.signaling = true;
            Some(true)
        }
    }

    /// Fire the idle timer if it has elapsed.
    pub fn tick(&mut self, now: I, generation: u64) -> Option<bool> {
        self.sync(generation);

        let last = self.last_input?;
        if now - last >= self.idle_timeout { self.stop() } else { None }
    }

    /// When the armed timer will fire.
    pub fn next_deadline(&self) -> Option<I> {
        self.last_input.map(|last| last + self.idle_timeout)
    }
}
