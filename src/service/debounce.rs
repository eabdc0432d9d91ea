//! Coalescing of rapidly changing values.
//!
//! A [`Debounced`] value only settles after it has stayed unchanged for the
//! configured delay. It is a plain state machine driven by explicit
//! instants; callers own the timer (see `NoteEditor::step`).

use tokio::time::{Duration, Instant};

pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct Debounced<T> {
    settled: T,
    latest: T,
    delay: Duration,
    deadline: Option<Instant>,
}

impl<T: Clone + PartialEq> Debounced<T> {
    pub fn new(initial: T, delay: Duration) -> Self {
        Debounced {
            settled: initial.clone(),
            latest: initial,
            delay,
            deadline: None,
        }
    }

    /// Feed a new value. Equal values are ignored and do not restart the timer.
    ///
    /// Returns true if the timer was (re)started.
    pub fn set(&mut self, value: T, now: Instant) -> bool {
        if value == self.latest {
            return false;
        }
        self.latest = value;
        self.deadline = Some(now + self.delay);
        true
    }

    /// Settle the value if the quiet window has elapsed.
    ///
    /// Yields the new settled value at most once per quiet period, and only
    /// if it differs from the previously settled one.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.settle(),
            _ => None,
        }
    }

    /// Settle right away, skipping the rest of the window
    pub fn flush(&mut self) -> Option<T> {
        if self.deadline.is_some() { self.settle() } else { None }
    }

    /// Drop the running timer; the latest value stays unsettled
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    fn settle(&mut self) -> Option<T> {
        self.deadline = None;
        if self.latest == self.settled {
            return None;
        }
        self.settled = self.latest.clone();
        Some(self.settled.clone())
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn latest(&self) -> &T {
        &self.latest
    }

    pub fn settled(&self) -> &T {
        &self.settled
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn rapid_updates_emit_only_the_last_value_once() {
        let t0 = Instant::now();
        let mut d = Debounced::new(String::new(), DEFAULT_DELAY);
        let mut emitted = Vec::new();

        for (i, v) in ["H", "He", "Hel", "Hell", "Hello"].iter().enumerate() {
            let now = t0 + ms(100 * i as u64);
            d.set(v.to_string(), now);
            emitted.extend(d.poll(now));
            assert!(d.is_pending());
        }
        // last keystroke at 400ms, window closes at 900ms
        assert_eq!(d.poll(t0 + ms(899)), None);
        emitted.extend(d.poll(t0 + ms(900)));
        emitted.extend(d.poll(t0 + ms(2000)));

        assert_eq!(emitted, vec!["Hello".to_string()]);
        assert!(!d.is_pending());
        assert_eq!(d.settled(), "Hello");
    }

    #[test]
    fn equal_value_does_not_restart_timer() {
        let t0 = Instant::now();
        let mut d = Debounced::new(0, ms(500));
        assert!(d.set(1, t0));
        assert!(!d.set(1, t0 + ms(400)));
        assert_eq!(d.deadline(), Some(t0 + ms(500)));
        assert_eq!(d.poll(t0 + ms(500)), Some(1));
    }

    #[test]
    fn returning_to_settled_value_emits_nothing() {
        let t0 = Instant::now();
        let mut d = Debounced::new("a", ms(500));
        d.set("ab", t0);
        d.set("a", t0 + ms(100));
        assert_eq!(d.poll(t0 + ms(600)), None);
        assert!(!d.is_pending());
    }

    #[test]
    fn cancel_prevents_late_emission() {
        let t0 = Instant::now();
        let mut d = Debounced::new(0, ms(500));
        d.set(7, t0);
        d.cancel();
        assert_eq!(d.poll(t0 + ms(10_000)), None);
        assert_eq!(*d.latest(), 7);
        assert_eq!(*d.settled(), 0);
    }

    #[test]
    fn flush_settles_early() {
        let t0 = Instant::now();
        let mut d = Debounced::new(0, ms(500));
        assert_eq!(d.flush(), None);
        d.set(3, t0);
        assert_eq!(d.flush(), Some(3));
        assert!(!d.is_pending());
    }
}
