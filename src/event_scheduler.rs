//! Scheduler for delayed \<send\> dispatch.\
//! A single timer thread sleeps to the nearest fire time; cancellation works
//! by dropping the guard of a scheduled callback. Delivery callbacks must
//! enqueue-and-return, they run on the timer thread.

use std::sync::Mutex;

use chrono::Duration;

/// Wraps the process-wide timer.\
/// One scheduler per executor is sufficient; sessions keep the guards of
/// their own sends (keyed by sendid), so cancellation stays session-scoped
/// and a terminating session drops all of its pending sends at once.
pub struct EventScheduler {
    timer: Mutex<timer::Timer>,
}

impl Default for EventScheduler {
    fn default() -> Self {
        EventScheduler::new()
    }
}

impl EventScheduler {
    pub fn new() -> EventScheduler {
        EventScheduler {
            timer: Mutex::new(timer::Timer::new()),
        }
    }

    /// Schedules the callback to fire once after the delay.\
    /// The returned guard cancels the callback when dropped; call
    /// `guard.ignore()` to let it fire regardless.
    pub fn schedule<F>(&self, delay_ms: i64, callback: F) -> timer::Guard
    where
        F: 'static + FnMut() + Send,
    {
        self.timer
            .lock()
            .unwrap()
            .schedule_with_delay(Duration::milliseconds(delay_ms), callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::time::Duration as StdDuration;

    #[test]
    fn fires_after_delay() {
        let scheduler = EventScheduler::new();
        let (sender, receiver) = channel();
        let guard = scheduler.schedule(20, move || {
            let _ = sender.send(42);
        });
        guard.ignore();
        assert_eq!(receiver.recv_timeout(StdDuration::from_secs(2)), Ok(42));
    }

    #[test]
    fn dropping_the_guard_cancels() {
        let scheduler = EventScheduler::new();
        let (sender, receiver) = channel();
        let guard = scheduler.schedule(20, move || {
            let _ = sender.send(42);
        });
        drop(guard);
        assert!(receiver.recv_timeout(StdDuration::from_millis(200)).is_err());
    }

    #[test]
    fn fires_in_time_order() {
        let scheduler = EventScheduler::new();
        let (sender, receiver) = channel();
        let s1 = sender.clone();
        scheduler.schedule(60, move || let_send(&s1, 2)).ignore();
        scheduler.schedule(10, move || let_send(&sender, 1)).ignore();
        assert_eq!(receiver.recv_timeout(StdDuration::from_secs(2)), Ok(1));
        assert_eq!(receiver.recv_timeout(StdDuration::from_secs(2)), Ok(2));
    }

    fn let_send(sender: &std::sync::mpsc::Sender<i32>, value: i32) {
        let _ = sender.send(value);
    }
}
