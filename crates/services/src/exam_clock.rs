//! Countdown timer driving exam deadlines.
//!
//! The clock runs on its own task and reports through a channel, so the
//! session receives ticks as messages rather than sharing state with it.
//! Every tick recomputes the remaining time from an absolute deadline, so late
//! wake-ups never accumulate into drift.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

const TICK: Duration = Duration::from_secs(1);

/// Stand-in deadline for durations past what `Instant` can represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Notification emitted by a running `ExamClock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// Whole seconds left, rounded up. Never zero.
    Tick { remaining_secs: u64 },
    /// The deadline has passed. Always the last event.
    Expired,
}

/// Rounds a remaining duration up to whole seconds.
fn ceil_secs(remaining: Duration) -> u64 {
    let secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[derive(Debug)]
pub struct ExamClock {
    deadline: Instant,
    task: Option<JoinHandle<()>>,
}

impl ExamClock {
    /// Start counting down `duration`, reporting on `events`.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(duration: Duration, events: mpsc::UnboundedSender<ClockEvent>) -> Self {
        let started = Instant::now();
        let deadline = started
            .checked_add(duration)
            .unwrap_or_else(|| started + FAR_FUTURE);
        let task = tokio::spawn(run(started, deadline, events));
        debug!(duration_secs = duration.as_secs(), "exam clock started");
        Self {
            deadline,
            task: Some(task),
        }
    }

    /// Time left until the deadline, zero once it has passed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Time left rounded up to whole seconds.
    #[must_use]
    pub fn remaining_secs(&self) -> u64 {
        ceil_secs(self.remaining())
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel further notifications. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("exam clock stopped");
        }
    }
}

impl Drop for ExamClock {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(started: Instant, deadline: Instant, events: mpsc::UnboundedSender<ClockEvent>) {
    let mut next = started + TICK;
    loop {
        if next >= deadline {
            sleep_until(deadline).await;
            let _ = events.send(ClockEvent::Expired);
            return;
        }

        sleep_until(next).await;
        let now = Instant::now();
        let remaining_secs = ceil_secs(deadline.saturating_duration_since(now));
        if remaining_secs == 0 {
            let _ = events.send(ClockEvent::Expired);
            return;
        }
        if events.send(ClockEvent::Tick { remaining_secs }).is_err() {
            return;
        }

        // Skip tick slots missed by a late wake-up instead of replaying them.
        let elapsed = now.saturating_duration_since(started);
        next = started + Duration::from_secs(elapsed.as_secs() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(mut rx: mpsc::UnboundedReceiver<ClockEvent>) -> Vec<ClockEvent> {
        let mut seen = Vec::new();
        while let Some(ev) = rx.recv().await {
            seen.push(ev);
        }
        seen
    }

    #[test]
    fn ceil_rounds_partial_seconds_up() {
        assert_eq!(ceil_secs(Duration::from_millis(1500)), 2);
        assert_eq!(ceil_secs(Duration::from_secs(3)), 3);
        assert_eq!(ceil_secs(Duration::ZERO), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_every_second_then_expires_once() {
        let (tx, rx) = mpsc::unbounded_channel();
        let clock = ExamClock::start(Duration::from_secs(3), tx);

        let events = collect(rx).await;
        assert_eq!(
            events,
            vec![
                ClockEvent::Tick { remaining_secs: 2 },
                ClockEvent::Tick { remaining_secs: 1 },
                ClockEvent::Expired,
            ]
        );
        assert_eq!(clock.remaining_secs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn one_second_clock_only_expires() {
        let (tx, rx) = mpsc::unbounded_channel();
        let _clock = ExamClock::start(Duration::from_secs(1), tx);
        assert_eq!(collect(rx).await, vec![ClockEvent::Expired]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_notifications_and_is_idempotent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut clock = ExamClock::start(Duration::from_secs(60), tx);

        assert_eq!(
            rx.recv().await,
            Some(ClockEvent::Tick { remaining_secs: 59 })
        );
        clock.stop();
        clock.stop();
        assert!(!clock.is_running());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_tracks_the_deadline() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let clock = ExamClock::start(Duration::from_secs(10), tx);
        tokio::time::advance(Duration::from_millis(2500)).await;
        assert_eq!(clock.remaining_secs(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_duration_clamps_to_far_future() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let clock = ExamClock::start(Duration::from_secs(u64::MAX), tx);
        assert!(clock.is_running());
        assert_eq!(clock.remaining(), FAR_FUTURE);
    }

    #[tokio::test(start_paused = true)]
    async fn late_wake_up_does_not_drift() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _clock = ExamClock::start(Duration::from_secs(10), tx);

        // Jump past several tick slots at once; remaining is derived from the
        // deadline, not from the number of ticks delivered.
        tokio::time::advance(Duration::from_millis(4200)).await;
        let first = rx.recv().await;
        assert_eq!(first, Some(ClockEvent::Tick { remaining_secs: 6 }));
        assert_eq!(rx.recv().await, Some(ClockEvent::Tick { remaining_secs: 5 }));
    }
}
