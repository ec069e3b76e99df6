//! Fixed-delay polling with an optional deadline and cancellation.
//!
//! The replica sync barrier and similar waits sleep, probe, and repeat.
//! A deadline turns a stuck wait into a distinct `TimedOut` outcome
//! instead of blocking forever; a shutdown signal turns it into
//! `Cancelled`.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Shutdown signal shared with long waits. `true` means stop.
pub type CancelSignal = watch::Receiver<bool>;

/// How often to probe and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Sleep before every probe, including the first.
    pub interval: Duration,
    /// Give up after this much time; `None` waits indefinitely.
    pub deadline: Option<Duration>,
}

impl PollSchedule {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }
}

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready { value: T, attempts: u32 },
    TimedOut { attempts: u32 },
    Cancelled { attempts: u32 },
}

impl<T> PollOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Ready { attempts, .. }
            | Self::TimedOut { attempts }
            | Self::Cancelled { attempts } => *attempts,
        }
    }
}

/// Sleep `schedule.interval`, call `probe(attempt)`, and repeat until it
/// yields a value, the deadline passes, or `cancel` flips to `true`.
pub async fn poll_until<T, F, Fut>(
    schedule: PollSchedule,
    mut cancel: Option<CancelSignal>,
    mut probe: F,
) -> PollOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let started = Instant::now();
    let mut attempts = 0;

    loop {
        if is_cancelled(&cancel) || sleep_or_cancel(schedule.interval, &mut cancel).await {
            return PollOutcome::Cancelled { attempts };
        }

        attempts += 1;
        if let Some(value) = probe(attempts).await {
            return PollOutcome::Ready { value, attempts };
        }

        if let Some(deadline) = schedule.deadline {
            if started.elapsed() >= deadline {
                return PollOutcome::TimedOut { attempts };
            }
        }
    }
}

fn is_cancelled(cancel: &Option<CancelSignal>) -> bool {
    cancel.as_ref().is_some_and(|rx| *rx.borrow())
}

enum Wake {
    Elapsed,
    Changed,
    Closed,
}

/// Returns `true` if cancelled before the interval elapsed.
async fn sleep_or_cancel(interval: Duration, cancel: &mut Option<CancelSignal>) -> bool {
    let sleep = tokio::time::sleep(interval);
    tokio::pin!(sleep);

    loop {
        let Some(rx) = cancel.as_mut() else {
            sleep.await;
            return false;
        };

        let wake = tokio::select! {
            _ = &mut sleep => Wake::Elapsed,
            changed = rx.changed() => {
                if changed.is_ok() { Wake::Changed } else { Wake::Closed }
            }
        };

        match wake {
            Wake::Elapsed => return false,
            Wake::Changed => {
                if *rx.borrow() {
                    return true;
                }
            }
            // Sender gone: nobody can cancel any more.
            Wake::Closed => *cancel = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ready_on_first_probe() {
        let outcome = poll_until(PollSchedule::every(Duration::ZERO), None, |_| async { Some(7) }).await;
        assert_eq!(outcome, PollOutcome::Ready { value: 7, attempts: 1 });
    }

    #[tokio::test]
    async fn keeps_polling_until_ready() {
        let outcome = poll_until(PollSchedule::every(Duration::ZERO), None, |attempt| async move {
            (attempt == 4).then_some("done")
        })
        .await;
        assert_eq!(outcome, PollOutcome::Ready { value: "done", attempts: 4 });
    }

    #[tokio::test]
    async fn times_out_at_deadline() {
        let schedule = PollSchedule::every(Duration::from_millis(5))
            .with_deadline(Some(Duration::from_millis(20)));
        let outcome: PollOutcome<()> = poll_until(schedule, None, |_| async { None }).await;
        assert!(matches!(outcome, PollOutcome::TimedOut { attempts } if attempts >= 1));
        assert!(!outcome.is_ready());
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let (_tx, rx) = watch::channel(true);
        let outcome: PollOutcome<()> =
            poll_until(PollSchedule::every(Duration::from_secs(60)), Some(rx), |_| async { None }).await;
        assert_eq!(outcome, PollOutcome::Cancelled { attempts: 0 });
    }

    #[tokio::test]
    async fn cancelled_while_sleeping() {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            poll_until::<(), _, _>(PollSchedule::every(Duration::from_secs(3600)), Some(rx), |_| async {
                None
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.attempts(), 0);
        assert!(matches!(outcome, PollOutcome::Cancelled { .. }));
    }

    #[tokio::test]
    async fn dropped_sender_does_not_cancel() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let outcome = poll_until(PollSchedule::every(Duration::ZERO), Some(rx), |attempt| async move {
            (attempt == 2).then_some(())
        })
        .await;
        assert!(outcome.is_ready());
    }
}
