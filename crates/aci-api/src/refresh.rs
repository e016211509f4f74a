// ── Background token refresh ──
//
// One-shot timer per password session. It sleeps until shortly before the
// token expires, then calls back into the session to run `aaaRefresh`;
// a successful refresh schedules the next timer. Cancellation goes
// through a `CancellationToken` plus `JoinHandle::abort`, and the session
// is held weakly so a dropped session never keeps refreshing. Timers are
// spawned on an explicit runtime handle, so arming one does not require
// the caller to be inside a runtime.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Never renew more often than this, whatever the controller advertises.
pub const MIN_REFRESH_DELAY: Duration = Duration::from_secs(1);

/// Delay until the next refresh: the advertised lifetime minus the
/// safety offset, floored at [`MIN_REFRESH_DELAY`].
pub fn refresh_delay(refresh_timeout_secs: u64, offset: Duration) -> Duration {
    Duration::from_secs(refresh_timeout_secs)
        .saturating_sub(offset)
        .max(MIN_REFRESH_DELAY)
}

/// A pending refresh timer.
#[derive(Debug)]
pub(crate) struct RefreshSchedule {
    /// Identifies this timer so a firing task can claim its own slot.
    pub id: u64,
    /// Session epoch the timer was armed under.
    pub epoch: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RefreshSchedule {
    /// Arm a timer on `runtime` that runs `fire(session)` after `delay`,
    /// unless cancelled first or the session has been dropped by then.
    pub fn spawn<S, F, Fut>(
        runtime: &Handle,
        id: u64,
        epoch: u64,
        delay: Duration,
        session: &Arc<S>,
        fire: F,
    ) -> Self
    where
        S: Send + Sync + 'static,
        F: FnOnce(Arc<S>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let weak: Weak<S> = Arc::downgrade(session);
        let task_cancel = cancel.clone();

        let task = runtime.spawn(async move {
            tokio::select! {
                biased;
                () = task_cancel.cancelled() => {
                    debug!(timer = id, "refresh timer cancelled");
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }
            let Some(session) = weak.upgrade() else {
                debug!(timer = id, "session dropped before refresh");
                return;
            };
            fire(session).await;
        });

        debug!(timer = id, epoch, delay_secs = delay.as_secs(), "refresh timer armed");
        Self {
            id,
            epoch,
            cancel,
            task,
        }
    }

    /// Stop the timer. A refresh already in flight is aborted at its next
    /// await point; anything it managed to finish is rejected by the epoch
    /// check on the session side.
    pub fn cancel(self) {
        self.cancel.cancel();
        self.task.abort();
    }

    /// Let the timer's own task continue without being tracked.
    pub fn release(self) {
        drop(self.task);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn delay_subtracts_offset() {
        assert_eq!(refresh_delay(600, Duration::from_secs(30)), Duration::from_secs(570));
    }

    #[test]
    fn delay_never_drops_below_floor() {
        assert_eq!(refresh_delay(20, Duration::from_secs(30)), MIN_REFRESH_DELAY);
        assert_eq!(refresh_delay(0, Duration::ZERO), MIN_REFRESH_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let hits = Arc::new(AtomicU32::new(0));
        let _timer = RefreshSchedule::spawn(&Handle::current(), 1, 0, Duration::from_secs(5), &hits, |h| async move {
            h.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let hits = Arc::new(AtomicU32::new(0));
        let timer = RefreshSchedule::spawn(&Handle::current(), 1, 0, Duration::from_secs(5), &hits, |h| async move {
            h.fetch_add(1, Ordering::SeqCst);
        });
        timer.cancel();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn arms_from_outside_the_runtime() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();
        let hits = Arc::new(AtomicU32::new(0));
        let _timer = RefreshSchedule::spawn(runtime.handle(), 1, 0, Duration::from_secs(5), &hits, |h| async move {
            h.fetch_add(1, Ordering::SeqCst);
        });

        runtime.block_on(async { tokio::time::sleep(Duration::from_secs(6)).await });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_session_stops_timer() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        let session = Arc::new(());
        let _timer = RefreshSchedule::spawn(&Handle::current(), 1, 0, Duration::from_secs(5), &session, move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(session);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
