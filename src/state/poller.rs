use crate::chain::ChainAdapter;
use crate::state::WalletTracker;
use std::sync::{Arc, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn, Instrument};

pub(crate) struct PollerHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl<A: ChainAdapter + 'static> WalletTracker<A> {
    /// Runs one update right away and arms a timer that repeats it every
    /// `poll_interval`. Does nothing if the timer is already armed.
    #[instrument(skip(self))]
    pub async fn start(self: &Arc<Self>) {
        {
            let mut poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
            if poller.as_ref().is_some_and(PollerHandle::is_running) {
                warn!("Poller is already running");
                return;
            }

            let (shutdown, rx) = oneshot::channel();
            let task = start_poller(Arc::downgrade(self), self.config.poll_interval, rx);
            *poller = Some(PollerHandle { shutdown, task });
        }

        self.update().await;
    }

    /// Disarms the timer. An update that is already running finishes.
    pub fn stop(&self) {
        let handle = self.poller.lock().unwrap_or_else(PoisonError::into_inner).take();

        match handle {
            Some(handle) => {
                let _ = handle.shutdown.send(());
                info!("Poller stopped");
            }
            None => debug!("Poller is not running"),
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller.lock().unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(PollerHandle::is_running)
    }
}

/// The task only holds a weak reference, so dropping the last tracker handle
/// also drops the shutdown sender and ends the loop.
fn start_poller<A: ChainAdapter + 'static>(
    tracker: Weak<WalletTracker<A>>,
    interval: Duration,
    mut shutdown: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    let period = interval.max(Duration::from_millis(1));
    info!(?period, "Starting wallet poller");

    let span = tracing::info_span!(parent: None, "wallet_poller");

    tokio::spawn(async move {
        // the first cycle is run by `start` itself
        let mut timer = tokio::time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = timer.tick() => {
                    let Some(tracker) = tracker.upgrade() else { break };
                    tracker.update().await;
                }
            }
        }

        debug!("Wallet poller exited");
    }.instrument(span))
}
