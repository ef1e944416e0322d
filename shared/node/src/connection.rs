use std::sync::Arc;
use std::time::Duration;

use learning_loop_transport::ConnectionState;
use learning_loop_watcher::Ticker;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const WATCH_INTERVAL: Duration = Duration::from_secs(10);

/// Notified on every `Offline`/`Idle` edge of the event channel, so a subclass (e.g.
/// `TrainerNode`) can downgrade its own state and emit a status heartbeat exactly at transition
/// time: on disconnect, state becomes `Offline`; on connect, state becomes `Idle` and a status
/// is sent.
#[async_trait::async_trait]
pub trait ConnectionObserver: Send + Sync {
    async fn on_connected(&self);
    async fn on_disconnected(&self);
}

/// Runs the periodic (every 10s) watchdog that observes the event channel's connection state
/// and calls the observer on edges. The channel itself reconnects continuously in the
/// background (see `learning-loop-transport::EventChannel::run`); this task is the node's view
/// of that process, not a second reconnector.
pub async fn run_connection_watch(
    mut state: tokio::sync::watch::Receiver<ConnectionState>,
    observer: Arc<dyn ConnectionObserver>,
    cancel: CancellationToken,
) {
    let mut last = *state.borrow();
    if last == ConnectionState::Idle {
        observer.on_connected().await;
    } else {
        observer.on_disconnected().await;
    }

    let mut ticker = Ticker::new(WATCH_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            tick = ticker.tick(&cancel) => {
                if tick.is_none() {
                    return;
                }
                let current = *state.borrow();
                if current != last {
                    debug!(?last, ?current, "connection state changed");
                    match current {
                        ConnectionState::Idle => observer.on_connected().await,
                        ConnectionState::Offline => observer.on_disconnected().await,
                    }
                    last = current;
                }
            }
            changed = state.changed() => {
                if changed.is_err() {
                    return;
                }
                let current = *state.borrow();
                if current != last {
                    match current {
                        ConnectionState::Idle => observer.on_connected().await,
                        ConnectionState::Offline => observer.on_disconnected().await,
                    }
                    last = current;
                }
            }
        }
    }
}
