//! Background task that drains a subscription and dispatches to the router.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use metrics::histogram;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::application::error::ErrorReport;

use super::bus::{BusError, Message, PubSubBus, Subscription};
use super::router::PubSubRouter;

const SOURCE: &str = "pubsub::listener";
const METRIC_HANDLER_MS: &str = "rgdps_pubsub_handler_ms";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerConfig {
    /// How long to sleep when no message is pending.
    pub poll_interval: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl From<&crate::config::PubSubSettings> for ListenerConfig {
    fn from(settings: &crate::config::PubSubSettings) -> Self {
        Self {
            poll_interval: settings.poll_interval,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Subscribed,
    Receiving,
    Waiting,
    Stopped,
}

pub struct PubSubListener;

impl PubSubListener {
    /// Subscribes to every channel of `router` and dispatches messages on a
    /// spawned task until the returned handle is shut down.
    pub fn spawn<C>(
        ctx: Arc<C>,
        bus: Arc<dyn PubSubBus>,
        router: PubSubRouter<C>,
        config: ListenerConfig,
    ) -> ListenerHandle
    where
        C: Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ListenerState::Idle);

        let worker = Worker {
            ctx,
            bus,
            router,
            config,
            shutdown: shutdown_rx,
            state: state_tx,
        };
        let task = tokio::spawn(worker.run());

        ListenerHandle {
            shutdown: shutdown_tx,
            state: state_rx,
            task,
        }
    }
}

pub struct ListenerHandle {
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<ListenerState>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Resolves once the listener holds a live subscription.
    pub async fn subscribed(&mut self) {
        let _ = self
            .state
            .wait_for(|state| *state != ListenerState::Idle)
            .await;
    }

    /// Signals the loop to stop and joins it. A handler already running is
    /// allowed to finish.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        let _ = self.shutdown.send(true);
        self.task.await
    }
}

struct Worker<C> {
    ctx: Arc<C>,
    bus: Arc<dyn PubSubBus>,
    router: PubSubRouter<C>,
    config: ListenerConfig,
    shutdown: watch::Receiver<bool>,
    state: watch::Sender<ListenerState>,
}

impl<C> Worker<C>
where
    C: Send + Sync + 'static,
{
    async fn run(mut self) {
        let channels = self.router.channels();
        let mut subscription = self.subscribe(&channels).await;

        while let Some(current) = subscription.as_mut() {
            if self.stopping() {
                break;
            }

            match current.get_message().await {
                Ok(Some(message)) => {
                    self.state.send_replace(ListenerState::Receiving);
                    self.dispatch(message).await;
                    tokio::task::yield_now().await;
                }
                Ok(None) => {
                    self.state.send_replace(ListenerState::Waiting);
                    self.pause().await;
                }
                Err(BusError::Closed) => {
                    warn!("Subscription closed; resubscribing");
                    subscription = self.subscribe(&channels).await;
                }
                Err(err) => {
                    warn!(error = %err, "Failed to poll subscription");
                    self.pause().await;
                }
            }
        }

        self.state.send_replace(ListenerState::Stopped);
        info!("Pub/sub listener stopped");
    }

    /// Subscribes, retrying every poll interval. `None` once shutdown is requested.
    async fn subscribe(&mut self, channels: &[String]) -> Option<Box<dyn Subscription>> {
        loop {
            if self.stopping() {
                return None;
            }

            match self.bus.subscribe(channels).await {
                Ok(subscription) => {
                    self.state.send_replace(ListenerState::Subscribed);
                    info!(channels = ?channels, "Listening for invalidation events");
                    return Some(subscription);
                }
                Err(err) => {
                    error!(error = %err, "Failed to subscribe to pub/sub channels");
                    self.pause().await;
                }
            }
        }
    }

    async fn dispatch(&self, message: Message) {
        let Message { channel, payload } = message;
        let Some(handler) = self.router.handler(&channel) else {
            warn!(channel = %channel, "No handler registered for channel");
            return;
        };

        let ctx = Arc::clone(&self.ctx);
        let started_at = Instant::now();
        let outcome = AssertUnwindSafe(async move { handler(ctx, payload).await })
            .catch_unwind()
            .await;

        histogram!(METRIC_HANDLER_MS, "channel" => channel.clone())
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        match outcome {
            Ok(Ok(())) => debug!(channel = %channel, "Handled pub/sub message"),
            Ok(Err(err)) => error!(
                channel = %channel,
                error = %err,
                chain = %ErrorReport::from_error(SOURCE, &err),
                "Pub/sub handler failed"
            ),
            Err(panic) => error!(
                channel = %channel,
                panic = %panic_message(panic.as_ref()),
                "Pub/sub handler panicked"
            ),
        }
    }

    /// Sleeps one poll interval, waking early on shutdown.
    async fn pause(&mut self) {
        tokio::select! {
            _ = tokio::time::sleep(self.config.poll_interval) => {}
            _ = self.shutdown.changed() => {}
        }
    }

    fn stopping(&self) -> bool {
        // A dropped handle counts as a shutdown request.
        *self.shutdown.borrow() || self.shutdown.has_changed().is_err()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
