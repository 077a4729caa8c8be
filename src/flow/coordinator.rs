use crate::bridge::{BridgeEvent, MessageBridge};
use crate::config::ConnectFlowConfig;
use crate::flow::result::{FlowResult, FlowStatus};
use crate::poller::{ClosedWindowPoller, PollTimerHandle};
use crate::popup::{PopupHandle, PopupHost, PopupWindowManager};
use crate::provider::ProviderConfig;
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Failure message published when the host refuses to open the popup.
pub const POPUP_BLOCKED: &str = "POPUP_BLOCKED";

/// Failure message published when a flow outlives `flow.max_duration_seconds`.
pub const FLOW_TIMEOUT: &str = "FLOW_TIMEOUT";

/// Identifies one accepted flow attempt.
pub type FlowId = Uuid;

/// Resources owned by the flow currently in flight.
struct ActiveFlow {
    id: FlowId,
    started_at: Instant,
    popup: PopupHandle,
    poll_timer: PollTimerHandle,
    observer: JoinHandle<()>,
}

enum FlightState {
    Idle,
    Connecting(ActiveFlow),
}

impl FlightState {
    /// Move the active flow out, leaving `Idle`, if it matches `expected`
    /// (`None` matches any flow).
    fn take(&mut self, expected: Option<FlowId>) -> Option<ActiveFlow> {
        let matches = match self {
            FlightState::Connecting(active) => expected.map_or(true, |id| id == active.id),
            FlightState::Idle => false,
        };
        if !matches {
            return None;
        }

        match std::mem::replace(self, FlightState::Idle) {
            FlightState::Connecting(active) => Some(active),
            FlightState::Idle => None,
        }
    }
}

struct Inner {
    provider: ProviderConfig,
    expected_origins: Vec<String>,
    popups: PopupWindowManager,
    poller: ClosedWindowPoller,
    bridge: Arc<MessageBridge>,
    runtime: Handle,
    max_duration: Option<Duration>,
    state: Mutex<FlightState>,
    results_tx: broadcast::Sender<FlowResult>,
}

/// Runs popup connect flows for one provider, one at a time.
///
/// Every accepted [`initiate_auth_flow`](Self::initiate_auth_flow) publishes
/// exactly one [`FlowResult`], whichever of the message, the closed window or
/// the deadline ends the flow first. Re-triggering while a flow is in flight
/// publishes an immediate rejection and leaves the running flow alone.
///
/// Cloning is cheap; clones share the same flow state.
#[derive(Clone)]
pub struct FlowCoordinator {
    inner: Arc<Inner>,
}

impl FlowCoordinator {
    /// Create a coordinator for `provider`.
    ///
    /// Must be called inside a tokio runtime: poll timers and message
    /// observers run on that runtime, whatever thread the host delivers
    /// messages on.
    pub fn new(
        provider: ProviderConfig,
        host: Arc<dyn PopupHost>,
        bridge: Arc<MessageBridge>,
        config: &ConnectFlowConfig,
    ) -> Result<Self> {
        let runtime =
            Handle::try_current().context("FlowCoordinator must be created inside a tokio runtime")?;
        let expected_origins = provider.expected_origins()?;

        if !bridge.is_installed() {
            warn!(provider = %provider.name, "Message bridge not installed, flows can only end by closing the popup");
        }

        let (results_tx, _) = broadcast::channel(16);

        Ok(Self {
            inner: Arc::new(Inner {
                expected_origins,
                popups: PopupWindowManager::new(host, &config.popup),
                poller: ClosedWindowPoller::new(config.poller.interval()),
                bridge,
                runtime,
                max_duration: config.flow.max_duration(),
                state: Mutex::new(FlightState::Idle),
                results_tx,
                provider,
            }),
        })
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.inner.provider
    }

    pub fn is_connecting(&self) -> bool {
        matches!(*self.inner.lock_state(), FlightState::Connecting(_))
    }

    /// Id of the flow in flight, if any.
    pub fn current_flow(&self) -> Option<FlowId> {
        match &*self.inner.lock_state() {
            FlightState::Connecting(active) => Some(active.id),
            FlightState::Idle => None,
        }
    }

    /// Subscribe to published results. Results sent before subscribing are missed.
    pub fn subscribe(&self) -> broadcast::Receiver<FlowResult> {
        self.inner.results_tx.subscribe()
    }

    /// Published results as a stream (lagged results are skipped).
    pub fn results(&self) -> impl futures::Stream<Item = FlowResult> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(|r| r.ok())
    }

    /// Start a flow: open the popup, start polling, observe the bridge.
    ///
    /// Never fails; every outcome arrives on the result stream.
    pub fn initiate_auth_flow(&self) {
        let inner = &self.inner;
        let mut state = inner.lock_state();

        if let FlightState::Connecting(active) = &*state {
            let id = active.id;
            drop(state);
            info!(provider = %inner.provider.name, flow_id = %id, "Flow already in flight, rejecting re-trigger");
            inner.publish(FlowResult::rejected());
            return;
        }

        let url = inner.provider.authorization_url();
        let Some(popup) = inner.popups.open(&url) else {
            drop(state);
            warn!(provider = %inner.provider.name, "Popup blocked, failing flow");
            inner.publish(FlowStatus::fail(POPUP_BLOCKED).into());
            return;
        };

        let id = Uuid::new_v4();

        // Subscribe before releasing the lock so no message can slip past
        let events = inner.bridge.subscribe();
        let observer = inner
            .runtime
            .spawn(observe_messages(Arc::downgrade(inner), id, events));

        let weak = Arc::downgrade(inner);
        let poll_timer = inner.poller.start(&inner.runtime, move || {
            if let Some(inner) = weak.upgrade() {
                inner.poll(Some(id), true);
            }
        });

        *state = FlightState::Connecting(ActiveFlow {
            id,
            started_at: Instant::now(),
            popup,
            poll_timer,
            observer,
        });

        info!(
            provider = %inner.provider.name,
            flow_id = %id,
            poll_interval_ms = inner.poller.period().as_millis() as u64,
            "Flow started"
        );
    }

    /// Terminate the flow in flight with `status`. No-op when idle.
    pub fn finish_flow(&self, status: FlowStatus) {
        self.inner.finish(None, status);
    }

    /// Finish with `Cancel` if the popup of the flow in flight was closed.
    pub fn check_if_closed(&self) {
        self.inner.poll(None, false);
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, FlightState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn accepts_origin(&self, origin: &str) -> bool {
        let origin = origin.trim_end_matches('/');
        self.expected_origins.iter().any(|o| o == origin)
    }

    fn finish(&self, expected: Option<FlowId>, status: FlowStatus) -> bool {
        let active = self.lock_state().take(expected);
        match active {
            Some(active) => {
                self.release(active, status);
                true
            }
            None => {
                debug!(provider = %self.provider.name, status = %status, "No matching flow in flight, ignoring");
                false
            }
        }
    }

    /// Check the popup (and optionally the deadline) of the flow in flight.
    fn poll(&self, expected: Option<FlowId>, check_deadline: bool) {
        let finished = {
            let mut state = self.lock_state();
            let status = match &*state {
                FlightState::Connecting(active) if expected.map_or(true, |id| id == active.id) => {
                    if active.popup.is_closed() {
                        Some(FlowStatus::Cancel)
                    } else if check_deadline
                        && self
                            .max_duration
                            .is_some_and(|max| active.started_at.elapsed() >= max)
                    {
                        Some(FlowStatus::fail(FLOW_TIMEOUT))
                    } else {
                        None
                    }
                }
                _ => None,
            };
            status.and_then(|status| state.take(expected).map(|active| (active, status)))
        };

        if let Some((active, status)) = finished {
            if status == FlowStatus::Cancel {
                debug!(provider = %self.provider.name, flow_id = %active.id, "Popup closed by user");
            } else {
                warn!(provider = %self.provider.name, flow_id = %active.id, "Flow exceeded maximum duration");
            }
            self.release(active, status);
        }
    }

    /// Tear down a flow that has already left the state. The state is `Idle`
    /// before anything is published; the poll timer goes last.
    fn release(&self, active: ActiveFlow, status: FlowStatus) {
        let ActiveFlow {
            id,
            started_at,
            popup,
            mut poll_timer,
            observer,
        } = active;

        popup.close();
        observer.abort();

        info!(
            provider = %self.provider.name,
            flow_id = %id,
            status = %status,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Flow finished"
        );
        self.publish(status.into());

        poll_timer.cancel();
    }

    fn publish(&self, result: FlowResult) {
        if self.results_tx.send(result).is_err() {
            debug!(provider = %self.provider.name, "No result subscribers");
        }
    }
}

impl Drop for Inner {
    /// The last coordinator clone is gone: close the popup of an unfinished
    /// flow and stop its observer. Nothing is published.
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        let Some(active) = state.take(None) else {
            return;
        };

        debug!(provider = %self.provider.name, flow_id = %active.id, "Coordinator dropped mid-flow, releasing popup");
        active.popup.close();
        active.observer.abort();
        // poll_timer cancels itself on drop
    }
}

/// Wait for the first bridge event from an accepted origin and finish flow `id` with it.
async fn observe_messages(
    inner: Weak<Inner>,
    id: FlowId,
    mut events: broadcast::Receiver<BridgeEvent>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                if !inner.accepts_origin(&event.origin) {
                    warn!(
                        provider = %inner.provider.name,
                        flow_id = %id,
                        origin = %event.origin,
                        "Ignoring flow message from unexpected origin"
                    );
                    continue;
                }
                inner.finish(Some(id), event.status);
                return;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(flow_id = %id, skipped = skipped, "Message observer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(flow_id = %id, "Message bridge closed");
                return;
            }
        }
    }
}
