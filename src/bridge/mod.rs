//! Cross-window message bridge.
//!
//! One listener is installed on the host for the lifetime of the page. It
//! filters posted messages down to flow messages and broadcasts the decoded
//! [`BridgeEvent`]s; flows observe the broadcast rather than installing
//! listeners of their own.

mod protocol;

pub use protocol::{decode, Decoded, WindowMessage};

use crate::config::BridgeConfig;
use crate::flow::FlowStatus;
use crate::popup::PopupHost;
use anyhow::{bail, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Callback the host invokes for every message posted to the opener window.
pub type MessageListener = Arc<dyn Fn(WindowMessage) + Send + Sync>;

/// A decoded flow message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeEvent {
    pub origin: String,
    pub status: FlowStatus,
}

pub struct MessageBridge {
    message_type: String,
    events_tx: broadcast::Sender<BridgeEvent>,
    installed: AtomicBool,
}

impl MessageBridge {
    pub fn new(config: &BridgeConfig) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            message_type: config.message_type.clone(),
            events_tx,
            installed: AtomicBool::new(false),
        })
    }

    /// Install the page-wide listener on `host`. Refuses a second install.
    pub fn install(self: &Arc<Self>, host: &dyn PopupHost) -> Result<()> {
        if self.installed.swap(true, Ordering::SeqCst) {
            bail!("message listener already installed");
        }

        let bridge = Arc::clone(self);
        host.set_message_listener(Arc::new(move |message: WindowMessage| bridge.receive(message)));

        info!(message_type = %self.message_type, "Cross-window message listener installed");
        Ok(())
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    /// Handle one posted message. Safe to call from any thread.
    pub fn receive(&self, message: WindowMessage) {
        let status = match decode(&message.data, &self.message_type) {
            Decoded::Ignored => {
                debug!(origin = %message.origin, "Ignoring unrelated window message");
                return;
            }
            Decoded::Status(status) => status,
            Decoded::Malformed { status, fallback } => {
                warn!(
                    origin = %message.origin,
                    status = status.as_deref().unwrap_or("<missing>"),
                    "Unrecognized flow status, treating as failure"
                );
                fallback
            }
        };

        debug!(origin = %message.origin, status = %status, "Flow message received");

        // No observers just means no flow is in flight
        let _ = self.events_tx.send(BridgeEvent {
            origin: message.origin,
            status,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events_tx.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn observer_count(&self) -> usize {
        self.events_tx.receiver_count()
    }
}
