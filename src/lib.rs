//! Popup-based third-party connect flows.
//!
//! A [`FlowCoordinator`] opens a provider's authorization page in a popup,
//! then waits for whichever comes first: a completion message posted back by
//! the popup, the user closing the popup, or the flow deadline. Exactly one
//! [`FlowResult`] is published per accepted flow.
//!
//! ```no_run
//! use connectflow::{ConnectFlowConfig, FlowCoordinator, MessageBridge, SimulatedHost};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ConnectFlowConfig::default();
//! let host = Arc::new(SimulatedHost::new());
//!
//! // One listener for the lifetime of the page
//! let bridge = MessageBridge::new(&config.bridge);
//! bridge.install(host.as_ref())?;
//!
//! let provider = config.provider("accounting").expect("built-in provider");
//! let coordinator = FlowCoordinator::new(provider, host, bridge, &config)?;
//!
//! let mut results = coordinator.subscribe();
//! coordinator.initiate_auth_flow();
//! let result = results.recv().await?;
//! println!("connected: {}", result.succeeded);
//! # Ok(())
//! # }
//! ```

// Flow state machine and result model
pub mod flow;

// Popup geometry and host abstraction
pub mod popup;

// Closed-window polling
pub mod poller;

// Cross-window message bridge
pub mod bridge;

// Provider configurations
pub mod provider;

// TOML + environment configuration
pub mod config;

// In-memory host for tests and the harness
pub mod sim;

pub use bridge::{BridgeEvent, MessageBridge, WindowMessage};
pub use config::{load_config, ConnectFlowConfig};
pub use flow::{FlowCoordinator, FlowId, FlowResult, FlowStatus};
pub use popup::{PopupHost, PopupWindow, ScreenMetrics, WindowFeatures};
pub use provider::ProviderConfig;
pub use sim::SimulatedHost;
