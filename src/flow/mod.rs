//! Popup connect flows.
//!
//! ```text
//!            initiate_auth_flow()
//!   Idle ──────────────────────────► Connecting ──┐
//!    ▲                                            │ message │ popup closed │ deadline
//!    └────────────── one FlowResult ◄─────────────┘
//! ```

mod coordinator;
mod result;

pub use coordinator::{FlowCoordinator, FlowId, FLOW_TIMEOUT, POPUP_BLOCKED};
pub use result::{FlowResult, FlowStatus};
