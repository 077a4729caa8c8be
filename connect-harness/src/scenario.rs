//! Scripted user behavior for one harness run.

use anyhow::{bail, Context, Result};
use connectflow::{FlowCoordinator, SimulatedHost};
use serde_json::json;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// What the simulated user (and popup) do once the flow has started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Popup reports success.
    Success,
    /// Popup reports a failure with detail.
    Fail,
    /// User closes the popup.
    Cancel,
    /// User clicks connect twice, then the popup reports success.
    Double,
    /// Unrelated traffic, then a flow message with an unknown status.
    Garbage,
    /// A forged success from another origin, then the user closes the popup.
    Foreign,
}

impl FromStr for Scenario {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "success" => Scenario::Success,
            "fail" => Scenario::Fail,
            "cancel" => Scenario::Cancel,
            "double" => Scenario::Double,
            "garbage" => Scenario::Garbage,
            "foreign" => Scenario::Foreign,
            other => bail!(
                "unknown scenario '{}' (expected success, fail, cancel, double, garbage or foreign)",
                other
            ),
        })
    }
}

impl Scenario {
    /// Number of results the coordinator publishes for this scenario.
    pub fn expected_results(&self) -> usize {
        match self {
            Scenario::Double => 2,
            _ => 1,
        }
    }

    /// Play the scenario against a flow that was just initiated.
    pub async fn drive(
        &self,
        host: &SimulatedHost,
        coordinator: &FlowCoordinator,
        message_type: &str,
        origin: &str,
    ) -> Result<()> {
        info!(scenario = ?self, "Driving scenario");

        // Give the popup a moment, like a user reading the consent page
        tokio::time::sleep(Duration::from_millis(50)).await;

        match self {
            Scenario::Success => {
                post(host, origin, json!({"type": message_type, "status": "success"}))?;
            }
            Scenario::Fail => {
                post(
                    host,
                    origin,
                    json!({"type": message_type, "status": "fail", "message": "ACCESS_DENIED"}),
                )?;
            }
            Scenario::Cancel => close_popup(host)?,
            Scenario::Double => {
                coordinator.initiate_auth_flow();
                post(host, origin, json!({"type": message_type, "status": "success"}))?;
            }
            Scenario::Garbage => {
                post(host, origin, json!({"source": "devtools", "data": [1, 2, 3]}))?;
                post(host, origin, json!({"type": message_type, "status": "unknown"}))?;
            }
            Scenario::Foreign => {
                post(
                    host,
                    "https://attacker.invalid",
                    json!({"type": message_type, "status": "success"}),
                )?;
                close_popup(host)?;
            }
        }

        Ok(())
    }
}

fn post(host: &SimulatedHost, origin: &str, data: serde_json::Value) -> Result<()> {
    if !host.post_message(origin, data) {
        bail!("no message listener installed on host");
    }
    Ok(())
}

fn close_popup(host: &SimulatedHost) -> Result<()> {
    host.last_popup()
        .context("no popup was opened")?
        .user_close();
    Ok(())
}
