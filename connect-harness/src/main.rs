mod scenario;

use anyhow::{Context, Result};
use connectflow::config::apply_env_overrides;
use connectflow::{load_config, ConnectFlowConfig, FlowCoordinator, MessageBridge, SimulatedHost};
use scenario::Scenario;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Upper bound on how long the harness waits for each published result
const RESULT_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "connect_harness=info,connectflow=info".into()),
        )
        .init();

    // Usage: connect-harness [provider] [scenario]
    let mut args = std::env::args().skip(1);
    let provider_name = args.next().unwrap_or_else(|| "social".to_string());
    let scenario: Scenario = args.next().as_deref().unwrap_or("success").parse()?;

    let mut config = match std::env::var("CONNECT_FLOW_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => ConnectFlowConfig::default(),
    };
    apply_env_overrides(&mut config);

    let provider = config
        .provider(&provider_name)
        .with_context(|| format!("Provider '{}' is not configured", provider_name))?;
    let origin = provider
        .expected_origins()?
        .into_iter()
        .next()
        .context("Provider has no allowed origin")?;

    info!(
        provider = %provider.name,
        auth_url = %provider.authorization_url(),
        scenario = ?scenario,
        "Connect harness starting"
    );

    let host = Arc::new(SimulatedHost::new());
    let bridge = MessageBridge::new(&config.bridge);
    bridge.install(host.as_ref())?;

    let coordinator = FlowCoordinator::new(provider, host.clone(), bridge, &config)?;
    let mut results = coordinator.subscribe();

    coordinator.initiate_auth_flow();
    scenario
        .drive(&host, &coordinator, &config.bridge.message_type, &origin)
        .await?;

    for _ in 0..scenario.expected_results() {
        let result = tokio::time::timeout(RESULT_TIMEOUT, results.recv())
            .await
            .context("Timed out waiting for flow result")?
            .context("Result channel closed")?;
        println!("{}", serde_json::to_string(&result)?);
    }

    info!(popups_opened = host.opened_count(), "Connect harness finished");
    Ok(())
}
