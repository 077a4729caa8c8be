use super::ConnectFlowConfig;
use crate::provider::KNOWN_PROVIDERS;
use tracing::warn;

/// Apply `CONNECT_FLOW_*` environment variables on top of `config`.
pub fn apply_env_overrides(config: &mut ConnectFlowConfig) {
    apply_overrides(config, |key| std::env::var(key).ok());
}

/// Apply overrides from an arbitrary key lookup, falling back to what is
/// already configured when a value is missing or unparsable.
pub fn apply_overrides<F>(config: &mut ConnectFlowConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(n) = parsed(&lookup, "CONNECT_FLOW_POPUP_WIDTH") {
        config.popup.width = n;
    }
    if let Some(n) = parsed(&lookup, "CONNECT_FLOW_POPUP_HEIGHT") {
        config.popup.height = n;
    }
    if let Some(n) = parsed(&lookup, "CONNECT_FLOW_POLL_INTERVAL_MS") {
        config.poller.interval_ms = n;
    }
    if let Some(n) = parsed(&lookup, "CONNECT_FLOW_MAX_DURATION_SECONDS") {
        config.flow.max_duration_seconds = n;
    }
    if let Some(v) = lookup("CONNECT_FLOW_MESSAGE_TYPE") {
        config.bridge.message_type = v;
    }

    let mut names: Vec<String> = KNOWN_PROVIDERS.iter().map(|s| s.to_string()).collect();
    for name in config.providers.keys() {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }

    for name in names {
        let key = format!("CONNECT_FLOW_{}_AUTH_URL", name.to_uppercase().replace('-', "_"));
        if let Some(url) = lookup(&key) {
            config.providers.entry(name).or_default().auth_url = Some(url);
        }
    }
}

fn parsed<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key = %key, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}
