//! Provider configurations.
//!
//! A provider only differs from another by where its authorization page
//! lives and which origins may report back; everything else about a flow is
//! shared.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Providers available without any configuration file.
pub const KNOWN_PROVIDERS: &[&str] = &["social", "accounting"];

/// Provider configuration injected into a flow coordinator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Short provider identifier (used in logs)
    pub name: String,

    /// Authorization page opened in the popup
    pub auth_url: String,

    /// Origins allowed to post completion messages.
    /// Empty means "the origin of `auth_url`".
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Extra query parameters appended to `auth_url`
    #[serde(default)]
    pub query: BTreeMap<String, String>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, auth_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            auth_url: auth_url.into(),
            allowed_origins: Vec::new(),
            query: BTreeMap::new(),
        }
    }

    pub fn with_allowed_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origins.push(origin.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// URL to open in the popup: `auth_url` plus the encoded query parameters.
    pub fn authorization_url(&self) -> String {
        if self.query.is_empty() {
            return self.auth_url.clone();
        }

        let params = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let separator = if self.auth_url.contains('?') { '&' } else { '?' };

        format!("{}{}{}", self.auth_url, separator, params)
    }

    /// Origins whose messages may finish a flow for this provider.
    ///
    /// Entries are normalized to what a browser reports as the sender
    /// origin: lowercase scheme and host, no path.
    pub fn expected_origins(&self) -> Result<Vec<String>> {
        if !self.allowed_origins.is_empty() {
            return self
                .allowed_origins
                .iter()
                .map(|o| {
                    origin_of(o).with_context(|| {
                        format!("Invalid allowed origin '{}' for provider '{}'", o, self.name)
                    })
                })
                .collect();
        }

        origin_of(&self.auth_url)
            .with_context(|| format!("Invalid auth_url for provider '{}'", self.name))
            .map(|origin| vec![origin])
    }
}

fn origin_of(url: &str) -> Result<String> {
    let url = Url::parse(url)?;
    Ok(url.origin().ascii_serialization())
}

/// Built-in provider configuration by name
pub fn builtin(name: &str) -> Option<ProviderConfig> {
    let auth_url = match name {
        "social" => "https://www.facebook.com/dialog/oauth",
        "accounting" => "https://appcenter.intuit.com/connect/oauth2",
        _ => return None,
    };
    Some(ProviderConfig::new(name, auth_url))
}

#[cfg(test)]
fn is_known_provider(name: &str) -> bool {
    KNOWN_PROVIDERS.contains(&name)
}
