// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use url::Url;

use crate::session::{AuthConfig, DEFAULT_SCOPES};

/// Spotify playlist catalog for the digital museum.
#[derive(Debug, Parser)]
#[command(name = "museum", version, about)]
pub struct Config {
    /// Spotify application client id.
    #[arg(long, env = "SPOTIFY_CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    /// Redirect URI registered with Spotify. Defaults to `<origin>/callback`.
    #[arg(long, env = "SPOTIFY_REDIRECT_URI", global = true)]
    pub redirect_uri: Option<String>,

    /// Origin the app is served from.
    #[arg(long, env = "MUSEUM_ORIGIN", default_value = "http://127.0.0.1:8888", global = true)]
    pub origin: String,

    /// Accounts service base URL (authorize and token endpoints).
    #[arg(
        long,
        env = "SPOTIFY_ACCOUNTS_URL",
        default_value = "https://accounts.spotify.com",
        global = true
    )]
    pub accounts_url: String,

    /// Web API base URL.
    #[arg(long, env = "SPOTIFY_API_URL", default_value = "https://api.spotify.com", global = true)]
    pub api_url: String,

    /// Collection fetched under `/v1/me/`.
    #[arg(long, env = "MUSEUM_COLLECTION", default_value = "playlists", global = true)]
    pub collection: String,

    /// Space-separated OAuth scopes.
    #[arg(long, env = "SPOTIFY_SCOPES", global = true)]
    pub scopes: Option<String>,

    /// Static fallback document: a file path or an http(s) URL. Empty disables it.
    #[arg(long, env = "MUSEUM_FALLBACK", default_value = "playlists.json", global = true)]
    pub fallback: String,

    /// Directory for persisted session and cache records.
    #[arg(long, env = "MUSEUM_STATE_DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "MUSEUM_LOG", default_value = "info", global = true)]
    pub log_level: String,

    /// Log format (json or text).
    #[arg(long, env = "MUSEUM_LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Start a login and wait for the provider's redirect.
    Login {
        /// Print the authorize URL and exit without listening for the callback.
        #[arg(long)]
        no_listen: bool,
    },
    /// Complete a login from a pasted callback URL.
    Callback {
        /// Full redirect URL including `code` and `state`.
        url: String,
    },
    /// Load and print the playlist catalog.
    Catalog {
        /// Keep running, reloading on token refresh and state changes.
        #[arg(long)]
        watch: bool,
    },
    /// Show the current auth state.
    Status,
    /// Forget the session and any pending login.
    Logout,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        parse_http_url("--origin", &self.origin)?;
        parse_http_url("--accounts-url", &self.accounts_url)?;
        parse_http_url("--api-url", &self.api_url)?;
        if let Some(redirect) = self.redirect_uri() {
            parse_http_url("--redirect-uri", &redirect)?;
        }
        if self.collection.trim().is_empty() || self.collection.contains('/') {
            anyhow::bail!("invalid --collection: {:?}", self.collection);
        }
        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("invalid --log-format: {} (expected json or text)", self.log_format);
        }
        if let Command::Callback { url } = &self.command {
            Url::parse(url).map_err(|e| anyhow::anyhow!("invalid callback URL: {e}"))?;
        }
        Ok(())
    }

    /// Client id with wrapping quotes and whitespace removed.
    pub fn client_id(&self) -> Option<String> {
        self.client_id.as_deref().and_then(strip_wrapping)
    }

    /// Configured redirect URI, else `<origin>/callback`.
    pub fn redirect_uri(&self) -> Option<String> {
        self.redirect_uri.as_deref().and_then(strip_wrapping).or_else(|| {
            let origin = self.origin.trim().trim_end_matches('/');
            (!origin.is_empty()).then(|| format!("{origin}/callback"))
        })
    }

    pub fn scopes(&self) -> Vec<String> {
        match self.scopes.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s.split_whitespace().map(str::to_owned).collect(),
            None => DEFAULT_SCOPES.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    pub fn origin_url(&self) -> anyhow::Result<Url> {
        parse_http_url("--origin", &self.origin)
    }

    pub fn api_base(&self) -> anyhow::Result<Url> {
        parse_http_url("--api-url", &self.api_url)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(crate::storage::default_state_dir)
    }

    /// Library-level auth configuration. Missing client registration stays
    /// `None` so login fails with a typed error rather than here.
    pub fn auth_config(&self) -> anyhow::Result<AuthConfig> {
        let accounts = parse_http_url("--accounts-url", &self.accounts_url)?;
        let mut config = AuthConfig::for_accounts(&accounts)?;
        config.client_id = self.client_id();
        config.redirect_uri = self.redirect_uri();
        config.scopes = self.scopes();
        Ok(config)
    }

    /// Build a minimal `Config` for tests.
    #[doc(hidden)]
    pub fn test() -> Self {
        Self {
            client_id: Some("test-client".into()),
            redirect_uri: None,
            origin: "http://127.0.0.1:8888".into(),
            accounts_url: "https://accounts.spotify.com".into(),
            api_url: "https://api.spotify.com".into(),
            collection: "playlists".into(),
            scopes: None,
            fallback: String::new(),
            state_dir: None,
            log_level: "debug".into(),
            log_format: "text".into(),
            command: Command::Status,
        }
    }
}

/// Trim whitespace and one layer of matching single or double quotes.
/// Empty after stripping counts as unset.
pub fn strip_wrapping(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| trimmed.strip_prefix(*q).and_then(|rest| rest.strip_suffix(*q)))
        .unwrap_or(trimmed)
        .trim();
    (!unquoted.is_empty()).then(|| unquoted.to_owned())
}

fn parse_http_url(flag: &str, value: &str) -> anyhow::Result<Url> {
    let url = Url::parse(value.trim()).map_err(|e| anyhow::anyhow!("invalid {flag}: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("invalid {flag}: expected an http(s) URL, got {value}");
    }
    Ok(url)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
