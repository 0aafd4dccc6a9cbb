// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wiring from configuration to collaborators, and one driver per command.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::callback::serve_callback;
use crate::catalog::{spawn_catalog_follower, CatalogLoader, CatalogView};
use crate::config::{Command, Config};
use crate::fallback::FallbackSource;
use crate::location::{Location, MemoryLocation};
use crate::pages::PlaylistClient;
use crate::session::{AuthEvent, AuthState, CallbackOutcome, SessionManager};
use crate::storage::FileStorage;
use crate::store::Store;
use crate::token::TokenClient;

/// How often `catalog --watch` re-reads the persisted session.
const STORE_POLL: Duration = Duration::from_secs(5);

/// Upper bound on waiting for a startup refresh before loading the catalog.
const STARTUP_REFRESH_WAIT: Duration = Duration::from_secs(30);

/// Initialize tracing subscriber. Safe to call multiple times (subsequent
/// calls are silently ignored).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init(),
    };
    drop(result);
}

/// Collaborators built from one configuration.
pub struct App {
    pub store: Store,
    pub location: Arc<MemoryLocation>,
    pub session: Arc<SessionManager>,
    pub catalog: Arc<CatalogLoader>,
}

impl App {
    pub fn build(config: &Config) -> anyhow::Result<Self> {
        Self::with_store(config, Store::new(Arc::new(FileStorage::new(config.state_dir()))))
    }

    /// Build against an existing store instead of the state directory.
    pub fn with_store(config: &Config, store: Store) -> anyhow::Result<Self> {
        let http = crate::http::client();
        let auth = config.auth_config()?;
        let tokens = TokenClient::new(http.clone(), auth.token_url.clone());
        let playlists = PlaylistClient::new(http.clone(), &config.api_base()?, &config.collection)?;
        let fallback = FallbackSource::from_location(&config.fallback, http);

        let location = Arc::new(MemoryLocation::new(config.origin_url()?));
        let session = SessionManager::new(auth, store.clone(), tokens, location.clone());
        let catalog = CatalogLoader::new(store.clone(), playlists, fallback);
        Ok(Self { store, location, session, catalog })
    }
}

/// Run the configured command and return the process exit code.
pub async fn run(config: Config) -> anyhow::Result<i32> {
    let app = App::build(&config)?;
    let events = app.session.subscribe();
    app.session.restore();

    let result = match config.command.clone() {
        Command::Login { no_listen } => login(&app, &config, no_listen).await,
        Command::Callback { url } => callback(&app, &url).await,
        Command::Catalog { watch } => catalog(&app, watch, events).await,
        Command::Status => Ok(status(&app)),
        Command::Logout => {
            app.session.disconnect();
            println!("disconnected");
            Ok(0)
        }
    };
    app.session.shutdown();
    result
}

pub async fn login(app: &App, config: &Config, no_listen: bool) -> anyhow::Result<i32> {
    let url = app.session.initiate_login()?;
    println!("{url}");
    if no_listen {
        eprintln!("open the URL above, then run: museum callback '<redirected URL>'");
        return Ok(0);
    }

    let redirect = config
        .redirect_uri()
        .ok_or_else(|| anyhow::anyhow!("no redirect URI configured"))?;
    let redirect = Url::parse(&redirect)?;
    let host = redirect
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("redirect URI has no host: {redirect}"))?
        .to_owned();
    let port = redirect
        .port_or_known_default()
        .ok_or_else(|| anyhow::anyhow!("redirect URI has no port: {redirect}"))?;
    let listener = TcpListener::bind((host.as_str(), port)).await?;

    let cancel = cancel_on_ctrl_c();
    let result = serve_callback(
        listener,
        Arc::clone(&app.session),
        app.location.clone(),
        redirect,
        cancel,
    )
    .await?;
    match result {
        None => {
            info!("login abandoned");
            Ok(130)
        }
        Some(result) => report_callback(result),
    }
}

pub async fn callback(app: &App, url: &str) -> anyhow::Result<i32> {
    app.location.replace(Url::parse(url)?);
    let cancel = cancel_on_ctrl_c();
    let result = app.session.handle_callback(&cancel).await;
    report_callback(result)
}

fn report_callback(result: Result<CallbackOutcome, crate::error::AuthError>) -> anyhow::Result<i32> {
    match result? {
        CallbackOutcome::Connected => {
            println!("connected");
            Ok(0)
        }
        CallbackOutcome::ProviderError(reason) => {
            eprintln!("login failed: {reason}");
            Ok(1)
        }
        CallbackOutcome::NotACallback => {
            eprintln!("URL carries neither code nor error");
            Ok(2)
        }
    }
}

pub async fn catalog(
    app: &App,
    follow: bool,
    mut events: broadcast::Receiver<AuthEvent>,
) -> anyhow::Result<i32> {
    if app.session.state() == AuthState::Expired && app.session.refresh_armed() {
        await_refresh(&mut events).await;
    }

    if !follow {
        app.catalog.load(app.session.access_token()).await;
        let view = app.catalog.view();
        print_view(&view);
        return Ok(if view.error.is_some() { 1 } else { 0 });
    }

    let shutdown = cancel_on_ctrl_c();
    let (entered_tx, entered_rx) = watch::channel(true);
    let follower = spawn_catalog_follower(
        Arc::clone(&app.catalog),
        app.session.watch_token(),
        entered_rx,
        shutdown.clone(),
    );

    let mut views = app.catalog.subscribe();
    let mut poll = tokio::time::interval(STORE_POLL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                if !view.loading {
                    print_view(&view);
                }
            }
            event = events.recv() => match event {
                Ok(AuthEvent::RefreshFailed { error }) => warn!(err = %error, "token refresh failed"),
                Ok(AuthEvent::Disconnected) => info!("session ended"),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = poll.tick() => app.session.reload_from_store(),
        }
    }

    drop(entered_tx);
    follower.await?;
    Ok(0)
}

/// Wait for the first refresh outcome after startup, bounded.
async fn await_refresh(events: &mut broadcast::Receiver<AuthEvent>) {
    let outcome = tokio::time::timeout(STARTUP_REFRESH_WAIT, async {
        loop {
            match events.recv().await {
                Ok(AuthEvent::Refreshed { .. }) => return true,
                Ok(AuthEvent::RefreshFailed { .. }) => return false,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return false,
            }
        }
    })
    .await;
    match outcome {
        Ok(true) => info!("stale session refreshed"),
        Ok(false) => warn!("stale session could not be refreshed"),
        Err(_) => warn!("timed out waiting for session refresh"),
    }
}

pub fn status(app: &App) -> i32 {
    let state = app.session.state();
    println!("state: {state}");
    if let Some(session) = app.session.session() {
        println!("expires_at: {}", session.expires_at);
        println!("scope: {}", session.scope);
        println!("refresh: {}", if app.session.refresh_armed() { "armed" } else { "off" });
    }
    let cached = app.store.get_cache().map_or(0, |c| c.len());
    println!("cached playlists: {cached}");
    0
}

fn print_view(view: &CatalogView) {
    if let Some(ref error) = view.error {
        eprintln!("error: {error}");
    }
    if view.entries.is_empty() {
        println!("(no playlists)");
    }
    for entry in &view.entries {
        let tracks = entry.tracks.map(|n| n.to_string()).unwrap_or_default();
        let artist = entry.top_artist.as_deref().unwrap_or("");
        println!("{}\t{tracks}\t{artist}\t{}", entry.title, entry.link);
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let sd = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received SIGINT");
            sd.cancel();
        }
    });
    token
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
