// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! HTTP front for widgeon: signed callbacks, remote calls, widget assets and
//! single-widget previews, with sessions held in memory.

mod app;
mod error;
mod prefs;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use widgeon_core::{PayloadCodec, Registry};
use widgeon_fs::{FsConfigStore, FsTemplateEngine, FsWidgetSource};

use crate::app::AppState;
use crate::prefs::{Args, ServerPrefs};

/// Environment variable holding the payload signing secret.
const SECRET_ENV: &str = "WIDGEON_SECRET";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let store = match &args.config_dir {
        Some(dir) => FsConfigStore::with_base(dir),
        None => FsConfigStore::new(),
    }
    .context("open preferences store")?;
    let prefs = ServerPrefs::load(store, &args).context("load server preferences")?;

    let codec = PayloadCodec::from_secret(signing_secret()).context("signing key")?;
    let registry = Registry::new(
        Arc::new(FsWidgetSource::new(&prefs.widgets_root)),
        codec,
        prefs.settings(),
    );
    let templates = Arc::new(FsTemplateEngine::new(&prefs.widgets_root));
    let app = app::router(Arc::new(AppState::new(
        registry,
        templates,
        prefs.session_limits(),
    )));

    let listener = tokio::net::TcpListener::bind(prefs.listen)
        .await
        .with_context(|| format!("bind {}", prefs.listen))?;
    info!(
        listen = %prefs.listen,
        widgets = %prefs.widgets_root.display(),
        mount = %prefs.mount,
        "widgeon server listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("widgeon server stopped");
    Ok(())
}

fn signing_secret() -> String {
    match std::env::var(SECRET_ENV) {
        Ok(secret) if !secret.is_empty() => secret,
        _ => {
            warn!("{SECRET_ENV} is not set; signing with a random per-process secret");
            hex::encode(rand::random::<[u8; 32]>())
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "failed to listen for ctrl-c");
    }
}
