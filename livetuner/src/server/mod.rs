pub mod epg;
pub mod lineup;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::any};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::CredentialBroker;
use crate::channel::ChannelCatalog;
use crate::media::StreamProxy;

pub use epg::GuideOptions;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<ChannelCatalog>,
    pub proxy: Arc<StreamProxy>,
    pub broker: Arc<CredentialBroker>,
    pub guide: GuideOptions,
    /// Public base URL used for the OAuth redirect instead of the request host.
    pub custom_domain: Option<String>,
}

/// Build the tuner router. Clients use assorted verbs, so every route takes any method.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/discover.json", any(routes::discover))
        .route("/lineup_status.json", any(routes::lineup_status))
        .route("/lineup.json", any(routes::lineup))
        .route("/lineup.post", any(routes::lineup))
        .route("/epg.xml", any(routes::epg))
        .route("/getStream/{channel}", any(routes::get_stream))
        .route("/authorize", any(routes::authorize))
        .route("/redirect", any(routes::redirect))
        .route("/favicon.ico", any(routes::favicon))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server.
pub async fn run_server(
    addr: SocketAddr,
    state: AppState,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow_and_update() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;

    Ok(())
}
