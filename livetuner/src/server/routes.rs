use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::api::FOLLOWS_SCOPE;
use crate::channel::UpdateMode;
use crate::media::PlaybackError;
use crate::util::time;

use super::AppState;

fn get_base_url(headers: &HeaderMap) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost:22708");
    format!("{scheme}://{host}")
}

fn redirect_uri(state: &AppState, headers: &HeaderMap) -> String {
    let base = match state.custom_domain.as_deref() {
        Some(domain) => domain.trim_end_matches('/').to_string(),
        None => get_base_url(headers),
    };
    format!("{base}/redirect")
}

pub async fn discover(headers: HeaderMap) -> impl IntoResponse {
    Json(super::lineup::discover(&get_base_url(&headers)))
}

pub async fn lineup_status() -> impl IntoResponse {
    Json(super::lineup::lineup_status())
}

/// Lineup endpoint. Refreshes channel membership only.
pub async fn lineup(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let channels = state.catalog.update(UpdateMode::RETRIEVE).await;
    Json(super::lineup::lineup(&channels, &get_base_url(&headers)))
}

/// EPG XML endpoint. Refreshes live status only.
pub async fn epg(State(state): State<AppState>) -> impl IntoResponse {
    let channels = state.catalog.update(UpdateMode::STATUS).await;
    let xml = super::epg::generate_epg(&channels, time::now(), &state.guide);
    ([(header::CONTENT_TYPE, "text/xml; charset=utf-8")], xml)
}

/// Live stream endpoint.
pub async fn get_stream(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Result<Response, StatusCode> {
    let session = state.proxy.open(&channel).await.map_err(|e| match &e {
        PlaybackError::UnknownChannel(_) => StatusCode::NOT_FOUND,
        PlaybackError::Offline(name) => {
            info!(channel = %name, "channel is offline, nothing to stream");
            StatusCode::NO_CONTENT
        }
        PlaybackError::StatusUnavailable(_) => {
            warn!(error = %e, "cannot stream");
            StatusCode::SERVICE_UNAVAILABLE
        }
        PlaybackError::Resolution { .. } => {
            error!(error = %e, "cannot stream");
            StatusCode::BAD_GATEWAY
        }
        PlaybackError::Spawn(_) => {
            error!(error = %e, "cannot stream");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    })?;

    debug!(
        channel = %session.channel.display_name,
        broadcast = %session.broadcast_id,
        url = %session.url,
        cached = session.cached,
        "serving stream"
    );
    let outcome = session.outcome;
    tokio::spawn(async move {
        if let Err(e) = outcome.await {
            error!(error = %e, "stream task panicked");
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp2t")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::PRAGMA, "no-cache")
        .header(header::EXPIRES, "0")
        .body(Body::from_stream(ReceiverStream::new(session.body)))
        .map_err(|e| {
            error!(error = %e, "failed to build stream response");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

/// Send the browser to the upstream consent page.
pub async fn authorize(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let url = state
        .broker
        .api()
        .authorize_url(&redirect_uri(&state, &headers), &[FOLLOWS_SCOPE]);
    Redirect::temporary(&url)
}

#[derive(Debug, Deserialize)]
pub struct RedirectParams {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// OAuth redirect target: exchange the code and install the user grant.
pub async fn redirect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<RedirectParams>,
) -> Result<&'static str, (StatusCode, String)> {
    let Some(code) = params.code else {
        let reason = params
            .error_description
            .or(params.error)
            .unwrap_or_else(|| "missing authorization code".to_string());
        warn!(%reason, "authorization was not granted");
        return Err((StatusCode::BAD_REQUEST, reason));
    };

    let grant = state
        .broker
        .api()
        .authorization_code(&code, &redirect_uri(&state, &headers))
        .await
        .map_err(|e| {
            error!(error = %e, "authorization code exchange failed");
            (StatusCode::BAD_GATEWAY, e.to_string())
        })?;

    if !state.broker.install_user_grant(grant).await {
        return Err((
            StatusCode::BAD_GATEWAY,
            "the granted token could not be verified".to_string(),
        ));
    }

    info!("user authorization installed, refreshing channels");
    let catalog = state.catalog.clone();
    tokio::spawn(async move {
        catalog
            .update(UpdateMode::RETRIEVE | UpdateMode::STATUS)
            .await;
    });

    Ok("Authorized. Followed channels will appear in the lineup shortly.")
}

pub async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}
