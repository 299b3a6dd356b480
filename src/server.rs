//! HTTP front end for the speaker.
//!
//! ## Endpoints
//!
//! - `GET /health`: liveness probe
//! - `POST /speak`: synthesize text, returns a base64 WAV payload

use crate::config::ServerConfig;
use crate::decode::SamplingOverrides;
use crate::error::{Result, SpeakerError};
use crate::tts::{SharedSpeaker, SpeechService, shared, speak_encoded};
use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// `POST /speak` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakRequest {
    /// Text to speak.
    pub text: String,
    /// Sampling overrides for this request only.
    #[serde(flatten)]
    pub overrides: SamplingOverrides,
}

/// `POST /speak` reply, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SpeakResponse {
    Ok {
        /// Text actually spoken, after sanitising.
        text: String,
        /// Base64 of a 16-bit PCM mono WAV file.
        audio_b64: String,
        sample_rate: u32,
    },
    Error {
        message: String,
        /// Stable machine-readable error code.
        code: String,
    },
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

struct AppState<S> {
    speaker: SharedSpeaker<S>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            speaker: self.speaker.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// SpeakerServer
// ---------------------------------------------------------------------------

/// HTTP server owning one shared speaker.
pub struct SpeakerServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
    cancel: Option<CancellationToken>,
}

impl SpeakerServer {
    /// Start serving `speaker` on `{config.host}:{config.port}`.
    ///
    /// Port `0` picks a free port; see [`addr`](Self::addr).
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot bind.
    pub async fn start<S: SpeechService>(speaker: S, config: &ServerConfig) -> Result<Self> {
        let cancel = speaker.cancellation_token();
        let state = AppState {
            speaker: shared(speaker),
        };

        let app = Router::new()
            .route("/health", get(handle_health))
            .route("/speak", post(handle_speak::<S>))
            .with_state(state);

        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| SpeakerError::Server(format!("bind {bind_addr} failed: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| SpeakerError::Server(format!("failed to get local addr: {e}")))?;

        info!("speaker server listening on http://{addr}");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("speaker server error: {e}");
            }
        });

        Ok(Self {
            addr,
            handle,
            cancel,
        })
    }

    /// Returns the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Cancel in-flight decoding and abort the server task.
    pub fn shutdown(&self) {
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
        self.handle.abort();
    }
}

impl Drop for SpeakerServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// `GET /health`
async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `POST /speak`
async fn handle_speak<S: SpeechService>(
    State(state): State<AppState<S>>,
    payload: std::result::Result<Json<SpeakRequest>, JsonRejection>,
) -> (StatusCode, Json<SpeakResponse>) {
    let request_id = Uuid::new_v4();
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let err = SpeakerError::InvalidRequest(rejection.body_text());
            return error_reply(request_id, &err);
        }
    };
    info!(%request_id, chars = request.text.len(), "speak request");

    match speak_encoded(state.speaker, request.text, request.overrides).await {
        Ok(speech) => (
            StatusCode::OK,
            Json(SpeakResponse::Ok {
                text: speech.text,
                audio_b64: speech.audio_b64,
                sample_rate: speech.sample_rate,
            }),
        ),
        Err(e) => error_reply(request_id, &e),
    }
}

fn error_reply(request_id: Uuid, e: &SpeakerError) -> (StatusCode, Json<SpeakResponse>) {
    let status = if e.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    warn!(%request_id, error = %e, "speak request failed");
    (
        status,
        Json(SpeakResponse::Error {
            message: e.to_string(),
            code: e.code().to_owned(),
        }),
    )
}
