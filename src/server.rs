//! HTTP surface.
//!
//! Every webhook is acknowledged immediately and the actual work runs on a
//! detached task, so neither the forms backend nor the chat platform waits
//! on our downstream calls. Volume is human-paced; no backpressure.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::workflow::Workflow;

pub fn router(workflow: Arc<Workflow>) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/webhook/workout", post(workout_submission))
        .route("/webhook/workoutdelete", post(delete_request))
        .route("/webhook/slack", post(slack_interaction))
        .route("/trigger/checkunapproved", post(check_unapproved))
        .with_state(workflow)
}

pub async fn serve(bind: &str, workflow: Arc<Workflow>) -> Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address: {bind}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, router(workflow))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server stopped")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "could not install shutdown handler");
    }
}

async fn status() -> &'static str {
    "Service is running."
}

async fn workout_submission(
    State(workflow): State<Arc<Workflow>>,
    Json(payload): Json<Value>,
) -> StatusCode {
    tokio::spawn(async move {
        if let Err(err) = workflow.handle_submission(&payload).await {
            warn!(?err, "workout submission handling failed");
        }
    });
    StatusCode::OK
}

async fn delete_request(
    State(workflow): State<Arc<Workflow>>,
    Json(payload): Json<Value>,
) -> StatusCode {
    tokio::spawn(async move {
        if let Err(err) = workflow.handle_delete_request(&payload).await {
            warn!(?err, "delete request handling failed");
        }
    });
    StatusCode::OK
}

/// Interactivity payloads arrive form-encoded with the JSON in `payload`.
#[derive(Debug, Deserialize)]
struct InteractionForm {
    payload: String,
}

async fn slack_interaction(
    State(workflow): State<Arc<Workflow>>,
    Form(form): Form<InteractionForm>,
) -> StatusCode {
    let payload: Value = match serde_json::from_str(&form.payload) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(?err, "unparseable interaction payload");
            return StatusCode::BAD_REQUEST;
        }
    };
    match payload.get("type").and_then(Value::as_str) {
        Some("block_actions") => {
            tokio::spawn(async move {
                if let Err(err) = workflow.handle_action(&payload).await {
                    warn!(?err, "operator action handling failed");
                }
            });
            StatusCode::OK
        }
        Some("view_submission") => {
            tokio::spawn(async move {
                if let Err(err) = workflow.handle_view_submission(&payload).await {
                    warn!(?err, "edit submission handling failed");
                }
            });
            StatusCode::OK
        }
        other => {
            warn!(interaction_type = ?other, "unhandled interaction type");
            StatusCode::BAD_REQUEST
        }
    }
}

async fn check_unapproved(State(workflow): State<Arc<Workflow>>) -> StatusCode {
    tokio::spawn(async move {
        if let Err(err) = workflow.check_unapproved().await {
            warn!(?err, "unapproved check failed");
        }
    });
    StatusCode::OK
}
