//! HTTP front end.
//!
//! `POST /solve` runs one pipeline on tokio's blocking pool, `GET /healthz`
//! reports liveness and `GET /metrics` exports Prometheus text.

use crate::config::settings::Settings;
use crate::config::types::ProblemSpec;
use crate::controller::RunResult;
use crate::exec::telemetry::MeasurementTool;
use crate::observability::PipelineMetrics;
use crate::pipeline::{Pipeline, RunScope};
use crate::producers::ProducerSet;
use crate::verdict::ComplexityOracle;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub metrics: Arc<PipelineMetrics>,
    pub tool: MeasurementTool,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let tool = MeasurementTool::detect(settings.toolchain.time_tool.as_deref());
        Self {
            settings: Arc::new(settings),
            metrics: Arc::new(PipelineMetrics::new()),
            tool,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/solve", post(solve))
        .route("/healthz", get(health_check))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Bind and serve until Ctrl+C or SIGTERM.
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let addr: SocketAddr = settings.server.bind.parse()?;
    let state = AppState::new(settings);
    log::info!("Measurement tool: {}", state.tool.describe());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    log::info!("Server stopped");
    Ok(())
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "perfbox",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
}

async fn solve(State(state): State<AppState>, Json(problem): Json<ProblemSpec>) -> Response {
    log::info!("POST /solve task={}", problem.task_id);
    let metrics = state.metrics.clone();
    metrics.run_started();

    let result = tokio::task::spawn_blocking(move || run_problem(&state, &problem)).await;
    metrics.run_finished();

    match result {
        Ok(Ok(result)) => (StatusCode::OK, Json(result)).into_response(),
        Ok(Err(message)) => error_response(StatusCode::SERVICE_UNAVAILABLE, message),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn run_problem(state: &AppState, problem: &ProblemSpec) -> Result<RunResult, String> {
    let started = Instant::now();
    let outcome = ProducerSet::from_settings(&state.settings.producers, None).and_then(|producers| {
        let oracle = producers
            .oracle
            .clone()
            .map(|o| o as Arc<dyn ComplexityOracle>);
        let namespace = format!("req-{}", Uuid::new_v4());
        Pipeline::with_tool(&state.settings, state.tool.clone()).solve(
            problem,
            &producers.planner,
            &producers.coder,
            oracle,
            RunScope::namespaced(&namespace, 0),
        )
    });
    match outcome {
        Ok(outcome) => {
            state.metrics.record_outcome(&outcome, started.elapsed());
            Ok(outcome.into())
        }
        Err(e) => {
            state.metrics.record_error(started.elapsed());
            log::error!("Task {} could not run: {}", problem.task_id, e);
            Err(e.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("Shutting down");
}
