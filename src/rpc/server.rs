use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::core::daemon::Daemon;
use crate::rpc::dto::{CleanHostsRequest, GetMeanRequest, RpcReply, VersionReply};
use crate::rpc::error::ApiError;

/// Builds the JSON-over-HTTP router exposing the verbatim RPC method
/// surface as route segments.
pub fn router(daemon: Arc<Daemon>) -> Router {
    Router::new()
        .route("/version", get(version))
        .route("/forcerun", post(forcerun))
        .route("/getplan", get(getplan))
        .route("/cleanhosts", post(cleanhosts))
        .route("/getinfo", get(getinfo))
        .route("/getmean", post(getmean))
        .with_state(daemon)
}

async fn version() -> Json<VersionReply> {
    Json(VersionReply {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn forcerun(State(daemon): State<Arc<Daemon>>) -> Result<Json<RpcReply>, ApiError> {
    daemon.forcerun().await?;
    Ok(Json(RpcReply::ok("defrag cycle triggered")))
}

async fn getplan(State(daemon): State<Arc<Daemon>>) -> Json<RpcReply> {
    Json(RpcReply::ok(daemon.get_plan().await))
}

async fn cleanhosts(
    State(daemon): State<Arc<Daemon>>,
    Json(req): Json<CleanHostsRequest>,
) -> Result<Json<RpcReply>, ApiError> {
    if req.hosts.is_empty() {
        return Err(ApiError::BadRequest("hosts must not be empty".to_string()));
    }
    daemon
        .clean_hosts(&req.hosts, req.force, req.use_empty)
        .await?;
    Ok(Json(RpcReply::ok("clean started")))
}

async fn getinfo(State(daemon): State<Arc<Daemon>>) -> Result<Json<RpcReply>, ApiError> {
    Ok(Json(RpcReply::ok(daemon.dump_data().await?)))
}

async fn getmean(
    State(daemon): State<Arc<Daemon>>,
    Json(req): Json<GetMeanRequest>,
) -> Result<Json<RpcReply>, ApiError> {
    let plan = daemon.get_mean(req.override_running).await?;
    Ok(Json(RpcReply::ok(format!(
        "{} migrations proposed",
        plan.flatten().len()
    ))))
}
