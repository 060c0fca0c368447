use serde::{Deserialize, Serialize};

/// Generic `(ok, message)` envelope every RPC method besides `version`
/// replies with.
#[derive(Debug, Serialize)]
pub struct RpcReply {
    pub ok: bool,
    pub message: String,
}

impl RpcReply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VersionReply {
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct CleanHostsRequest {
    pub hosts: Vec<String>,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub use_empty: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct GetMeanRequest {
    #[serde(default)]
    pub override_running: bool,
}
