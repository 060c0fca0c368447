use std::sync::Arc;

use serde_json::Value;
use vmca::config::Config;
use vmca::core::daemon::Daemon;
use vmca::core::deployment::FakeDeployment;
use vmca::core::resource_model::{Host, Vm};
use vmca::rpc;

fn imbalanced_cluster() -> vmca::core::resource_model::HostsInfo {
    let mut hi = vmca::core::resource_model::HostsInfo::new();
    let mut a = Host::new("a", 4.0, 8.0);
    a.add_vm(Vm::new(1, 1.0, 2.0, "a", 0));
    let mut b = Host::new("b", 4.0, 8.0);
    b.add_vm(Vm::new(2, 1.0, 2.0, "b", 0));
    b.add_vm(Vm::new(3, 1.0, 2.0, "b", 0));
    hi.insert_host(a);
    hi.insert_host(b);
    hi.insert_host(Host::new("c", 4.0, 8.0));
    hi
}

async fn spawn_daemon(config: Config) -> (String, tokio::task::JoinHandle<()>) {
    let deployment = Arc::new(FakeDeployment::new(imbalanced_cluster()));
    let daemon = Arc::new(Daemon::new(config, deployment));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = rpc::router(daemon);
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}"), handle)
}

#[tokio::test]
async fn version_endpoint_reports_crate_version() {
    let (base, handle) = spawn_daemon(Config::default()).await;
    let client = reqwest::Client::new();
    let resp: Value = client
        .get(format!("{base}/version"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["version"], env!("CARGO_PKG_VERSION"));
    handle.abort();
}

#[tokio::test]
async fn forcerun_then_getplan_reports_pending_migrations() {
    let mut config = Config::default();
    config.timing.stable_time = 0;
    let (base, handle) = spawn_daemon(config).await;
    let client = reqwest::Client::new();

    let resp: Value = client
        .post(format!("{base}/forcerun"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["ok"], true);

    let plan: Value = client
        .get(format!("{base}/getplan"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(plan["message"].as_str().unwrap().contains("pending"));
    handle.abort();
}

#[tokio::test]
async fn cleanhosts_rejects_empty_host_list() {
    let (base, handle) = spawn_daemon(Config::default()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/cleanhosts"))
        .json(&serde_json::json!({ "hosts": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    handle.abort();
}

#[tokio::test]
async fn getinfo_reports_cluster_shape() {
    let (base, handle) = spawn_daemon(Config::default()).await;
    let client = reqwest::Client::new();

    let resp: Value = client
        .get(format!("{base}/getinfo"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let message = resp["message"].as_str().unwrap();
    assert!(message.contains("hosts: 3"));
    assert!(message.contains("vms: 3"));
    handle.abort();
}
