use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use vmca::config::Config;
use vmca::core::daemon::Daemon;
use vmca::core::deployment::{Deployment, FakeDeployment};
use vmca::core::resource_model::HostsInfo;
use vmca::{logging, rpc};

#[derive(Parser)]
#[command(name = "vmcad")]
#[command(about = "Virtual machine consolidation daemon")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "vmca.toml")]
    config: PathBuf,

    /// Run against an in-memory fake deployment instead of a real platform
    /// adapter. No real adapter ships with this build, so this is the only
    /// way to run vmcad today.
    #[arg(long, default_value_t = true)]
    fake_deployment: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let _log_guard = logging::init(&config.debugging);

    if !cli.fake_deployment {
        error!("no real deployment adapter is implemented in this build; pass --fake-deployment");
        anyhow::bail!("no deployment adapter available");
    }
    warn!("running against FakeDeployment: no real hypervisor calls will be made");

    let deployment: Arc<dyn Deployment> = Arc::new(FakeDeployment::new(HostsInfo::new()));
    let rpc_host = config.rpc.rpc_host.clone();
    let rpc_port = config.rpc.rpc_port;
    let defragger_frequency = config.timing.defragger_frequency;
    let plan_frequency = config.timing.migration_plan_frequency;
    let enable_defragger = config.concurrency.enable_defragger;

    let daemon = Arc::new(Daemon::new(config, deployment));

    if enable_defragger {
        let daemon = daemon.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(defragger_frequency.max(1)));
            loop {
                tick.tick().await;
                if let Err(err) = daemon.defrag_cycle().await {
                    error!(error = %err, "defrag cycle failed");
                }
            }
        });
    }

    {
        let daemon = daemon.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(plan_frequency.max(1)));
            loop {
                tick.tick().await;
                if let Err(err) = daemon.tick_plan().await {
                    error!(error = %err, "migration plan tick failed");
                }
            }
        });
    }

    let addr = format!("{rpc_host}:{rpc_port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "vmcad listening");
    axum::serve(listener, rpc::router(daemon)).await?;

    Ok(())
}
