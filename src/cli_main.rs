use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "vmca")]
#[command(about = "CLI client for the vmcad consolidation daemon")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base URL of the running vmcad instance
    #[arg(long, default_value = "http://localhost:9999")]
    endpoint: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the daemon's version
    Version,
    /// Print a summary of the hypervisor cluster state
    Info,
    /// Print the current migration plan
    Getplan,
    /// Trigger an immediate defrag cycle
    Forcerun,
    /// Preview a rebalance without installing it as the active plan
    Getmean {
        /// Recompute even if a plan is already running
        #[arg(long)]
        override_running: bool,
    },
    /// Drain the given hosts of VMs
    Clean(CleanArgs),
}

#[derive(Args)]
struct CleanArgs {
    /// Hosts to empty
    hosts: Vec<String>,
    /// Bypass the failed-migration blocklist
    #[arg(short, long)]
    force: bool,
    /// Prefer already-empty hosts as migration destinations
    #[arg(short = 'e', long)]
    use_empty: bool,
}

#[derive(Debug, Deserialize)]
struct RpcReply {
    ok: bool,
    message: Value,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let reply = match cli.command {
        Commands::Version => {
            let resp: Value = client
                .get(format!("{}/version", cli.endpoint))
                .send()
                .await?
                .json()
                .await?;
            println!("{resp}");
            return Ok(());
        }
        Commands::Info => get(&client, &cli.endpoint, "/getinfo").await?,
        Commands::Getplan => get(&client, &cli.endpoint, "/getplan").await?,
        Commands::Forcerun => post(&client, &cli.endpoint, "/forcerun", &Value::Null).await?,
        Commands::Getmean { override_running } => {
            post(
                &client,
                &cli.endpoint,
                "/getmean",
                &serde_json::json!({ "override_running": override_running }),
            )
            .await?
        }
        Commands::Clean(args) => {
            if args.hosts.is_empty() {
                anyhow::bail!("clean requires at least one host");
            }
            post(
                &client,
                &cli.endpoint,
                "/cleanhosts",
                &serde_json::json!({
                    "hosts": args.hosts,
                    "force": args.force,
                    "use_empty": args.use_empty,
                }),
            )
            .await?
        }
    };

    println!("{}", reply.message);
    if !reply.ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn get(client: &reqwest::Client, endpoint: &str, path: &str) -> anyhow::Result<RpcReply> {
    let reply = client
        .get(format!("{endpoint}{path}"))
        .send()
        .await?
        .json::<RpcReply>()
        .await?;
    Ok(reply)
}

async fn post(
    client: &reqwest::Client,
    endpoint: &str,
    path: &str,
    body: &Value,
) -> anyhow::Result<RpcReply> {
    let reply = client
        .post(format!("{endpoint}{path}"))
        .json(body)
        .send()
        .await?
        .json::<RpcReply>()
        .await?;
    Ok(reply)
}
