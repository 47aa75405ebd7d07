use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod params;
mod tasks;

#[derive(Debug, Parser)]
#[command(version, about = "Drive cloud and cluster resources toward a declared state")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create or terminate compute instances
    Instance(params::InstanceArgs),
    /// Create or delete a cluster namespace
    Namespace(params::NamespaceArgs),
    /// Create or delete a pod
    Pod(params::PodArgs),
    /// Create or delete a replication controller
    ReplicationController(params::ReplicationControllerArgs),
    /// Create or delete a service
    Service(params::ServiceArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()?;

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Instance(args) => tasks::instance(args).await,
        Commands::Namespace(args) => tasks::namespace(args).await,
        Commands::Pod(args) => tasks::pod(args).await,
        Commands::ReplicationController(args) => tasks::replication_controller(args).await,
        Commands::Service(args) => tasks::service(args).await,
    };

    match result {
        Ok(report) => println!("{}", serde_json::to_string(&report)?),
        Err(e) => {
            tracing::error!("task failed: {e}");
            println!(
                "{}",
                serde_json::json!({"failed": true, "changed": false, "msg": e.to_string()})
            );
            std::process::exit(1);
        }
    }

    Ok(())
}
