use std::sync::Arc;

use clap::{Parser, Subcommand};
use clusterops::config::EngineConfig;
use clusterops::http::{HttpAdapterFactory, HttpsCerts};
use clusterops::ops::{
    ClusterOp, HttpsFindSubclusterOp, NmaNetworkProfileOp, OpEngine, OpEngineExecContext,
};
use slog::{error, info, o, Drain, Logger};

#[derive(Parser, Debug)]
#[command(name = "clusterops")]
#[command(about = "Run administrative operations against database cluster nodes", long_about = None)]
struct Args {
    /// Hosts to run against (e.g., 10.0.0.1,10.0.0.2)
    #[arg(long, value_delimiter = ',', global = true)]
    hosts: Vec<String>,

    /// Port of the node management agent
    #[arg(long, default_value_t = clusterops::config::DEFAULT_NMA_PORT)]
    nma_port: u16,

    /// Port of the HTTPS service
    #[arg(long, default_value_t = clusterops::config::DEFAULT_HTTPS_PORT)]
    https_port: u16,

    /// Per-host request timeout in seconds
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,

    /// PEM files for TLS client authentication: key, cert and CA
    #[arg(long, num_args = 3, value_names = ["KEY", "CERT", "CA"])]
    certs: Option<Vec<String>>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the network profile of every host
    NetworkProfile,

    /// Check that a subcluster exists and print the default subcluster
    FindSubcluster {
        #[arg(long)]
        subcluster: String,

        /// Do not fail when the subcluster does not exist
        #[arg(long, default_value_t = false)]
        ignore_not_found: bool,

        /// User for HTTP basic authentication
        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        password: Option<String>,
    },
}

fn create_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!("app" => "clusterops"))
}

async fn read_certs(paths: &[String]) -> Result<HttpsCerts, std::io::Error> {
    let key = tokio::fs::read_to_string(&paths[0]).await?;
    let cert = tokio::fs::read_to_string(&paths[1]).await?;
    let ca_cert = tokio::fs::read_to_string(&paths[2]).await?;
    Ok(HttpsCerts::new(key, cert, ca_cert))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logger = create_logger();
    let args = Args::parse();

    if args.hosts.is_empty() {
        return Err("at least one host is required (--hosts)".into());
    }

    let config = Arc::new(
        EngineConfig::new()
            .with_nma_endpoint(args.nma_port, true)
            .with_https_endpoint(args.https_port, true)
            .with_request_timeout(std::time::Duration::from_secs(args.timeout_secs)),
    );
    let factory = Arc::new(HttpAdapterFactory::new(config.clone(), logger.clone()));
    let mut ctx = OpEngineExecContext::new(config, factory, &logger);

    let op: Box<dyn ClusterOp> = match &args.command {
        Command::NetworkProfile => Box::new(NmaNetworkProfileOp::new(args.hosts.clone(), &logger)),
        Command::FindSubcluster {
            subcluster,
            ignore_not_found,
            user,
            password,
        } => Box::new(HttpsFindSubclusterOp::new(
            args.hosts.clone(),
            user.is_some(),
            user.as_deref().unwrap_or_default(),
            password.as_deref(),
            subcluster,
            *ignore_not_found,
            &logger,
        )?),
    };

    let mut engine = OpEngine::new(vec![op], args.hosts.clone(), &logger);
    if let Some(paths) = &args.certs {
        engine = engine.with_certs(read_certs(paths).await?);
    }

    if let Err(e) = engine.run(&mut ctx).await {
        error!(logger, "Command failed"; "error" => %e);
        return Err(e.into());
    }

    match &args.command {
        Command::NetworkProfile => {
            let mut hosts: Vec<_> = ctx.network_profiles.keys().cloned().collect();
            hosts.sort();
            for host in hosts {
                if let Some(profile) = ctx.network_profile(&host) {
                    println!("{}\t{}", host, serde_json::to_string(profile)?);
                }
            }
        }
        Command::FindSubcluster { subcluster, .. } => {
            info!(logger, "Subcluster lookup succeeded"; "subcluster" => subcluster);
            println!(
                "default subcluster: {}",
                ctx.default_sc_name.as_deref().unwrap_or("<unknown>")
            );
        }
    }

    Ok(())
}
