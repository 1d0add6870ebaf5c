//! Replica load balancer demo runner.
//!
//! Builds a balancer over in-memory databases (or the databases named in a
//! TOML config, backed by the in-memory driver), writes a few rows, waits
//! for the load probes to populate the ranking, then issues reads and logs
//! where each one was routed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::Value;

use replica_balancer::config::{load_config, BalancerConfig, DatabaseConfig, MutationStrategy};
use replica_balancer::observability::{logging, metrics};
use replica_balancer::{LoadBalancer, MemoryDriver, Query};

#[derive(Parser)]
#[command(name = "replica-balancer")]
#[command(about = "Route a sample workload through the replica load balancer", long_about = None)]
struct Cli {
    /// TOML configuration file; a three-database in-memory topology is used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of reads to issue after the writes.
    #[arg(short, long, default_value_t = 10)]
    reads: usize,

    /// Override the configured log level.
    #[arg(long)]
    log_level: Option<String>,
}

fn demo_config() -> BalancerConfig {
    let mut config = BalancerConfig::default();
    config.databases = vec![
        DatabaseConfig::primary("db0", "memory://db0"),
        DatabaseConfig::new("db1", "memory://db1"),
        DatabaseConfig::new("db2", "memory://db2"),
    ];
    config.mutation.strategy = MutationStrategy::AllReplicas;
    config.read.refresh_interval_ms = 200;
    config
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => demo_config(),
    };
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    logging::init_logging(&config.observability)?;
    tracing::info!("replica-balancer v0.1.0 starting");

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let driver = Arc::new(MemoryDriver::new());
    for (i, db) in config.databases.iter().enumerate() {
        // Uneven loads so the interval ranking has something to sort.
        driver.set_load(&db.name, ((i * 7) % 5) as f64);
    }

    let balancer = LoadBalancer::from_config(&config, driver.clone())?;
    tracing::info!(
        databases = balancer.databases().len(),
        consistency = balancer.mutation_algorithm().consistency(),
        "Balancer ready"
    );

    for (id, name) in [(1, "ada"), (2, "grace"), (3, "edsger")] {
        let created = balancer
            .submit(Query::mutate("users", "create").kwarg("id", id).kwarg("name", name))
            .await?;
        tracing::info!(
            database = %created.database,
            correlation_id = created.correlation_id,
            "Row created"
        );
    }

    // Two refresh cycles: one to probe, one to copy the results.
    tokio::time::sleep(Duration::from_millis(config.read.refresh_interval_ms * 2 + 50)).await;

    for _ in 0..cli.reads {
        match balancer.submit(Query::select("users", "all")).await {
            Ok(out) => {
                let rows: Vec<Value> = out.decode()?;
                tracing::info!(
                    database = %out.database,
                    correlation_id = out.correlation_id,
                    rows = rows.len(),
                    "Read served"
                );
            }
            Err(e) => tracing::warn!(error = %e, "Read failed"),
        }
    }

    tracing::info!(
        stale_completions = balancer.stale_completions(),
        "Workload finished"
    );
    balancer.shutdown().await;
    Ok(())
}
