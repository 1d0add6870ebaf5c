//! The load balancer entry point.
//!
//! # Responsibilities
//! - Own the database table and both selection algorithms
//! - Assign correlation ids and route each query by intent
//! - Suspend the caller until its own result arrives, or fail it on timeout
//! - Retry reads whose database became unreachable mid-execution

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::time;

use crate::config::validation::{validate_config, validate_databases};
use crate::config::{BalancerConfig, ConfigError, DatabaseConfig, HealthConfig, ReadAlgorithmKind};
use crate::driver::Driver;
use crate::error::BalancerError;
use crate::lifecycle::Supervisor;
use crate::load_balancer::completion::{AbandonGuard, CompletionTable};
use crate::load_balancer::database::Database;
use crate::load_balancer::worker::{self, Executors};
use crate::load_balancer::{mutation, refresh, Interval, MutationAlgorithm, ReadAlgorithm, RoundRobin};
use crate::observability::metrics;
use crate::query::executor::PassiveHealth;
use crate::query::{CorrelationId, Intent, Query, QueryExecutor, QueryResult, TelemetryExecutor};

/// Runtime options of a balancer.
#[derive(Debug, Clone)]
pub struct BalancerOptions {
    /// Maximum wait for a result.
    pub submit_timeout: Duration,
    /// Re-dispatches of a read whose database became unreachable.
    pub read_failover_attempts: u32,
    pub health: HealthConfig,
}

impl Default for BalancerOptions {
    fn default() -> Self {
        Self::from_config(&BalancerConfig::default())
    }
}

impl BalancerOptions {
    pub fn from_config(config: &BalancerConfig) -> Self {
        Self {
            submit_timeout: Duration::from_millis(config.timeouts.submit_ms),
            read_failover_attempts: config.read.failover_attempts,
            health: config.health.clone(),
        }
    }
}

/// Build a balancer over `databases` and start its worker loops.
///
/// Must be called from within a tokio runtime. Configuration problems
/// (no databases, duplicate names, bad URLs) fail here, not on first query.
pub fn configure(
    databases: Vec<DatabaseConfig>,
    read_algorithm: Arc<dyn ReadAlgorithm>,
    mutation_algorithm: Arc<dyn MutationAlgorithm>,
    driver: Arc<dyn Driver>,
    options: BalancerOptions,
) -> Result<LoadBalancer, ConfigError> {
    validate_databases(&databases).map_err(ConfigError::Validation)?;
    let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;

    let databases: Arc<[Arc<Database>]> = databases
        .iter()
        .enumerate()
        .map(|(index, config)| Database::from_config(index, config).map(Arc::new))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConfigError::Validation(vec![e]))?
        .into();

    let completions = Arc::new(CompletionTable::new());
    let passive = PassiveHealth::from_config(&options.health);
    let executors = Executors {
        queries: Arc::new(QueryExecutor::new(driver.clone(), completions.clone(), passive)),
        telemetry: Arc::new(TelemetryExecutor::new(driver, passive)),
    };

    let supervisor = Supervisor::new(runtime);
    for db in databases.iter() {
        metrics::record_database_health(db.name(), db.is_up());
        supervisor.spawn(worker::run(db.clone(), executors.clone(), supervisor.subscribe()));
    }
    if let Some(interval) = read_algorithm.refresh_interval() {
        supervisor.spawn(refresh::run(
            read_algorithm.clone(),
            databases.clone(),
            interval,
            supervisor.subscribe(),
        ));
    }

    tracing::info!(
        databases = databases.len(),
        read_algorithm = ?read_algorithm,
        mutation_consistency = mutation_algorithm.consistency(),
        submit_timeout_ms = options.submit_timeout.as_millis() as u64,
        "Load balancer configured"
    );

    Ok(LoadBalancer {
        databases,
        read_algorithm,
        mutation_algorithm,
        completions,
        options,
        supervisor,
    })
}

/// Single entry point routing queries across replicas.
#[derive(Debug)]
pub struct LoadBalancer {
    databases: Arc<[Arc<Database>]>,
    read_algorithm: Arc<dyn ReadAlgorithm>,
    mutation_algorithm: Arc<dyn MutationAlgorithm>,
    completions: Arc<CompletionTable>,
    options: BalancerOptions,
    supervisor: Supervisor,
}

impl LoadBalancer {
    /// Build a balancer from a full configuration.
    pub fn from_config(config: &BalancerConfig, driver: Arc<dyn Driver>) -> Result<Self, ConfigError> {
        validate_config(config).map_err(ConfigError::Validation)?;

        let read_algorithm: Arc<dyn ReadAlgorithm> = match config.read.algorithm {
            ReadAlgorithmKind::Interval => Arc::new(Interval::from_config(&config.read)),
            ReadAlgorithmKind::RoundRobin => Arc::new(RoundRobin::from_config(&config.read)),
        };
        let mutation_algorithm = mutation::from_strategy(config.mutation.strategy);

        configure(
            config.databases.clone(),
            read_algorithm,
            mutation_algorithm,
            driver,
            BalancerOptions::from_config(config),
        )
    }

    /// Route `query` and wait for its result.
    ///
    /// The returned value is always the result of this query, never of
    /// another call, including calls that timed out earlier.
    pub async fn submit(&self, query: Query) -> QueryResult {
        let started = Instant::now();
        let intent = query.intent;
        let result = match intent {
            Intent::Read => self.submit_read(query).await,
            Intent::Mutate => self.dispatch(query).await,
        };
        metrics::record_submit(intent, started.elapsed(), result.is_ok());
        result
    }

    /// Blocking form of [`submit`](Self::submit) for callers outside the runtime.
    ///
    /// Panics if called from a runtime worker thread.
    pub fn submit_blocking(&self, query: Query) -> QueryResult {
        self.supervisor.runtime().block_on(self.submit(query))
    }

    async fn submit_read(&self, mut query: Query) -> QueryResult {
        let mut failovers = 0;
        loop {
            let retry = (failovers < self.options.read_failover_attempts).then(|| query.clone());
            match self.dispatch(query).await {
                Err(e) if e.is_unavailable() => match retry {
                    Some(again) => {
                        failovers += 1;
                        tracing::warn!(error = %e, failover = failovers, "Retrying read on another database");
                        query = again;
                    }
                    None => return Err(e),
                },
                other => return other,
            }
        }
    }

    /// One dispatch under a fresh correlation id.
    ///
    /// Fails with `Shutdown` without touching any database once
    /// [`shutdown`](Self::shutdown) has started.
    async fn dispatch(&self, mut query: Query) -> QueryResult {
        let (id, reply) = self.completions.register()?;
        let _guard = AbandonGuard::new(&self.completions, id);
        query.assign_id(id);
        let intent = query.intent;

        let targets = match intent {
            Intent::Read => self
                .read_algorithm
                .select_for_read(&self.databases, query)
                .await
                .map(|index| vec![index]),
            Intent::Mutate => self.mutation_algorithm.select_for_mutation(&self.databases, query),
        }?;

        tracing::debug!(
            correlation_id = id,
            intent = intent.as_str(),
            databases = ?targets.iter().map(|&i| self.databases[i].name()).collect::<Vec<_>>(),
            "Query dispatched"
        );

        match time::timeout(self.options.submit_timeout, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BalancerError::Shutdown),
            Err(_) => {
                tracing::warn!(
                    correlation_id = id,
                    timeout_ms = self.options.submit_timeout.as_millis() as u64,
                    "Submit timed out, abandoning query"
                );
                metrics::record_submit_timeout();
                Err(BalancerError::SubmitTimeout {
                    correlation_id: id,
                    timeout: self.options.submit_timeout,
                })
            }
        }
    }

    /// Deliver a result for `id`; stale ids are counted and dropped.
    pub fn complete(&self, id: CorrelationId, result: QueryResult) -> bool {
        self.completions.complete(id, result)
    }

    pub fn databases(&self) -> &[Arc<Database>] {
        &self.databases
    }

    pub fn database(&self, name: &str) -> Option<&Arc<Database>> {
        self.databases.iter().find(|db| db.name() == name)
    }

    pub fn read_algorithm(&self) -> &Arc<dyn ReadAlgorithm> {
        &self.read_algorithm
    }

    pub fn mutation_algorithm(&self) -> &Arc<dyn MutationAlgorithm> {
        &self.mutation_algorithm
    }

    pub fn next_correlation_id(&self) -> CorrelationId {
        self.completions.next_correlation_id()
    }

    pub fn stale_completions(&self) -> u64 {
        self.completions.stale_completions()
    }

    pub fn in_flight(&self) -> usize {
        self.completions.in_flight()
    }

    /// Stop the worker and refresh loops and wait for them to exit.
    ///
    /// Callers still waiting for a result, and every later `submit`, get
    /// [`BalancerError::Shutdown`].
    pub async fn shutdown(&self) {
        let failed = self.completions.close();
        for db in self.databases.iter() {
            db.close();
        }
        self.supervisor.shutdown().await;
        tracing::info!(failed_in_flight = failed, "Load balancer stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.completions.is_closed()
    }
}
