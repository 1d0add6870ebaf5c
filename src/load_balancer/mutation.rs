//! Mutation (create/update/delete) routing strategies.
//!
//! Each strategy owns the consistency contract between writes and the
//! reads that follow them, and states it in [`MutationAlgorithm::consistency`].

use std::sync::{Arc, Mutex};

use crate::config::{DatabaseRole, MutationStrategy};
use crate::error::BalancerError;
use crate::load_balancer::database::Database;
use crate::load_balancer::MutationAlgorithm;
use crate::query::{Query, QueryResult};

/// The primary (first database with the primary role, else the first
/// registered), followed by the remaining databases in registration order.
fn priority_order(databases: &[Arc<Database>]) -> Vec<&Arc<Database>> {
    let primary = databases
        .iter()
        .position(|db| db.role() == DatabaseRole::Primary)
        .unwrap_or(0);
    let mut order = Vec::with_capacity(databases.len());
    if let Some(db) = databases.get(primary) {
        order.push(db);
    }
    order.extend(
        databases
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != primary)
            .map(|(_, db)| db),
    );
    order
}

/// Build the configured strategy.
pub fn from_strategy(strategy: MutationStrategy) -> Arc<dyn MutationAlgorithm> {
    match strategy {
        MutationStrategy::PrimaryOnly => Arc::new(PrimaryOnly::new()),
        MutationStrategy::AllReplicas => Arc::new(AllReplicas::new()),
    }
}

/// Sends every mutation to the primary only.
#[derive(Debug, Default)]
pub struct PrimaryOnly;

impl PrimaryOnly {
    pub fn new() -> Self {
        Self
    }
}

impl MutationAlgorithm for PrimaryOnly {
    fn select_for_mutation(
        &self,
        databases: &[Arc<Database>],
        query: Query,
    ) -> Result<Vec<usize>, BalancerError> {
        let primary = priority_order(databases)
            .into_iter()
            .next()
            .ok_or(BalancerError::RoutingExhausted {
                attempts: 1,
                databases: 0,
            })?;

        if !primary.is_up() {
            return Err(BalancerError::ReplicaUnavailable {
                database: primary.name().to_string(),
                reason: "primary is down".to_string(),
            });
        }

        primary
            .enqueue(query)
            .map_err(|_| BalancerError::Shutdown)?;
        Ok(vec![primary.index()])
    }

    fn consistency(&self) -> &'static str {
        "primary-only: writes go to the primary; reads may be served by replicas \
         that have not replicated the write yet (no read-your-writes guarantee)"
    }
}

/// Sends every mutation to all databases that are up and waits for all of them.
#[derive(Debug, Default)]
pub struct AllReplicas;

impl AllReplicas {
    pub fn new() -> Self {
        Self
    }
}

impl MutationAlgorithm for AllReplicas {
    fn select_for_mutation(
        &self,
        databases: &[Arc<Database>],
        query: Query,
    ) -> Result<Vec<usize>, BalancerError> {
        let targets: Vec<&Arc<Database>> = priority_order(databases)
            .into_iter()
            .filter(|db| {
                if !db.is_up() {
                    tracing::warn!(
                        database = %db.name(),
                        correlation_id = query.correlation_id(),
                        "Skipping down database for mutation"
                    );
                }
                db.is_up()
            })
            .collect();

        if targets.is_empty() {
            let names: Vec<&str> = databases.iter().map(|db| db.name()).collect();
            return Err(BalancerError::ReplicaUnavailable {
                database: names.join(","),
                reason: "no database is up".to_string(),
            });
        }

        let indices: Vec<usize> = targets.iter().map(|db| db.index()).collect();
        let group = Arc::new(FanOut::new(indices.clone()));
        for db in targets {
            // Copies already queued complete into an abandoned id.
            db.enqueue(query.clone().with_fanout(group.clone()))
                .map_err(|_| BalancerError::Shutdown)?;
        }
        Ok(indices)
    }

    fn consistency(&self) -> &'static str {
        "all-replicas: submit returns after every database that was up at dispatch \
         executed the write; later reads observe it on any of those databases"
    }
}

/// Joins the outcomes of one mutation fanned out to several databases.
#[derive(Debug)]
pub struct FanOut {
    /// Target indices in canonical priority order.
    order: Vec<usize>,
    state: Mutex<FanOutState>,
}

#[derive(Debug)]
struct FanOutState {
    outcomes: Vec<Option<QueryResult>>,
    remaining: usize,
}

impl FanOut {
    pub(crate) fn new(order: Vec<usize>) -> Self {
        let remaining = order.len();
        Self {
            state: Mutex::new(FanOutState {
                outcomes: (0..remaining).map(|_| None).collect(),
                remaining,
            }),
            order,
        }
    }

    /// Record the outcome from database `index`.
    ///
    /// Returns the canonical result once, when the last target reports.
    pub(crate) fn record(&self, index: usize, result: QueryResult) -> Option<QueryResult> {
        let slot = self.order.iter().position(|&i| i == index)?;
        let mut state = self.state.lock().expect("fan-out mutex poisoned");
        if state.remaining == 0 || state.outcomes[slot].is_some() {
            return None;
        }
        if let Err(e) = &result {
            if e.is_unavailable() && slot > 0 {
                tracing::warn!(error = %e, "Replica missed fanned-out mutation");
            }
        }
        state.outcomes[slot] = Some(result);
        state.remaining -= 1;
        if state.remaining > 0 {
            return None;
        }
        Some(Self::canonical(std::mem::take(&mut state.outcomes)))
    }

    /// First reachable outcome in priority order, else the first failure.
    fn canonical(outcomes: Vec<Option<QueryResult>>) -> QueryResult {
        let mut unavailable = None;
        for outcome in outcomes.into_iter().flatten() {
            match outcome {
                Err(e) if e.is_unavailable() => {
                    unavailable.get_or_insert(e);
                }
                reachable => return reachable,
            }
        }
        Err(unavailable.unwrap_or_else(|| BalancerError::ReplicaUnavailable {
            database: String::new(),
            reason: "no database reported".to_string(),
        }))
    }
}
