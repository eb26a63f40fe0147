//! Transform execution engine.
//!
//! Runs transforms against entities of one investigation graph with bounded
//! concurrency, per-run timeouts, rate limiting of network-bound transforms,
//! and cooperative cancellation. A run's output is merged into the graph in
//! one atomic step, or not at all.

mod rate_limit;

pub use rate_limit::RateLimitScope;

use futures_util::future::join_all;
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::entity::{Entity, EntityId};
use crate::error::PanoError;
use crate::graph::{MergeBatch, MergeSummary, SharedGraph};
use crate::status::{OperationId, StatusReporter};
use crate::transform::{Transform, TransformContext};

use rate_limit::RateLimiter;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum transforms running at once
    pub max_concurrency: usize,
    /// Default per-run timeout
    pub timeout: Duration,
    /// Default cooldown between starts of a network-bound transform
    pub rate_limit: Duration,
    pub rate_limit_scope: RateLimitScope,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            timeout: Duration::from_millis(30_000),
            rate_limit: Duration::from_millis(1_000),
            rate_limit_scope: RateLimitScope::PerTransform,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed(String),
    Cancelled,
    TimedOut,
    /// The transform does not accept the entity's type.
    Rejected(String),
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub transform: String,
    pub entity_id: EntityId,
    pub operation: OperationId,
    pub outcome: Outcome,
    /// Entities produced or enriched by the run; empty unless completed.
    pub entities: Vec<Entity>,
    pub created: usize,
    pub enriched: usize,
    pub relationships_added: usize,
    pub elapsed: Duration,
}

/// Run counters since the engine was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub timed_out: u64,
    pub rejected: u64,
    pub entities_created: u64,
    pub entities_enriched: u64,
    pub relationships_added: u64,
}

struct EngineInner {
    graph: SharedGraph,
    status: StatusReporter,
    config: EngineConfig,
    permits: Semaphore,
    limiter: RateLimiter,
    stats: Mutex<EngineStats>,
}

/// Cloneable handle; clones share limits, cooldowns, and statistics.
#[derive(Clone)]
pub struct TransformEngine {
    inner: Arc<EngineInner>,
}

impl TransformEngine {
    pub fn new(graph: SharedGraph, status: StatusReporter, config: EngineConfig) -> Self {
        let permits = Semaphore::new(config.max_concurrency.max(1));
        let limiter = RateLimiter::new(config.rate_limit_scope);
        Self {
            inner: Arc::new(EngineInner {
                graph,
                status,
                config,
                permits,
                limiter,
                stats: Mutex::new(EngineStats::default()),
            }),
        }
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.inner.graph
    }

    pub fn status(&self) -> &StatusReporter {
        &self.inner.status
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> EngineStats {
        self.inner.stats.lock().clone()
    }

    /// Run `transform` on one entity and return the merged entities.
    /// Failures are reported through the status reporter, never returned.
    pub async fn execute(&self, transform: &Arc<dyn Transform>, entity_id: &EntityId) -> Vec<Entity> {
        self.execute_with_cancel(transform, entity_id, CancellationToken::new())
            .await
    }

    pub async fn execute_with_cancel(
        &self,
        transform: &Arc<dyn Transform>,
        entity_id: &EntityId,
        cancel: CancellationToken,
    ) -> Vec<Entity> {
        self.execute_detailed(transform, entity_id, cancel)
            .await
            .entities
    }

    /// Run one transform over many entities concurrently. Each result is
    /// merged as soon as its run completes; reports come back in input order.
    pub async fn execute_many(
        &self,
        transform: &Arc<dyn Transform>,
        entity_ids: &[EntityId],
        cancel: CancellationToken,
    ) -> Vec<ExecutionReport> {
        let runs = entity_ids
            .iter()
            .map(|id| self.execute_detailed(transform, id, cancel.clone()));
        join_all(runs).await
    }

    pub async fn execute_detailed(
        &self,
        transform: &Arc<dyn Transform>,
        entity_id: &EntityId,
        cancel: CancellationToken,
    ) -> ExecutionReport {
        let started = Instant::now();
        let name = transform.descriptor().name.clone();
        let status = &self.inner.status;
        let operation = status.start(&format!("{name} on {entity_id}"));
        log::info!("Running transform '{}' on {}", name, entity_id);

        let (outcome, summary) = self
            .run_once(transform.as_ref(), entity_id, &cancel, operation)
            .await;

        match &outcome {
            Outcome::Completed => {
                status.update(
                    operation,
                    &format!("{name} returned {} entities", summary.entities.len()),
                );
                status.stop(operation);
                log::info!(
                    "Transform '{}' on {}: {} created, {} enriched, {} relationships",
                    name,
                    entity_id,
                    summary.created,
                    summary.enriched,
                    summary.relationships_added
                );
            }
            Outcome::Failed(reason) | Outcome::Rejected(reason) => {
                let message = PanoError::Transform {
                    transform: name.clone(),
                    reason: format!("on {entity_id}: {reason}"),
                }
                .to_string();
                log::warn!("{}", message);
                status.fail(operation, &message);
            }
            Outcome::Cancelled => {
                log::info!("Transform '{}' on {} cancelled", name, entity_id);
                status.cancel(operation);
            }
            Outcome::TimedOut => {
                log::warn!("Transform '{}' on {} timed out", name, entity_id);
                status.time_out(operation);
            }
        }
        self.record(&outcome, &summary);

        ExecutionReport {
            transform: name,
            entity_id: entity_id.clone(),
            operation,
            outcome,
            entities: summary.entities,
            created: summary.created,
            enriched: summary.enriched,
            relationships_added: summary.relationships_added,
            elapsed: started.elapsed(),
        }
    }

    async fn run_once(
        &self,
        transform: &dyn Transform,
        entity_id: &EntityId,
        cancel: &CancellationToken,
        operation: OperationId,
    ) -> (Outcome, MergeSummary) {
        let nothing = MergeSummary::default;
        let descriptor = transform.descriptor();

        let entity = self.inner.graph.read().entity(entity_id).cloned();
        let Some(entity) = entity else {
            return (Outcome::Failed(format!("unknown entity {entity_id}")), nothing());
        };
        if !descriptor.accepts(entity.entity_type()) {
            let reason = format!("does not accept {} entities", entity.entity_type());
            return (Outcome::Rejected(reason), nothing());
        }

        // Queue for a permit and, if network bound, for the next start slot.
        let queued = async {
            let permit = self.inner.permits.acquire().await;
            if descriptor.network_bound {
                let cooldown = descriptor.cooldown.unwrap_or(self.inner.config.rate_limit);
                self.inner.limiter.wait(&descriptor.name, cooldown).await;
            }
            permit
        };
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return (Outcome::Cancelled, nothing()),
            permit = queued => permit,
        };
        let Ok(_permit) = permit else {
            return (Outcome::Failed("engine is shut down".into()), nothing());
        };

        self.inner.status.update(operation, "running");
        let ctx = TransformContext::new(
            entity,
            self.inner.graph.reader(),
            cancel.child_token(),
            self.inner.status.clone(),
            operation,
        );
        let timeout = descriptor.timeout.unwrap_or(self.inner.config.timeout);
        let run = AssertUnwindSafe(transform.run(ctx)).catch_unwind();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return (Outcome::Cancelled, nothing()),
            result = tokio::time::timeout(timeout, run) => result,
        };
        let output = match result {
            Err(_) => return (Outcome::TimedOut, nothing()),
            Ok(Err(panic)) => {
                let reason = format!("panicked: {}", panic_message(panic.as_ref()));
                return (Outcome::Failed(reason), nothing());
            }
            Ok(Ok(Err(e))) => return (Outcome::Failed(format!("{e:#}")), nothing()),
            Ok(Ok(Ok(output))) => output,
        };

        // Late cancellation still discards the output.
        if cancel.is_cancelled() {
            return (Outcome::Cancelled, nothing());
        }
        if let Some(stray) = output
            .entities
            .iter()
            .find(|c| !descriptor.produces(&c.entity_type))
        {
            let reason = format!("returned undeclared output type '{}'", stray.entity_type);
            return (Outcome::Failed(reason), nothing());
        }

        let batch = MergeBatch {
            input: entity_id.clone(),
            entities: output.entities,
            relationships: output.relationships,
            link_kind: descriptor.link_kind.clone(),
            source: descriptor.name.clone(),
        };
        let merged = self.inner.graph.write().merge(batch);
        match merged {
            Ok(summary) => (Outcome::Completed, summary),
            Err(e) => (Outcome::Failed(format!("output rejected: {e}")), nothing()),
        }
    }

    fn record(&self, outcome: &Outcome, summary: &MergeSummary) {
        let mut stats = self.inner.stats.lock();
        match outcome {
            Outcome::Completed => stats.completed += 1,
            Outcome::Failed(_) => stats.failed += 1,
            Outcome::Cancelled => stats.cancelled += 1,
            Outcome::TimedOut => stats.timed_out += 1,
            Outcome::Rejected(_) => stats.rejected += 1,
        }
        stats.entities_created += summary.created as u64;
        stats.entities_enriched += summary.enriched as u64;
        stats.relationships_added += summary.relationships_added as u64;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::InvestigationGraph;
    use crate::registry::PluginRegistry;
    use crate::schema::Properties;
    use crate::status::StatusEvent;
    use crate::transform::builtin::EmailToUsername;
    use crate::transform::{EntityCandidate, TransformDescriptor, TransformOutput};
    use async_trait::async_trait;

    fn engine(config: EngineConfig) -> (TransformEngine, EntityId) {
        let mut graph = InvestigationGraph::new(Arc::new(PluginRegistry::with_builtins().unwrap()));
        let mut props = Properties::new();
        props.insert("address".into(), "jane@example.org".into());
        let email = graph.add_entity("Email", props).unwrap().id().clone();
        let engine = TransformEngine::new(SharedGraph::new(graph), StatusReporter::default(), config);
        (engine, email)
    }

    enum Behaviour {
        Produce,
        Fail,
        Panic,
        Sleep(Duration),
        WrongType,
    }

    struct Scripted {
        descriptor: TransformDescriptor,
        behaviour: Behaviour,
    }

    fn scripted(behaviour: Behaviour) -> Arc<dyn Transform> {
        Arc::new(Scripted {
            descriptor: TransformDescriptor::new("Scripted", "test")
                .inputs(&["Email"])
                .outputs(&["Username"]),
            behaviour,
        })
    }

    #[async_trait]
    impl Transform for Scripted {
        fn descriptor(&self) -> &TransformDescriptor {
            &self.descriptor
        }

        async fn run(&self, _ctx: TransformContext) -> anyhow::Result<TransformOutput> {
            match &self.behaviour {
                Behaviour::Produce => {}
                Behaviour::Fail => anyhow::bail!("lookup service unavailable"),
                Behaviour::Panic => panic!("boom"),
                Behaviour::Sleep(d) => tokio::time::sleep(*d).await,
                Behaviour::WrongType => {
                    return Ok(TransformOutput::new()
                        .entity(EntityCandidate::new("Phone").with("number", "5550100")))
                }
            }
            Ok(TransformOutput::new().entity(EntityCandidate::new("Username").with("username", "jane")))
        }
    }

    #[tokio::test]
    async fn test_completed_run_merges_and_links() {
        let (engine, email) = engine(EngineConfig::default());
        let report = engine
            .execute_detailed(&scripted(Behaviour::Produce), &email, CancellationToken::new())
            .await;
        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(report.created, 1);
        assert_eq!(report.relationships_added, 1);
        let graph = engine.graph().read();
        assert_eq!(graph.entity_count(), 2);
        assert_eq!(graph.neighbors(&email, Some("associated_with")).len(), 1);
    }

    #[tokio::test]
    async fn test_failure_reports_once_and_leaves_graph_unchanged() {
        let (engine, email) = engine(EngineConfig::default());
        let mut rx = engine.status().subscribe();
        let before = engine.graph().read().to_json().unwrap();

        let entities = engine.execute(&scripted(Behaviour::Fail), &email).await;
        assert!(entities.is_empty());
        assert_eq!(engine.graph().read().to_json().unwrap(), before);

        let mut failures = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let StatusEvent::Failed { message, .. } = event {
                failures.push(message);
            }
        }
        assert_eq!(failures.len(), 1);
        assert!(failures[0].starts_with("Transform 'Scripted' failed: on "));
        assert!(failures[0].contains(email.as_str()));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let (engine, email) = engine(EngineConfig::default());
        let report = engine
            .execute_detailed(&scripted(Behaviour::Panic), &email, CancellationToken::new())
            .await;
        assert!(matches!(report.outcome, Outcome::Failed(ref m) if m.contains("boom")));
        assert_eq!(engine.stats().failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_distinct_outcome() {
        let config = EngineConfig {
            timeout: Duration::from_secs(5),
            ..EngineConfig::default()
        };
        let (engine, email) = engine(config);
        let report = engine
            .execute_detailed(
                &scripted(Behaviour::Sleep(Duration::from_secs(60))),
                &email,
                CancellationToken::new(),
            )
            .await;
        assert_eq!(report.outcome, Outcome::TimedOut);
        assert_eq!(engine.graph().read().entity_count(), 1);
        assert_eq!(engine.stats().timed_out, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_discards_results() {
        let (engine, email) = engine(EngineConfig::default());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let report = engine
            .execute_detailed(
                &scripted(Behaviour::Sleep(Duration::from_secs(10))),
                &email,
                cancel,
            )
            .await;
        assert_eq!(report.outcome, Outcome::Cancelled);
        assert_eq!(engine.graph().read().entity_count(), 1);
        assert!(engine.status().active().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_incompatible_entity_type() {
        let (engine, _) = engine(EngineConfig::default());
        let mut props = Properties::new();
        props.insert("text".into(), "hello".into());
        let text = engine.graph().write().add_entity("Text", props).unwrap().id().clone();
        let report = engine
            .execute_detailed(&scripted(Behaviour::Produce), &text, CancellationToken::new())
            .await;
        assert!(matches!(report.outcome, Outcome::Rejected(_)));
    }

    #[tokio::test]
    async fn test_undeclared_output_type_fails_run() {
        let (engine, email) = engine(EngineConfig::default());
        let report = engine
            .execute_detailed(&scripted(Behaviour::WrongType), &email, CancellationToken::new())
            .await;
        assert!(matches!(report.outcome, Outcome::Failed(ref m) if m.contains("Phone")));
        assert_eq!(engine.graph().read().entity_count(), 1);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let (engine, email) = engine(EngineConfig::default());
        let transform: Arc<dyn Transform> = Arc::new(EmailToUsername::new());
        engine.execute(&transform, &email).await;
        let count = engine.graph().read().entity_count();
        engine.execute(&transform, &email).await;
        assert_eq!(engine.graph().read().entity_count(), count);
        assert_eq!(engine.graph().read().relationship_count(), 1);
    }
}
