//! Question decomposition: subtask graph construction, dependency-driven
//! scheduling, and result synthesis.
//!
//! The decomposer returns flat string dependency references; the scheduler
//! rebuilds them into an arena-indexed DAG and rejects malformed graphs
//! before dispatching anything. Concurrency is dependency-driven: every
//! currently-ready node runs at once, not a fixed worker pool.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::classifier::{ChallengeClassifier, LexicalClassifier};
use crate::config::ConclaveConfig;
use crate::cost::{CostGovernor, SharedCostGovernor};
use crate::debate::engine::{abort_on_cancel, ConsensusEngine, RunFailure};
use crate::debate::state::RunContext;
use crate::error::{ConsensusError, DecompositionError, ProviderError};
use crate::events::{EventBus, RunEvent, SharedEventBus};
use crate::prompts;
use crate::registry::{CapabilityRegistry, ModelProfile, ModelRef, SendRequest};
use crate::selector::ModelSelector;
use crate::storage::{ContributionRole, NoopTranscriptStore, TranscriptStore};
use crate::voting::VotingAggregator;

/// Minimum useful decomposition size.
pub const MIN_SUBTASKS: usize = 2;

/// One subtask as produced by the decomposer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskSpec {
    /// Short unique identifier within the plan.
    pub id: String,
    /// The subtask question.
    pub description: String,
    /// Ids of subtasks whose results this one needs.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Lifecycle of one subtask node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    Pending,
    Ready,
    Running,
    Done,
    Failed,
}

impl std::fmt::Display for SubtaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A subtask with its execution state and, once done, its completed run.
#[derive(Debug, Clone)]
pub struct SubtaskNode {
    pub spec: SubtaskSpec,
    pub status: SubtaskStatus,
    pub result: Option<RunContext>,
}

/// Produces a subtask plan for a question.
#[async_trait]
pub trait Decomposer: Send + Sync {
    async fn decompose(
        &self,
        question: &str,
        max_subtasks: usize,
    ) -> Result<Vec<SubtaskSpec>, ConsensusError>;
}

/// Arena-indexed dependency graph, validated acyclic at construction.
#[derive(Debug)]
pub struct SubtaskGraph {
    nodes: Vec<SubtaskNode>,
    index: HashMap<String, usize>,
}

impl SubtaskGraph {
    /// Build and validate a graph from flat specs. Rejects out-of-bounds
    /// counts, duplicate ids, unknown dependencies, and cycles, all before
    /// any execution.
    pub fn build(specs: Vec<SubtaskSpec>, max_subtasks: usize) -> Result<Self, DecompositionError> {
        if !(MIN_SUBTASKS..=max_subtasks).contains(&specs.len()) {
            return Err(DecompositionError::SubtaskCount {
                got: specs.len(),
                min: MIN_SUBTASKS,
                max: max_subtasks,
            });
        }

        let mut index = HashMap::new();
        for (i, spec) in specs.iter().enumerate() {
            if index.insert(spec.id.clone(), i).is_some() {
                return Err(DecompositionError::InvalidPlan {
                    message: format!("duplicate subtask id '{}'", spec.id),
                });
            }
        }

        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let petgraph_nodes: Vec<NodeIndex> = (0..specs.len()).map(|i| graph.add_node(i)).collect();
        for (i, spec) in specs.iter().enumerate() {
            for dep in &spec.depends_on {
                let dep_idx = index.get(dep).ok_or_else(|| {
                    DecompositionError::UnknownDependency {
                        node: spec.id.clone(),
                        dependency: dep.clone(),
                    }
                })?;
                graph.add_edge(petgraph_nodes[*dep_idx], petgraph_nodes[i], ());
            }
        }

        if let Err(cycle) = toposort(&graph, None) {
            let arena_idx = graph[cycle.node_id()];
            return Err(DecompositionError::CyclicGraph {
                node: specs[arena_idx].id.clone(),
            });
        }

        let nodes = specs
            .into_iter()
            .map(|spec| SubtaskNode {
                spec,
                status: SubtaskStatus::Pending,
                result: None,
            })
            .collect();
        Ok(Self { nodes, index })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[SubtaskNode] {
        &self.nodes
    }

    fn node(&self, id: &str) -> Option<&SubtaskNode> {
        self.index.get(id).map(|i| &self.nodes[*i])
    }

    /// Pending nodes whose dependencies are all done.
    pub fn ready_indices(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| {
                node.status == SubtaskStatus::Pending
                    && node.spec.depends_on.iter().all(|dep| {
                        self.node(dep)
                            .map(|d| d.status == SubtaskStatus::Done)
                            .unwrap_or(false)
                    })
            })
            .map(|(i, _)| i)
            .collect()
    }

    pub fn all_done(&self) -> bool {
        self.nodes.iter().all(|n| n.status == SubtaskStatus::Done)
    }

    /// Completed (id, decision) pairs for the given dependency ids.
    fn dependency_results(&self, deps: &[String]) -> Vec<(String, String)> {
        deps.iter()
            .filter_map(|dep| {
                self.node(dep).and_then(|n| {
                    n.result
                        .as_ref()
                        .and_then(|r| r.decision.clone())
                        .map(|d| (dep.clone(), d))
                })
            })
            .collect()
    }
}

/// Decomposer that prompts a registry model for a JSON subtask plan.
pub struct RegistryDecomposer {
    registry: Arc<dyn CapabilityRegistry>,
    governor: SharedCostGovernor,
    store: Arc<dyn TranscriptStore>,
    timeout: Duration,
}

impl RegistryDecomposer {
    pub fn new(
        registry: Arc<dyn CapabilityRegistry>,
        governor: SharedCostGovernor,
        store: Arc<dyn TranscriptStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            governor,
            store,
            timeout,
        }
    }
}

#[async_trait]
impl Decomposer for RegistryDecomposer {
    async fn decompose(
        &self,
        question: &str,
        max_subtasks: usize,
    ) -> Result<Vec<SubtaskSpec>, ConsensusError> {
        let pool = self.registry.list_models().await;
        let model = ModelSelector.select_proposer(&pool)?;
        let profiles: HashMap<ModelRef, ModelProfile> =
            pool.into_iter().map(|p| (p.model.clone(), p)).collect();

        let prompt = prompts::decompose_prompt(question, max_subtasks);
        let request = SendRequest::from_prompt(&prompt);
        let completion =
            match tokio::time::timeout(self.timeout, self.registry.send(&model, request)).await {
                Ok(result) => result.map_err(ConsensusError::Provider)?,
                Err(_) => {
                    return Err(ConsensusError::Provider(ProviderError::Timeout {
                        model: model.to_string(),
                        elapsed_ms: self.timeout.as_millis() as u64,
                    }))
                }
            };

        if let Some(profile) = profiles.get(&model) {
            let (cost, _) = self.governor.record(profile, completion.usage);
            if let Err(e) = self
                .store
                .add_contribution(
                    "decompose",
                    &model,
                    ContributionRole::Decomposer,
                    &completion.content,
                    completion.usage,
                    cost,
                )
                .await
            {
                warn!("Failed to persist decomposition plan: {e}");
            }
        }

        parse_subtask_plan(&completion.content).map_err(ConsensusError::Decomposition)
    }
}

/// Extract a JSON subtask array from model output, tolerating code fences
/// and surrounding prose.
pub fn parse_subtask_plan(raw: &str) -> Result<Vec<SubtaskSpec>, DecompositionError> {
    let start = raw.find('[');
    let end = raw.rfind(']');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &raw[s..=e],
        _ => {
            return Err(DecompositionError::InvalidPlan {
                message: "no JSON array found in decomposer output".to_string(),
            })
        }
    };
    serde_json::from_str(json).map_err(|e| DecompositionError::InvalidPlan {
        message: format!("unparseable plan: {e}"),
    })
}

/// Which protocol runs each subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskProtocol {
    #[default]
    Consensus,
    Voting,
}

/// Schedules a decomposed question: one nested run per node, admitted as
/// dependencies complete, then one synthesis call.
pub struct DecompositionScheduler {
    registry: Arc<dyn CapabilityRegistry>,
    config: ConclaveConfig,
    governor: SharedCostGovernor,
    events: SharedEventBus,
    store: Arc<dyn TranscriptStore>,
    classifier: Arc<dyn ChallengeClassifier>,
    cancel: watch::Receiver<bool>,
    protocol: SubtaskProtocol,
}

impl DecompositionScheduler {
    /// Build a scheduler with default collaborators.
    pub fn new(registry: Arc<dyn CapabilityRegistry>, config: ConclaveConfig) -> Self {
        let (_, cancel) = watch::channel(false);
        let governor =
            CostGovernor::new(config.cost.warn_threshold, config.cost.hard_limit).shared();
        Self::with_collaborators(
            registry,
            config,
            governor,
            EventBus::new().shared(),
            Arc::new(NoopTranscriptStore),
            Arc::new(LexicalClassifier::new()),
            cancel,
        )
    }

    pub fn with_collaborators(
        registry: Arc<dyn CapabilityRegistry>,
        config: ConclaveConfig,
        governor: SharedCostGovernor,
        events: SharedEventBus,
        store: Arc<dyn TranscriptStore>,
        classifier: Arc<dyn ChallengeClassifier>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry,
            config,
            governor,
            events,
            store,
            classifier,
            cancel,
            protocol: SubtaskProtocol::Consensus,
        }
    }

    /// Run subtasks under the voting protocol instead of full debates.
    pub fn with_protocol(mut self, protocol: SubtaskProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    pub fn governor(&self) -> &SharedCostGovernor {
        &self.governor
    }

    /// Decompose the question with the given decomposer, execute the graph,
    /// and synthesize a final decision into the parent context.
    pub async fn run(
        &self,
        question: &str,
        decomposer: &dyn Decomposer,
    ) -> Result<RunContext, RunFailure> {
        let mut parent = RunContext::new(question, self.config.consensus.max_rounds);
        info!(run_id = %parent.id, "Decomposition run started");

        match self.drive(&mut parent, question, decomposer).await {
            Ok(()) => {
                self.events.publish(RunEvent::RunCompleted {
                    run_id: parent.id.clone(),
                    decision: parent.decision.clone().unwrap_or_default(),
                    confidence: parent.confidence,
                    cost: parent.total_cost,
                    timestamp: Utc::now(),
                });
                Ok(parent)
            }
            Err(reason) => {
                let message = reason.to_string();
                if let Err(e) = parent.fail(&message) {
                    debug!("Run already terminal: {e}");
                }
                self.events.publish(RunEvent::RunFailed {
                    run_id: parent.id.clone(),
                    message,
                    timestamp: Utc::now(),
                });
                Err(RunFailure {
                    reason,
                    context: parent,
                })
            }
        }
    }

    async fn drive(
        &self,
        parent: &mut RunContext,
        question: &str,
        decomposer: &dyn Decomposer,
    ) -> Result<(), ConsensusError> {
        self.check_cancelled()?;
        self.governor.check_budget()?;

        let specs = abort_on_cancel(
            &self.cancel,
            decomposer.decompose(question, self.config.decompose.max_subtasks),
        )
        .await?;
        let mut graph = SubtaskGraph::build(specs, self.config.decompose.max_subtasks)?;
        info!(run_id = %parent.id, subtasks = graph.len(), "Subtask graph validated");

        self.execute_graph(parent, &mut graph).await?;

        self.check_cancelled()?;
        self.governor.check_budget()?;
        let results: Vec<(String, String)> = graph
            .nodes()
            .iter()
            .filter_map(|n| {
                n.result
                    .as_ref()
                    .and_then(|r| r.decision.clone())
                    .map(|d| (n.spec.id.clone(), d))
            })
            .collect();
        let synthesis = self.synthesize(parent, question, &results).await?;

        // Parent confidence is the mean of child confidences; the synthesis
        // call contributes no score of its own.
        let child_confidences: Vec<f64> = graph
            .nodes()
            .iter()
            .filter_map(|n| n.result.as_ref().map(|r| r.confidence))
            .collect();
        parent.confidence = if child_confidences.is_empty() {
            0.0
        } else {
            child_confidences.iter().sum::<f64>() / child_confidences.len() as f64
        };
        parent.dissent = graph
            .nodes()
            .iter()
            .filter_map(|n| n.result.as_ref().and_then(|r| r.dissent.clone()))
            .next();
        parent.decision = Some(synthesis);
        parent.finish("subtasks synthesized")?;
        Ok(())
    }

    /// Execute the graph dependency-driven. Concurrency follows the ready
    /// set, not fixed waves: each completion immediately admits whatever
    /// nodes it unlocked, so a fast branch never waits on a slow sibling.
    async fn execute_graph(
        &self,
        parent: &mut RunContext,
        graph: &mut SubtaskGraph,
    ) -> Result<(), ConsensusError> {
        if self.config.decompose.parallel {
            self.execute_dependency_driven(parent, graph).await
        } else {
            self.execute_sequential(parent, graph).await
        }
    }

    async fn execute_dependency_driven(
        &self,
        parent: &mut RunContext,
        graph: &mut SubtaskGraph,
    ) -> Result<(), ConsensusError> {
        let mut in_flight = FuturesUnordered::new();
        loop {
            self.check_cancelled()?;
            self.governor.check_budget()?;

            for i in graph.ready_indices() {
                let question = self.start_node(parent, graph, i);
                in_flight.push(async move { (i, self.run_node(&question).await) });
            }

            if in_flight.is_empty() {
                if graph.all_done() {
                    return Ok(());
                }
                // Unreachable for a validated DAG; failed nodes abort below.
                return Err(DecompositionError::InvalidPlan {
                    message: "no runnable subtasks remain".to_string(),
                }
                .into());
            }

            if let Some((i, outcome)) = in_flight.next().await {
                self.settle_node(parent, graph, i, outcome)?;
            }
        }
    }

    async fn execute_sequential(
        &self,
        parent: &mut RunContext,
        graph: &mut SubtaskGraph,
    ) -> Result<(), ConsensusError> {
        while !graph.all_done() {
            self.check_cancelled()?;
            self.governor.check_budget()?;

            let Some(&i) = graph.ready_indices().first() else {
                return Err(DecompositionError::InvalidPlan {
                    message: "no runnable subtasks remain".to_string(),
                }
                .into());
            };
            let question = self.start_node(parent, graph, i);
            let outcome = self.run_node(&question).await;
            self.settle_node(parent, graph, i, outcome)?;
        }
        Ok(())
    }

    /// Mark a node running, announce it, and build its question.
    fn start_node(&self, parent: &RunContext, graph: &mut SubtaskGraph, i: usize) -> String {
        graph.nodes[i].status = SubtaskStatus::Running;
        self.events.publish(RunEvent::SubtaskStarted {
            run_id: parent.id.clone(),
            subtask_id: graph.nodes[i].spec.id.clone(),
            timestamp: Utc::now(),
        });
        self.node_question(&graph.nodes[i].spec, graph)
    }

    /// Fold one finished node back into the graph and the parent context.
    fn settle_node(
        &self,
        parent: &mut RunContext,
        graph: &mut SubtaskGraph,
        i: usize,
        outcome: Result<RunContext, RunFailure>,
    ) -> Result<(), ConsensusError> {
        let subtask_id = graph.nodes[i].spec.id.clone();
        match outcome {
            Ok(child) => {
                parent.record_usage(child.usage, child.total_cost);
                self.events.publish(RunEvent::SubtaskCompleted {
                    run_id: parent.id.clone(),
                    subtask_id: subtask_id.clone(),
                    confidence: child.confidence,
                    timestamp: Utc::now(),
                });
                debug!(subtask = %subtask_id, confidence = child.confidence, "Subtask done");
                graph.nodes[i].status = SubtaskStatus::Done;
                // Copied, never aliased: the child context moves in.
                graph.nodes[i].result = Some(child);
                Ok(())
            }
            Err(failure) => {
                graph.nodes[i].status = SubtaskStatus::Failed;
                parent.record_usage(failure.context.usage, failure.context.total_cost);
                warn!(subtask = %subtask_id, "Subtask failed: {}", failure.reason);
                Err(failure.reason)
            }
        }
    }

    /// Node question: the description augmented with completed dependency
    /// decisions.
    fn node_question(&self, spec: &SubtaskSpec, graph: &SubtaskGraph) -> String {
        let deps = graph.dependency_results(&spec.depends_on);
        if deps.is_empty() {
            return spec.description.clone();
        }
        let mut question = spec.description.clone();
        question.push_str("\n\nResults from prerequisite subtasks:\n");
        for (id, decision) in deps {
            question.push_str(&format!("--- {id} ---\n{decision}\n"));
        }
        question
    }

    /// Run one node as a nested run sharing this scheduler's governor, bus,
    /// store, and cancel signal.
    async fn run_node(&self, question: &str) -> Result<RunContext, RunFailure> {
        match self.protocol {
            SubtaskProtocol::Consensus => {
                let engine = ConsensusEngine::with_collaborators(
                    Arc::clone(&self.registry),
                    self.config.clone(),
                    Arc::clone(&self.governor),
                    Arc::clone(&self.events),
                    Arc::clone(&self.store),
                    Arc::clone(&self.classifier),
                    self.cancel.clone(),
                );
                engine.run(question).await
            }
            SubtaskProtocol::Voting => {
                let aggregator = VotingAggregator::with_collaborators(
                    Arc::clone(&self.registry),
                    self.config.clone(),
                    Arc::clone(&self.governor),
                    Arc::clone(&self.events),
                    Arc::clone(&self.store),
                    self.cancel.clone(),
                );
                aggregator.run(question).await
            }
        }
    }

    /// One synthesis call merging subtask decisions into a final answer.
    async fn synthesize(
        &self,
        parent: &mut RunContext,
        question: &str,
        results: &[(String, String)],
    ) -> Result<String, ConsensusError> {
        let pool = self.registry.list_models().await;
        let model = ModelSelector.select_proposer(&pool)?;
        let profiles: HashMap<ModelRef, ModelProfile> =
            pool.into_iter().map(|p| (p.model.clone(), p)).collect();

        let prompt = prompts::synthesis_prompt(question, results);
        let timeout = Duration::from_secs(self.config.consensus.request_timeout_secs);
        let request = SendRequest::from_prompt(&prompt);
        let completion = abort_on_cancel(&self.cancel, async {
            match tokio::time::timeout(timeout, self.registry.send(&model, request)).await {
                Ok(result) => result.map_err(ConsensusError::Provider),
                Err(_) => Err(ConsensusError::Provider(ProviderError::Timeout {
                    model: model.to_string(),
                    elapsed_ms: timeout.as_millis() as u64,
                })),
            }
        })
        .await?;

        if let Some(profile) = profiles.get(&model) {
            let (cost, _) = self.governor.record(profile, completion.usage);
            parent.record_usage(completion.usage, cost);
            if let Err(e) = self
                .store
                .add_contribution(
                    &parent.id,
                    &model,
                    ContributionRole::Synthesizer,
                    &completion.content,
                    completion.usage,
                    cost,
                )
                .await
            {
                warn!("Failed to persist synthesis: {e}");
            }
        }

        Ok(completion.content)
    }

    fn check_cancelled(&self) -> Result<(), ConsensusError> {
        if *self.cancel.borrow() {
            return Err(ConsensusError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: &str, deps: &[&str]) -> SubtaskSpec {
        SubtaskSpec {
            id: id.to_string(),
            description: format!("solve {id}"),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn test_valid_graph_builds() {
        let graph = SubtaskGraph::build(
            vec![spec("a", &[]), spec("b", &[]), spec("c", &["a", "b"])],
            5,
        )
        .unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.ready_indices(), vec![0, 1]);
    }

    #[test]
    fn test_cycle_rejected_before_execution() {
        let err = SubtaskGraph::build(vec![spec("a", &["b"]), spec("b", &["a"])], 5).unwrap_err();
        assert!(matches!(err, DecompositionError::CyclicGraph { .. }));
    }

    #[test]
    fn test_self_cycle_rejected() {
        let err =
            SubtaskGraph::build(vec![spec("a", &["a"]), spec("b", &[])], 5).unwrap_err();
        assert!(matches!(err, DecompositionError::CyclicGraph { .. }));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let err =
            SubtaskGraph::build(vec![spec("a", &[]), spec("b", &["ghost"])], 5).unwrap_err();
        match err {
            DecompositionError::UnknownDependency { node, dependency } => {
                assert_eq!(node, "b");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_count_bounds_enforced() {
        let err = SubtaskGraph::build(vec![spec("a", &[])], 5).unwrap_err();
        assert!(matches!(
            err,
            DecompositionError::SubtaskCount { got: 1, min: 2, max: 5 }
        ));

        let too_many: Vec<SubtaskSpec> = (0..6).map(|i| spec(&format!("s{i}"), &[])).collect();
        assert!(SubtaskGraph::build(too_many, 5).is_err());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = SubtaskGraph::build(vec![spec("a", &[]), spec("a", &[])], 5).unwrap_err();
        assert!(matches!(err, DecompositionError::InvalidPlan { .. }));
    }

    #[test]
    fn test_ready_unlocks_as_dependencies_complete() {
        let mut graph = SubtaskGraph::build(
            vec![spec("a", &[]), spec("b", &[]), spec("c", &["a", "b"])],
            5,
        )
        .unwrap();

        assert_eq!(graph.ready_indices(), vec![0, 1]);

        graph.nodes[0].status = SubtaskStatus::Done;
        // c still blocked on b.
        assert_eq!(graph.ready_indices(), vec![1]);

        graph.nodes[1].status = SubtaskStatus::Done;
        assert_eq!(graph.ready_indices(), vec![2]);
    }

    #[test]
    fn test_parse_plan_plain_json() {
        let raw = r#"[{"id": "a", "description": "first", "depends_on": []},
                      {"id": "b", "description": "second", "depends_on": ["a"]}]"#;
        let specs = parse_subtask_plan(raw).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].depends_on, vec!["a"]);
    }

    #[test]
    fn test_parse_plan_tolerates_fences_and_prose() {
        let raw = "Here is the plan:\n```json\n[{\"id\": \"x\", \"description\": \"only\"}, \
                   {\"id\": \"y\", \"description\": \"other\"}]\n```\nDone.";
        let specs = parse_subtask_plan(raw).unwrap();
        assert_eq!(specs.len(), 2);
        assert!(specs[0].depends_on.is_empty());
    }

    #[test]
    fn test_parse_plan_rejects_garbage() {
        assert!(parse_subtask_plan("no json here").is_err());
        assert!(parse_subtask_plan("[not valid json]").is_err());
    }
}
