//! One scoring cycle, driven the way the scheduler drives it.
//!
//! Every candidate node is scored concurrently (bounded by
//! `parallelism`) against a fresh [`CycleState`]. Successful scores then
//! go through the plugin's finishing pass exactly once. Per-node failures
//! are reported next to the scores and never abort the cycle.

use std::sync::Arc;

use futures::future::join_all;
use nodescore_core::{Context, NodeName, NodeScore, NodeScoreList, PodRef, ScoreRange};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::error::{PluginError, PluginResult};
use crate::framework::{Code, CycleState, NodeScorer, Status};

/// A node whose `score` call did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    pub node: NodeName,
    pub status: Status,
}

/// Outcome of one cycle.
#[derive(Debug, Default)]
pub struct CycleResult {
    /// Normalized scores, in candidate order.
    pub scores: NodeScoreList,
    pub failures: Vec<NodeFailure>,
    /// Nodes the plugin chose not to score.
    pub skipped: Vec<NodeName>,
}

impl CycleResult {
    /// Highest scoring node; ties go to the earliest candidate.
    pub fn best(&self) -> Option<&NodeScore> {
        self.scores
            .iter()
            .reduce(|best, s| if s.score > best.score { s } else { best })
    }
}

/// Score `nodes` for `pod` and run the finishing pass.
///
/// Fails only when the finishing pass fails, a normalized score lands
/// outside the framework range, or a worker task dies.
pub async fn run_cycle<P>(
    plugin: Arc<P>,
    ctx: &Context,
    pod: &PodRef,
    nodes: &[NodeName],
    parallelism: usize,
) -> PluginResult<CycleResult>
where
    P: NodeScorer + ?Sized + 'static,
{
    let state = Arc::new(CycleState::new());
    // Between one and one per node; never above the semaphore's limit.
    let permits = parallelism.min(nodes.len()).clamp(1, Semaphore::MAX_PERMITS);
    let semaphore = Arc::new(Semaphore::new(permits));

    let mut tasks = Vec::with_capacity(nodes.len());
    for node in nodes {
        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .map_err(|e| PluginError::Worker(e.to_string()))?;

        let plugin = Arc::clone(&plugin);
        let state = Arc::clone(&state);
        let ctx = ctx.clone();
        let pod = pod.clone();
        let node = node.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = permit;
            plugin.score(&ctx, &state, &pod, &node).await
        }));
    }

    let mut result = CycleResult::default();
    for (node, joined) in nodes.iter().zip(join_all(tasks).await) {
        let (raw, status) = joined.map_err(|e| PluginError::Worker(e.to_string()))?;
        match status.code() {
            Code::Success => result.scores.push(NodeScore::new(node.clone(), raw)),
            Code::Skip => result.skipped.push(node.clone()),
            Code::Error => result.failures.push(NodeFailure {
                node: node.clone(),
                status,
            }),
        }
    }

    debug!(
        plugin = plugin.name(),
        scored = result.scores.len(),
        failed = result.failures.len(),
        skipped = result.skipped.len(),
        "score phase complete"
    );

    if let Some(finisher) = plugin.score_extensions() {
        let status = finisher.normalize_score(ctx, &state, pod, &mut result.scores);
        if !status.is_success() {
            return Err(PluginError::Finish(status.message()));
        }
    }

    let range = ScoreRange::FRAMEWORK;
    if let Some(bad) = result.scores.iter().find(|s| !range.contains(s.score)) {
        return Err(PluginError::ScoreOutOfRange {
            node: bad.name.clone(),
            score: bad.score,
            min: range.min(),
            max: range.max(),
        });
    }

    info!(
        plugin = plugin.name(),
        %pod,
        best = result.best().map(|s| s.name.as_str()).unwrap_or("<none>"),
        "cycle complete"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::{BoxFuture, Plugin, ScoreFinisher};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scores each node by a fixed table, tracking peak concurrency.
    struct Table {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        finish: Option<Status>,
    }

    impl Table {
        fn new(finish: Option<Status>) -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                finish,
            }
        }
    }

    impl Plugin for Table {
        fn name(&self) -> &str {
            "Table"
        }
    }

    impl NodeScorer for Table {
        fn score<'a>(
            &'a self,
            _ctx: &'a Context,
            _state: &'a CycleState,
            _pod: &'a PodRef,
            node_name: &'a str,
        ) -> BoxFuture<'a, (i64, Status)> {
            Box::pin(async move {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);

                match node_name {
                    "skip" => (0, Status::skip()),
                    "fail" => (0, Status::error("boom")),
                    "wide" => (1000, Status::success()),
                    other => (other.len() as i64, Status::success()),
                }
            })
        }

        fn score_extensions(&self) -> Option<&dyn ScoreFinisher> {
            self.finish.as_ref().map(|_| self as &dyn ScoreFinisher)
        }
    }

    impl ScoreFinisher for Table {
        fn normalize_score(
            &self,
            _ctx: &Context,
            _state: &CycleState,
            _pod: &PodRef,
            scores: &mut NodeScoreList,
        ) -> Status {
            if self.finish.as_ref().is_some_and(Status::is_success) {
                crate::normalize(scores, ScoreRange::FRAMEWORK);
            }
            self.finish.clone().unwrap_or_else(Status::success)
        }
    }

    fn names(list: &[&str]) -> Vec<NodeName> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn pod() -> PodRef {
        PodRef::new("default", "web-0")
    }

    #[tokio::test]
    async fn separates_scores_failures_and_skips() {
        let plugin = Arc::new(Table::new(Some(Status::success())));
        let nodes = names(&["a", "fail", "ccc", "skip"]);

        let result = run_cycle(plugin, &Context::background(), &pod(), &nodes, 4)
            .await
            .unwrap();

        assert_eq!(result.scores, [NodeScore::new("a", 0), NodeScore::new("ccc", 100)]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].node, "fail");
        assert_eq!(result.skipped, ["skip"]);
        assert_eq!(result.best().map(|s| s.name.as_str()), Some("ccc"));
    }

    #[tokio::test]
    async fn respects_parallelism_bound() {
        let plugin = Arc::new(Table::new(Some(Status::success())));
        let nodes = names(&["a", "b", "c", "d", "e", "f"]);

        run_cycle(Arc::clone(&plugin), &Context::background(), &pod(), &nodes, 2)
            .await
            .unwrap();

        assert!(plugin.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn oversized_parallelism_is_capped() {
        let plugin = Arc::new(Table::new(Some(Status::success())));
        let nodes = names(&["a", "bb"]);

        let result = run_cycle(plugin, &Context::background(), &pod(), &nodes, usize::MAX)
            .await
            .unwrap();

        assert_eq!(result.scores, [NodeScore::new("a", 0), NodeScore::new("bb", 100)]);
    }

    #[tokio::test]
    async fn zero_parallelism_still_scores() {
        let plugin = Arc::new(Table::new(Some(Status::success())));
        let nodes = names(&["a", "bb"]);

        let result = run_cycle(Arc::clone(&plugin), &Context::background(), &pod(), &nodes, 0)
            .await
            .unwrap();

        assert_eq!(result.scores.len(), 2);
        assert_eq!(plugin.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_finishing_pass_fails_cycle() {
        let plugin = Arc::new(Table::new(Some(Status::error("cannot normalize"))));
        let nodes = names(&["a", "bb"]);

        let err = run_cycle(plugin, &Context::background(), &pod(), &nodes, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Finish(ref m) if m == "cannot normalize"));
    }

    #[tokio::test]
    async fn unnormalized_scores_out_of_range_are_rejected() {
        let plugin = Arc::new(Table::new(None));
        let nodes = names(&["a", "wide"]);

        let err = run_cycle(plugin, &Context::background(), &pod(), &nodes, 2)
            .await
            .unwrap_err();
        assert!(
            matches!(err, PluginError::ScoreOutOfRange { ref node, score: 1000, .. } if node == "wide")
        );
    }

    #[tokio::test]
    async fn empty_candidate_list() {
        let plugin = Arc::new(Table::new(Some(Status::success())));
        let result = run_cycle(plugin, &Context::background(), &pod(), &[], 4)
            .await
            .unwrap();
        assert!(result.scores.is_empty());
        assert!(result.best().is_none());
    }
}
