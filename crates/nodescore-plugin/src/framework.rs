//! Scheduler framework contract.
//!
//! A scoring plugin is a [`NodeScorer`]; if it also wants a finishing
//! pass over the collected scores it hands out a [`ScoreFinisher`]
//! from [`NodeScorer::score_extensions`].

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use nodescore_core::{Context, NodeScoreList, PodRef};

/// Boxed future returned by object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ── Status ─────────────────────────────────────────────────────────

/// Outcome class of a plugin call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Success,
    /// The call failed for this node only.
    Error,
    /// The plugin has nothing to say for this call.
    Skip,
}

/// Result of a plugin call as seen by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: Code,
    reasons: Vec<String>,
}

impl Status {
    pub fn success() -> Self {
        Self {
            code: Code::Success,
            reasons: Vec::new(),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            code: Code::Error,
            reasons: vec![reason.into()],
        }
    }

    pub fn skip() -> Self {
        Self {
            code: Code::Skip,
            reasons: Vec::new(),
        }
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    pub fn is_success(&self) -> bool {
        self.code == Code::Success
    }

    pub fn is_skip(&self) -> bool {
        self.code == Code::Skip
    }

    /// All reasons joined into one line.
    pub fn message(&self) -> String {
        self.reasons.join(", ")
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reasons.is_empty() {
            write!(f, "{:?}", self.code)
        } else {
            write!(f, "{:?}: {}", self.code, self.message())
        }
    }
}

// ── Cycle state ────────────────────────────────────────────────────

type StateValue = Arc<dyn Any + Send + Sync>;

/// Data shared by every plugin call of one scheduling cycle.
///
/// A fresh `CycleState` is created per cycle and dropped at its end, so
/// nothing written here outlives the cycle.
#[derive(Default)]
pub struct CycleState {
    data: RwLock<HashMap<&'static str, StateValue>>,
}

impl fmt::Debug for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("CycleState")
            .field("keys", &data.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CycleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed read; `None` if absent or stored under a different type.
    pub fn read<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.get(key).cloned()?.downcast::<T>().ok()
    }

    #[cfg(test)]
    fn write<T: Any + Send + Sync>(&self, key: &'static str, value: Arc<T>) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.insert(key, value);
    }

    /// Return the value under `key`, creating it with `init` on first use.
    ///
    /// `init` runs at most once per key even under concurrent callers.
    pub fn get_or_insert_with<T, F>(&self, key: &'static str, init: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Arc<T>,
    {
        if let Some(existing) = self.read::<T>(key) {
            return existing;
        }

        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = data.get(key).cloned().and_then(|v| v.downcast::<T>().ok()) {
            return existing;
        }
        let value = init();
        data.insert(key, value.clone());
        value
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Plugin traits ──────────────────────────────────────────────────

/// Anything the scheduler can load.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
}

/// Per-node scoring. Called concurrently for different nodes of the
/// same cycle.
pub trait NodeScorer: Plugin {
    fn score<'a>(
        &'a self,
        ctx: &'a Context,
        state: &'a CycleState,
        pod: &'a PodRef,
        node_name: &'a str,
    ) -> BoxFuture<'a, (i64, Status)>;

    /// The finishing pass, if the plugin has one.
    fn score_extensions(&self) -> Option<&dyn ScoreFinisher> {
        None
    }
}

/// Finishing pass over all scores of a cycle. Called once, after every
/// `score` call has returned.
pub trait ScoreFinisher: Send + Sync {
    fn normalize_score(
        &self,
        ctx: &Context,
        state: &CycleState,
        pod: &PodRef,
        scores: &mut NodeScoreList,
    ) -> Status;
}
