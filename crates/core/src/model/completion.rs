use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::ModuleId;
use crate::model::topic::Topic;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CompletionError {
    #[error("module {module} is not part of topic \"{topic}\"")]
    ModuleNotInTopic { topic: String, module: ModuleId },
}

/// Persisted progress of one topic.
///
/// `completed_modules` only ever holds modules of the owning topic.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    total_modules: u32,
    #[serde(default)]
    completed_modules: BTreeSet<ModuleId>,
}

impl CompletionRecord {
    /// A fresh record sized to the topic's modules.
    #[must_use]
    pub fn for_topic(topic: &Topic) -> Self {
        Self {
            total_modules: module_count(topic),
            completed_modules: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn total_modules(&self) -> u32 {
        self.total_modules
    }

    #[must_use]
    pub fn completed_modules(&self) -> &BTreeSet<ModuleId> {
        &self.completed_modules
    }

    /// Record a completed module. Returns `false` if it was already complete.
    ///
    /// # Errors
    ///
    /// Returns `CompletionError::ModuleNotInTopic` for a module the topic does not own.
    pub fn mark_complete(
        &mut self,
        topic: &Topic,
        module: ModuleId,
    ) -> Result<bool, CompletionError> {
        if !topic.contains(module) {
            return Err(CompletionError::ModuleNotInTopic {
                topic: topic.title().to_owned(),
                module,
            });
        }
        self.total_modules = module_count(topic);
        Ok(self.completed_modules.insert(module))
    }

    /// Re-align a record read from storage with the topic it belongs to.
    ///
    /// Returns `true` when anything changed.
    pub fn reconcile(&mut self, topic: &Topic) -> bool {
        let before = self.clone();
        self.total_modules = module_count(topic);
        self.completed_modules.retain(|id| topic.contains(*id));
        *self != before
    }

    /// Completion percentage, rounded and clamped to `0..=100`.
    #[must_use]
    pub fn percent(&self) -> u8 {
        if self.total_modules == 0 {
            return 0;
        }
        let done = self.completed_modules.len() as f64;
        let pct = (done / f64::from(self.total_modules) * 100.0).round();
        // Clamped above, so the cast cannot truncate.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let pct = pct.clamp(0.0, 100.0) as u8;
        pct
    }

    #[must_use]
    pub fn snapshot(&self) -> CompletionSnapshot {
        CompletionSnapshot {
            percent: self.percent(),
            completed_modules: self.completed_modules.clone(),
            total_modules: self.total_modules,
        }
    }
}

/// Read model returned to callers and published to watchers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompletionSnapshot {
    pub percent: u8,
    pub completed_modules: BTreeSet<ModuleId>,
    pub total_modules: u32,
}

impl CompletionSnapshot {
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.completed_modules.len()
    }
}

fn module_count(topic: &Topic) -> u32 {
    u32::try_from(topic.module_count()).unwrap_or(u32::MAX)
}
