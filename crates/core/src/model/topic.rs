use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{ModuleId, TopicId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TopicError {
    #[error("topic title cannot be empty")]
    EmptyTitle,

    #[error("module title cannot be empty")]
    EmptyModuleTitle,

    #[error("module {0} appears more than once")]
    DuplicateModule(ModuleId),
}

//
// ─── MODULE ────────────────────────────────────────────────────────────────────
//

/// One node of a generated roadmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    id: ModuleId,
    title: String,
    description: String,
}

impl Module {
    /// Build a module, trimming its title.
    ///
    /// # Errors
    ///
    /// Returns `TopicError::EmptyModuleTitle` for a blank title.
    pub fn new(
        id: ModuleId,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, TopicError> {
        let title = title.into().trim().to_owned();
        if title.is_empty() {
            return Err(TopicError::EmptyModuleTitle);
        }
        Ok(Self {
            id,
            title,
            description: description.into(),
        })
    }

    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

//
// ─── TOPIC ─────────────────────────────────────────────────────────────────────
//

/// The root subject of a generated roadmap and its modules.
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    id: TopicId,
    title: String,
    modules: Vec<Module>,
}

impl Topic {
    /// Build a topic from its generated modules.
    ///
    /// # Errors
    ///
    /// Returns `TopicError::EmptyTitle` for a blank title and
    /// `TopicError::DuplicateModule` when two modules share an id.
    pub fn new(
        id: TopicId,
        title: impl Into<String>,
        modules: Vec<Module>,
    ) -> Result<Self, TopicError> {
        let title = title.into().trim().to_owned();
        if title.is_empty() {
            return Err(TopicError::EmptyTitle);
        }

        let mut seen = HashSet::with_capacity(modules.len());
        for module in &modules {
            if !seen.insert(module.id()) {
                return Err(TopicError::DuplicateModule(module.id()));
            }
        }

        Ok(Self { id, title, modules })
    }

    #[must_use]
    pub fn id(&self) -> TopicId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    #[must_use]
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.iter().find(|module| module.id() == id)
    }

    #[must_use]
    pub fn contains(&self, id: ModuleId) -> bool {
        self.module(id).is_some()
    }
}
