use std::sync::Arc;
use std::time::Duration;

use roadmap_core::model::{DetailSection, SubDetail, SubDetailKey};
use storage::repository::Storage;

use crate::Clock;
use crate::api::{ContentApi, HttpContentClient};
use crate::completion::CompletionTracker;
use crate::config::EngineConfig;
use crate::content_service::{ContentService, DetailSource};
use crate::error::FetchError;
use crate::quiz::QuizService;
use crate::selection::SelectionController;

/// Assembles the session engine's services over one API client and store.
#[derive(Clone)]
pub struct SessionEngine {
    api: Arc<dyn ContentApi>,
    content: Arc<ContentService>,
    completion: Arc<CompletionTracker>,
    quizzes: Arc<QuizService>,
}

impl SessionEngine {
    #[must_use]
    pub fn new(
        api: Arc<dyn ContentApi>,
        storage: &Storage,
        clock: Clock,
        poll_interval: Duration,
    ) -> Self {
        let completion = Arc::new(CompletionTracker::new(
            Arc::clone(&storage.kv),
            poll_interval,
        ));
        let content = Arc::new(ContentService::new(Arc::clone(&api)));
        let quizzes = Arc::new(QuizService::new(
            clock,
            Arc::clone(&api),
            Arc::clone(&completion),
        ));
        Self {
            api,
            content,
            completion,
            quizzes,
        }
    }

    /// Build an engine that talks HTTP to the configured backend.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if the HTTP client cannot be constructed.
    pub fn from_config(
        config: &EngineConfig,
        storage: &Storage,
        clock: Clock,
    ) -> Result<Self, FetchError> {
        let api: Arc<dyn ContentApi> = Arc::new(HttpContentClient::new(config.api.clone())?);
        Ok(Self::new(api, storage, clock, config.poll_interval))
    }

    #[must_use]
    pub fn api(&self) -> Arc<dyn ContentApi> {
        Arc::clone(&self.api)
    }

    #[must_use]
    pub fn content(&self) -> Arc<ContentService> {
        Arc::clone(&self.content)
    }

    #[must_use]
    pub fn completion(&self) -> Arc<CompletionTracker> {
        Arc::clone(&self.completion)
    }

    #[must_use]
    pub fn quizzes(&self) -> Arc<QuizService> {
        Arc::clone(&self.quizzes)
    }

    /// Controller for the expanded module card of a roadmap.
    #[must_use]
    pub fn module_selection(&self) -> SelectionController<String, Vec<DetailSection>> {
        let source: Arc<dyn DetailSource<String, Vec<DetailSection>>> = self.content();
        SelectionController::new(source)
    }

    /// Controller for the expanded study item inside a module.
    #[must_use]
    pub fn sub_detail_selection(&self) -> SelectionController<SubDetailKey, SubDetail> {
        let source: Arc<dyn DetailSource<SubDetailKey, SubDetail>> = self.content();
        SelectionController::new(source)
    }
}
