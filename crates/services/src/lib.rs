#![forbid(unsafe_code)]

pub mod api;
pub mod completion;
pub mod config;
pub mod content_service;
pub mod detail_cache;
pub mod engine;
pub mod error;
pub mod quiz;
pub mod selection;

pub use roadmap_core::Clock;

pub use api::{ContentApi, HttpContentClient, NoteKind};
pub use completion::{CompletionTracker, CompletionWatch};
pub use config::{ApiConfig, EngineConfig};
pub use content_service::{ContentService, DetailSource};
pub use detail_cache::DetailCache;
pub use engine::SessionEngine;
pub use error::{CompletionServiceError, ConfigError, FetchError, QuizError};
pub use quiz::{
    QuizCountdown, QuizOutcome, QuizPhase, QuizReport, QuizService, QuizSession, SharedQuiz,
    SubmitTrigger,
};
pub use selection::{DetailView, SelectionController, SelectionSnapshot};
