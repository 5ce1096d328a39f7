//! Shared error types for the services crate.

use thiserror::Error;

use roadmap_core::model::{CompletionError, MandatoryKind, ModuleId, QuizPlanError};
use storage::repository::StorageError;

use crate::quiz::QuizPhase;

const OFFLINE_MESSAGE: &str =
    "The AI service is offline. Please restart the content generation backend and try again.";
const GENERIC_MESSAGE: &str = "Something went wrong while loading this content. Please try again.";

/// Errors emitted by the content API client.
///
/// Every request is a single attempt; nothing here is retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum FetchError {
    #[error("request was not authorized")]
    Unauthorized,
    #[error("content generation service is unavailable")]
    ServiceUnavailable,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request rejected with status {status}")]
    Rejected {
        status: u16,
        message: Option<String>,
    },
}

impl FetchError {
    /// True when the generation backend itself is down.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        matches!(self, FetchError::ServiceUnavailable)
    }

    /// Message suitable for showing inline next to the failed content.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            FetchError::ServiceUnavailable => OFFLINE_MESSAGE.to_owned(),
            FetchError::Rejected {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            _ => GENERIC_MESSAGE.to_owned(),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Malformed(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Errors emitted by `CompletionTracker`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompletionServiceError {
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Errors emitted by the quiz session machine and its workflow.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizError {
    #[error("{0}")]
    Validation(String),
    #[error("cannot {action} while the quiz is {phase:?}")]
    InvalidTransition {
        action: &'static str,
        phase: QuizPhase,
    },
    #[error("the mandatory {0:?} quiz has already been passed")]
    AlreadyPassed(MandatoryKind),
    #[error("the quiz generator returned no questions")]
    NoQuestions,
    #[error("question {0} does not exist")]
    NoSuchQuestion(usize),
    #[error("module {0} is not part of this topic")]
    UnknownModule(ModuleId),
    #[error(transparent)]
    Plan(#[from] QuizPlanError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Completion(#[from] CompletionServiceError),
}

/// Errors emitted while reading engine configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid API base URL: {raw}")]
    InvalidBaseUrl { raw: String },
    #[error("invalid value for {var}: {raw}")]
    InvalidNumber { var: &'static str, raw: String },
}
