use thiserror::Error;

use crate::model::{CompletionError, QuizPlanError, TopicError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Topic(#[from] TopicError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    QuizPlan(#[from] QuizPlanError),
}
