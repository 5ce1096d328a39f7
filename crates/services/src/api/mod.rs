//! Client side of the content generation backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use roadmap_core::model::{
    DetailSection, MandatoryKind, Question, QuizAttempt, QuizStatus, QuizType, SubDetailKey,
};

use crate::error::FetchError;

mod http;

pub use http::HttpContentClient;

/// Which kind of saved note to look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    Details,
    SubDetails,
}

impl NoteKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            NoteKind::Details => "details",
            NoteKind::SubDetails => "sub_details",
        }
    }
}

/// Previously generated content the backend kept for this user.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SavedNote {
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub metadata: Value,
}

impl SavedNote {
    /// The `metadata.term` a sub-detail note was saved under.
    #[must_use]
    pub fn term(&self) -> Option<&str> {
        self.metadata.get("term").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuizRequest {
    pub topic: String,
    pub num_questions: u32,
    pub quiz_type: QuizType,
}

/// One descriptive answer sent for grading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerForGrading {
    pub question: String,
    pub user_answer: String,
    pub ideal_answer: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GradedAnswer {
    pub score: f64,
    #[serde(default)]
    pub feedback: Option<String>,
}

/// Calls made against the content generation backend.
///
/// One attempt per call; callers that lose interest simply drop the result.
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// Saved notes of `kind` for a topic title.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` on transport, status, or decode failures.
    async fn saved_notes(&self, topic: &str, kind: NoteKind) -> Result<Vec<SavedNote>, FetchError>;

    /// Generate the structured details of a module.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::ServiceUnavailable` when the generator is offline.
    async fn generate_details(&self, title: &str) -> Result<Vec<DetailSection>, FetchError>;

    /// Generate the rich-text explanation of a term, fenced or not.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` on transport, status, or decode failures.
    async fn generate_sub_details(&self, key: &SubDetailKey) -> Result<String, FetchError>;

    /// # Errors
    ///
    /// Returns `FetchError` on transport, status, or decode failures.
    async fn generate_quiz(&self, request: &QuizRequest) -> Result<Vec<Question>, FetchError>;

    /// Grade descriptive answers; results come back in request order.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` on transport, status, or decode failures.
    async fn analyze_answers(
        &self,
        answers: &[AnswerForGrading],
    ) -> Result<Vec<GradedAnswer>, FetchError>;

    /// # Errors
    ///
    /// Returns `FetchError` on transport or status failures.
    async fn save_quiz_attempt(&self, attempt: &QuizAttempt) -> Result<(), FetchError>;

    /// # Errors
    ///
    /// Returns `FetchError` on transport, status, or decode failures.
    async fn quiz_status(&self, topic: &str) -> Result<QuizStatus, FetchError>;

    /// Store a mandatory quiz result remotely and return the merged status.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` on transport, status, or decode failures.
    async fn set_quiz_status(
        &self,
        topic: &str,
        kind: MandatoryKind,
        passed: bool,
    ) -> Result<QuizStatus, FetchError>;
}
