use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use roadmap_core::model::{QuizMode, QuizPlan, QuizStatus, QuizTarget, Topic};

use crate::Clock;
use crate::api::ContentApi;
use crate::completion::CompletionTracker;
use crate::error::{CompletionServiceError, FetchError, QuizError};

use super::machine::{QuizOutcome, QuizSession, SubmitTrigger};

/// A quiz session shared between the caller and its countdown.
///
/// The lock is never held across an await.
pub type SharedQuiz = Arc<Mutex<QuizSession>>;

#[must_use]
pub fn shared(session: QuizSession) -> SharedQuiz {
    Arc::new(Mutex::new(session))
}

pub(crate) fn lock(quiz: &SharedQuiz) -> MutexGuard<'_, QuizSession> {
    quiz.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Result of a submission, with any follow-up writes that failed.
///
/// The outcome stands even when syncing it did not.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizReport {
    pub outcome: QuizOutcome,
    pub sync_errors: Vec<String>,
}

impl QuizReport {
    #[must_use]
    pub fn is_fully_synced(&self) -> bool {
        self.sync_errors.is_empty()
    }
}

/// Drives `QuizSession` transitions through the content API and the tracker.
#[derive(Clone)]
pub struct QuizService {
    clock: Clock,
    api: Arc<dyn ContentApi>,
    completion: Arc<CompletionTracker>,
}

impl QuizService {
    #[must_use]
    pub fn new(clock: Clock, api: Arc<dyn ContentApi>, completion: Arc<CompletionTracker>) -> Self {
        Self {
            clock,
            api,
            completion,
        }
    }

    /// Start a quiz with the standard plan for `mode`.
    ///
    /// # Errors
    ///
    /// Returns `QuizError` for invalid plans, locked quizzes, or generation failures.
    pub async fn start(&self, quiz: &SharedQuiz, mode: QuizMode) -> Result<(), QuizError> {
        let target = lock(quiz).target().clone();
        let plan = QuizPlan::for_mode(mode, &target)?;
        self.start_with_plan(quiz, mode, plan).await
    }

    /// Start a quiz with an explicit plan.
    ///
    /// # Errors
    ///
    /// Returns `QuizError` for locked quizzes or generation failures.
    pub async fn start_with_plan(
        &self,
        quiz: &SharedQuiz,
        mode: QuizMode,
        plan: QuizPlan,
    ) -> Result<(), QuizError> {
        let subject = lock(quiz).target().subject().to_owned();
        let status = if mode.is_practice() {
            QuizStatus::default()
        } else {
            self.current_status(&subject).await?
        };

        let ticket = lock(quiz).begin(mode, plan, status)?;
        info!(
            subject = %subject,
            quiz_type = %ticket.request.quiz_type,
            questions = ticket.request.num_questions,
            "generating quiz"
        );

        match self.api.generate_quiz(&ticket.request).await {
            Ok(questions) => lock(quiz).questions_loaded(ticket.load_id, questions),
            Err(err) => {
                warn!(subject = %subject, error = %err, "quiz generation failed");
                lock(quiz).load_failed(ticket.load_id, &err);
                Err(err.into())
            }
        }
    }

    /// Remote status merged into the local one; local only if the remote is unreachable.
    async fn current_status(&self, subject: &str) -> Result<QuizStatus, QuizError> {
        match self
            .completion
            .sync_quiz_status(self.api.as_ref(), subject)
            .await
        {
            Ok(status) => Ok(status),
            Err(CompletionServiceError::Fetch(FetchError::Unauthorized)) => {
                Err(FetchError::Unauthorized.into())
            }
            Err(err) => {
                warn!(subject, error = %err, "quiz status sync failed; using local status");
                Ok(self.completion.quiz_status(subject).await?)
            }
        }
    }

    /// Grade the current answers and record the result.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Validation` when a manual submission has no
    /// descriptive answer, `QuizError::InvalidTransition` if the quiz is not
    /// active (including a submission already in progress), or
    /// `QuizError::Fetch` if grading fails (the quiz is active again).
    pub async fn submit(
        &self,
        quiz: &SharedQuiz,
        trigger: SubmitTrigger,
    ) -> Result<QuizReport, QuizError> {
        let plan = lock(quiz).begin_submit(trigger)?;

        let graded = if plan.answers.is_empty() {
            Vec::new()
        } else {
            match self.api.analyze_answers(&plan.answers).await {
                Ok(graded) => graded,
                Err(err) => {
                    warn!(error = %err, "grading failed");
                    lock(quiz).grading_failed(&err);
                    return Err(err.into());
                }
            }
        };

        let (outcome, topic, target, mode) = {
            let mut session = lock(quiz);
            let outcome = session.grading_complete(&graded, self.clock.now())?;
            (
                outcome,
                Arc::clone(session.topic()),
                session.target().clone(),
                session.mode(),
            )
        };
        info!(
            subject = target.subject(),
            score = outcome.scores.final_score(),
            total = outcome.scores.final_total(),
            passed = outcome.passed,
            ?trigger,
            "quiz graded"
        );

        let sync_errors = match mode {
            Some(mode) => self.record(&topic, &target, mode, &outcome).await,
            None => Vec::new(),
        };
        Ok(QuizReport {
            outcome,
            sync_errors,
        })
    }

    /// Persist the attempt; mandatory results also update status and completion.
    async fn record(
        &self,
        topic: &Topic,
        target: &QuizTarget,
        mode: QuizMode,
        outcome: &QuizOutcome,
    ) -> Vec<String> {
        let mut errors = Vec::new();
        let subject = target.subject();

        if let Err(err) = self.api.save_quiz_attempt(&outcome.attempt).await {
            warn!(subject, error = %err, "saving quiz attempt failed");
            errors.push(format!("saving quiz attempt: {err}"));
        }

        let Some(kind) = mode.mandatory_kind() else {
            return errors;
        };

        if let Err(err) = self
            .api
            .set_quiz_status(subject, kind, outcome.passed)
            .await
        {
            warn!(subject, error = %err, "remote quiz status update failed");
            errors.push(format!("updating remote quiz status: {err}"));
        }

        if let Err(err) = self
            .completion
            .record_quiz_result(subject, kind, outcome.passed)
            .await
        {
            warn!(subject, error = %err, "local quiz status update failed");
            errors.push(format!("updating local quiz status: {err}"));
        }

        if outcome.passed {
            if let Some(module) = target.module() {
                if let Err(err) = self.completion.mark_module_complete(topic, module).await {
                    warn!(subject, error = %err, "marking module complete failed");
                    errors.push(format!("marking module complete: {err}"));
                }
            }
        }

        errors
    }
}
