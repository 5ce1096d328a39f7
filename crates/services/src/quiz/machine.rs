use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use roadmap_core::model::{
    ModuleId, Question, QuizAttempt, QuizMode, QuizPlan, QuizScores, QuizStatus, QuizTarget, Topic,
};

use crate::api::{AnswerForGrading, GradedAnswer, QuizRequest};
use crate::error::{FetchError, QuizError};

/// Shown when a manual submission has no descriptive answer at all.
pub const EMPTY_DESCRIPTIVE_MESSAGE: &str =
    "Please provide an answer for at least one descriptive question.";

//
// ─── PHASES ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizPhase {
    Start,
    Loading,
    Active,
    Grading,
    Results,
}

/// Who asked for grading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    Manual,
    Expired,
}

/// Result of advancing the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Nothing to count: untimed, or the quiz is no longer running.
    Idle,
    /// Grading is in progress; the clock is held.
    Paused,
    Running(Duration),
    Expired,
}

/// Handed out by `begin`; the load must be reported back with the same id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizTicket {
    pub load_id: u64,
    pub request: QuizRequest,
}

/// Descriptive answers that need remote grading, in question order.
///
/// Empty when there is nothing to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradingPlan {
    pub answers: Vec<AnswerForGrading>,
}

/// Scored result of a submitted quiz.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizOutcome {
    pub scores: QuizScores,
    pub passed: bool,
    pub feedback: String,
    /// Grader remarks per descriptive answer, when any were sent.
    pub answer_feedback: Vec<Option<String>>,
    pub attempt: QuizAttempt,
}

#[derive(Debug, Clone, Copy)]
struct PendingGrade {
    mcq_score: u32,
    mcq_total: u32,
    descriptive_total: u32,
    expected: usize,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One quiz screen: `Start → Loading → Active → Grading → Results`.
///
/// Pure state; all I/O happens in `QuizService`, which feeds results back in.
#[derive(Debug)]
pub struct QuizSession {
    topic: Arc<Topic>,
    target: QuizTarget,
    phase: QuizPhase,
    mode: Option<QuizMode>,
    plan: Option<QuizPlan>,
    questions: Vec<Question>,
    answers: Vec<Option<String>>,
    remaining: Option<Duration>,
    load_id: u64,
    pending: Option<PendingGrade>,
    outcome: Option<QuizOutcome>,
    last_error: Option<String>,
}

impl QuizSession {
    /// The roadmap's final quiz.
    #[must_use]
    pub fn final_quiz(topic: Arc<Topic>) -> Self {
        let target = QuizTarget::for_topic(&topic);
        Self::with_target(topic, target)
    }

    /// The quiz of one module.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::UnknownModule` if the topic has no such module.
    pub fn module_quiz(topic: Arc<Topic>, module: ModuleId) -> Result<Self, QuizError> {
        let target = topic
            .module(module)
            .map(|m| QuizTarget::for_module(&topic, m))
            .ok_or(QuizError::UnknownModule(module))?;
        Ok(Self::with_target(topic, target))
    }

    fn with_target(topic: Arc<Topic>, target: QuizTarget) -> Self {
        Self {
            topic,
            target,
            phase: QuizPhase::Start,
            mode: None,
            plan: None,
            questions: Vec::new(),
            answers: Vec::new(),
            remaining: None,
            load_id: 0,
            pending: None,
            outcome: None,
            last_error: None,
        }
    }

    #[must_use]
    pub fn topic(&self) -> &Arc<Topic> {
        &self.topic
    }

    #[must_use]
    pub fn target(&self) -> &QuizTarget {
        &self.target
    }

    #[must_use]
    pub fn phase(&self) -> QuizPhase {
        self.phase
    }

    #[must_use]
    pub fn mode(&self) -> Option<QuizMode> {
        self.mode
    }

    #[must_use]
    pub fn plan(&self) -> Option<&QuizPlan> {
        self.plan.as_ref()
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn answers(&self) -> &[Option<String>] {
        &self.answers
    }

    /// Time left on the countdown; `None` for untimed quizzes.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.remaining
    }

    #[must_use]
    pub fn outcome(&self) -> Option<&QuizOutcome> {
        self.outcome.as_ref()
    }

    /// Message of the last failed transition, for inline display.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Identifies the current run; changes on every start and cancel.
    #[must_use]
    pub fn run_id(&self) -> u64 {
        self.load_id
    }

    /// True while a submission is being graded.
    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.phase == QuizPhase::Grading
    }

    fn expect_phase(&self, expected: QuizPhase, action: &'static str) -> Result<(), QuizError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(QuizError::InvalidTransition {
                action,
                phase: self.phase,
            })
        }
    }

    //
    // ─── START / LOADING ───────────────────────────────────────────────────────
    //

    /// Leave `Start` and request questions.
    ///
    /// `status` is the pass record of this quiz's subject; a mandatory quiz
    /// that was already passed cannot be taken again.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::AlreadyPassed` for a locked mandatory quiz, or
    /// `QuizError::InvalidTransition` outside `Start`.
    pub fn begin(
        &mut self,
        mode: QuizMode,
        plan: QuizPlan,
        status: QuizStatus,
    ) -> Result<QuizTicket, QuizError> {
        self.expect_phase(QuizPhase::Start, "start a quiz")?;
        if let Some(kind) = mode.mandatory_kind() {
            if status.is_passed(kind) {
                return Err(QuizError::AlreadyPassed(kind));
            }
        }

        self.load_id += 1;
        let request = QuizRequest {
            topic: self.target.subject().to_owned(),
            num_questions: plan.question_count(),
            quiz_type: plan.quiz_type(),
        };
        self.mode = Some(mode);
        self.plan = Some(plan);
        self.outcome = None;
        self.last_error = None;
        self.phase = QuizPhase::Loading;

        Ok(QuizTicket {
            load_id: self.load_id,
            request,
        })
    }

    /// Accept generated questions for the load identified by `load_id`.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NoQuestions` (back in `Start`) for an empty list,
    /// or `QuizError::InvalidTransition` for a load that is no longer current.
    pub fn questions_loaded(
        &mut self,
        load_id: u64,
        questions: Vec<Question>,
    ) -> Result<(), QuizError> {
        self.expect_current_load(load_id)?;
        if questions.is_empty() {
            self.phase = QuizPhase::Start;
            self.last_error = Some(QuizError::NoQuestions.to_string());
            return Err(QuizError::NoQuestions);
        }

        self.answers = vec![None; questions.len()];
        self.questions = questions;
        self.remaining = self.plan.as_ref().and_then(QuizPlan::time_limit);
        self.phase = QuizPhase::Active;
        Ok(())
    }

    /// Question generation failed; return to `Start` with the error shown.
    pub fn load_failed(&mut self, load_id: u64, err: &FetchError) {
        if self.expect_current_load(load_id).is_ok() {
            self.phase = QuizPhase::Start;
            self.last_error = Some(err.user_message());
        }
    }

    fn expect_current_load(&self, load_id: u64) -> Result<(), QuizError> {
        self.expect_phase(QuizPhase::Loading, "load questions")?;
        if load_id == self.load_id {
            Ok(())
        } else {
            Err(QuizError::InvalidTransition {
                action: "load questions",
                phase: self.phase,
            })
        }
    }

    //
    // ─── ACTIVE ────────────────────────────────────────────────────────────────
    //

    /// Record the answer to question `index`; the text is kept verbatim.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NoSuchQuestion` or `QuizError::InvalidTransition`.
    pub fn answer(&mut self, index: usize, value: impl Into<String>) -> Result<(), QuizError> {
        self.expect_phase(QuizPhase::Active, "answer")?;
        let slot = self
            .answers
            .get_mut(index)
            .ok_or(QuizError::NoSuchQuestion(index))?;
        *slot = Some(value.into());
        Ok(())
    }

    /// Advance the countdown by `elapsed`.
    pub fn tick(&mut self, elapsed: Duration) -> Tick {
        match self.phase {
            QuizPhase::Active => {}
            QuizPhase::Grading => return Tick::Paused,
            _ => return Tick::Idle,
        }
        let Some(remaining) = self.remaining else {
            return Tick::Idle;
        };

        let remaining = remaining.saturating_sub(elapsed);
        self.remaining = Some(remaining);
        if remaining.is_zero() {
            Tick::Expired
        } else {
            Tick::Running(remaining)
        }
    }

    /// Abandon a quiz that is loading or in progress.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::InvalidTransition` from any other phase.
    pub fn cancel(&mut self) -> Result<(), QuizError> {
        if !matches!(self.phase, QuizPhase::Loading | QuizPhase::Active) {
            return Err(QuizError::InvalidTransition {
                action: "cancel",
                phase: self.phase,
            });
        }
        // Invalidates the in-flight load, if any.
        self.load_id += 1;
        self.reset();
        Ok(())
    }

    //
    // ─── GRADING ───────────────────────────────────────────────────────────────
    //

    /// Score the multiple-choice part and move to `Grading`.
    ///
    /// A manual submission with every descriptive answer blank is refused and
    /// the quiz stays `Active`. An expired timer submits regardless; if all
    /// descriptive answers are blank nothing is sent for grading.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Validation` or `QuizError::InvalidTransition`.
    pub fn begin_submit(&mut self, trigger: SubmitTrigger) -> Result<GradingPlan, QuizError> {
        self.expect_phase(QuizPhase::Active, "submit")?;

        let mut mcq_score = 0_u32;
        let mut mcq_total = 0_u32;
        let mut descriptive = Vec::new();
        for (question, answer) in self.questions.iter().zip(&self.answers) {
            match question {
                Question::Mcq {
                    answer: correct, ..
                } => {
                    mcq_total += 1;
                    if answer.as_deref() == Some(correct.as_str()) {
                        mcq_score += 1;
                    }
                }
                Question::Descriptive {
                    question,
                    ideal_answer,
                } => descriptive.push(AnswerForGrading {
                    question: question.clone(),
                    user_answer: answer.clone().unwrap_or_default(),
                    ideal_answer: ideal_answer.clone(),
                }),
            }
        }

        let all_blank = !descriptive.is_empty()
            && descriptive
                .iter()
                .all(|item| item.user_answer.trim().is_empty());
        if all_blank {
            match trigger {
                SubmitTrigger::Manual => {
                    self.last_error = Some(EMPTY_DESCRIPTIVE_MESSAGE.to_owned());
                    return Err(QuizError::Validation(EMPTY_DESCRIPTIVE_MESSAGE.to_owned()));
                }
                SubmitTrigger::Expired => {}
            }
        }

        let descriptive_total = u32::try_from(descriptive.len()).unwrap_or(u32::MAX);
        let answers = if all_blank { Vec::new() } else { descriptive };
        self.pending = Some(PendingGrade {
            mcq_score,
            mcq_total,
            descriptive_total,
            expected: answers.len(),
        });
        self.last_error = None;
        self.phase = QuizPhase::Grading;
        Ok(GradingPlan { answers })
    }

    /// Grading failed; the quiz goes back to `Active` with answers intact.
    pub fn grading_failed(&mut self, err: &FetchError) {
        if self.phase == QuizPhase::Grading {
            self.pending = None;
            self.phase = QuizPhase::Active;
            self.last_error = Some(err.user_message());
        }
    }

    /// Combine grader scores with the multiple-choice tally and finish.
    ///
    /// Each grader score is clamped to `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Fetch(FetchError::Malformed)` (back in `Active`) if
    /// the grader returned the wrong number of results, or
    /// `QuizError::InvalidTransition` outside `Grading`.
    pub fn grading_complete(
        &mut self,
        graded: &[GradedAnswer],
        submitted_at: DateTime<Utc>,
    ) -> Result<QuizOutcome, QuizError> {
        self.expect_phase(QuizPhase::Grading, "finish grading")?;
        let (Some(pending), Some(plan), Some(mode)) = (self.pending, self.plan.as_ref(), self.mode)
        else {
            return Err(QuizError::InvalidTransition {
                action: "finish grading",
                phase: self.phase,
            });
        };

        if graded.len() != pending.expected {
            let err = FetchError::Malformed(format!(
                "expected {} graded answers, got {}",
                pending.expected,
                graded.len()
            ));
            self.grading_failed(&err);
            return Err(err.into());
        }

        let descriptive_score: f64 = graded
            .iter()
            .map(|g| if g.score.is_nan() { 0.0 } else { g.score.clamp(0.0, 1.0) })
            .sum();
        let scores = QuizScores {
            mcq_score: pending.mcq_score,
            mcq_total: pending.mcq_total,
            descriptive_score,
            descriptive_total: pending.descriptive_total,
        };
        let passed = plan.pass_rule().is_passed(&scores);

        let outcome = QuizOutcome {
            scores,
            passed,
            feedback: scores.feedback(),
            answer_feedback: graded.iter().map(|g| g.feedback.clone()).collect(),
            attempt: QuizAttempt {
                topic: self.target.subject().to_owned(),
                quiz_type: plan.quiz_type(),
                practice: mode.is_practice(),
                is_final_quiz: self.target.is_final(),
                questions: self.questions.clone(),
                user_answers: self.answers.clone(),
                scores,
                passed,
                submitted_at,
            },
        };

        self.pending = None;
        self.outcome = Some(outcome.clone());
        self.phase = QuizPhase::Results;
        Ok(outcome)
    }

    //
    // ─── RESULTS ───────────────────────────────────────────────────────────────
    //

    /// Go back to `Start` for another attempt.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::InvalidTransition` outside `Results`.
    pub fn retake(&mut self) -> Result<(), QuizError> {
        self.expect_phase(QuizPhase::Results, "retake")?;
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.phase = QuizPhase::Start;
        self.mode = None;
        self.plan = None;
        self.questions.clear();
        self.answers.clear();
        self.remaining = None;
        self.pending = None;
        self.outcome = None;
    }
}
