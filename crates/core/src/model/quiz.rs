use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::ModuleId;
use crate::model::topic::{Module, Topic};

//
// ─── CONSTANTS ─────────────────────────────────────────────────────────────────
//

pub const MODULE_QUESTION_COUNT: u32 = 10;
pub const FINAL_QUESTION_COUNT: u32 = 20;
pub const MODULE_PASS_MARK: u32 = 6;
pub const FINAL_PASS_MARK: u32 = 14;
pub const PRACTICE_PASS_PERCENT: u8 = 60;
pub const PRACTICE_MAX_QUESTIONS: u32 = 50;

const MINUTE: u64 = 60;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizPlanError {
    #[error("practice quizzes need between 1 and {max} questions, got {requested}")]
    InvalidQuestionCount { requested: u32, max: u32 },
}

//
// ─── QUESTIONS ─────────────────────────────────────────────────────────────────
//

/// A generated quiz question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Question {
    Mcq {
        question: String,
        options: Vec<String>,
        answer: String,
    },
    Descriptive {
        question: String,
        #[serde(alias = "idealAnswer")]
        ideal_answer: String,
    },
}

impl Question {
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Question::Mcq { question, .. } | Question::Descriptive { question, .. } => question,
        }
    }

    #[must_use]
    pub fn is_mcq(&self) -> bool {
        matches!(self, Question::Mcq { .. })
    }

    #[must_use]
    pub fn is_descriptive(&self) -> bool {
        matches!(self, Question::Descriptive { .. })
    }
}

//
// ─── MODES ─────────────────────────────────────────────────────────────────────
//

/// Question mix requested from the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuizType {
    #[serde(rename = "MCQ")]
    Mcq,
    Descriptive,
    Both,
}

impl QuizType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuizType::Mcq => "MCQ",
            QuizType::Descriptive => "Descriptive",
            QuizType::Both => "Both",
        }
    }
}

impl fmt::Display for QuizType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two pass/fail-tracked quiz kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MandatoryKind {
    Mcq,
    Descriptive,
}

impl MandatoryKind {
    #[must_use]
    pub fn quiz_type(self) -> QuizType {
        match self {
            MandatoryKind::Mcq => QuizType::Mcq,
            MandatoryKind::Descriptive => QuizType::Descriptive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizMode {
    Mandatory(MandatoryKind),
    Practice { question_count: u32, quiz_type: QuizType },
}

impl QuizMode {
    #[must_use]
    pub fn is_practice(self) -> bool {
        matches!(self, QuizMode::Practice { .. })
    }

    #[must_use]
    pub fn quiz_type(self) -> QuizType {
        match self {
            QuizMode::Mandatory(kind) => kind.quiz_type(),
            QuizMode::Practice { quiz_type, .. } => quiz_type,
        }
    }

    #[must_use]
    pub fn mandatory_kind(self) -> Option<MandatoryKind> {
        match self {
            QuizMode::Mandatory(kind) => Some(kind),
            QuizMode::Practice { .. } => None,
        }
    }
}

/// What a quiz is about and whether it is the roadmap's final quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizTarget {
    roadmap: String,
    subject: String,
    module: Option<ModuleId>,
    is_final: bool,
}

impl QuizTarget {
    /// The final quiz, taken against the topic itself.
    #[must_use]
    pub fn for_topic(topic: &Topic) -> Self {
        Self {
            roadmap: topic.title().to_owned(),
            subject: topic.title().to_owned(),
            module: None,
            is_final: true,
        }
    }

    /// A module-level quiz inside `topic`.
    #[must_use]
    pub fn for_module(topic: &Topic, module: &Module) -> Self {
        Self {
            roadmap: topic.title().to_owned(),
            subject: module.title().to_owned(),
            module: Some(module.id()),
            is_final: false,
        }
    }

    /// Title of the roadmap whose completion this quiz feeds.
    #[must_use]
    pub fn roadmap(&self) -> &str {
        &self.roadmap
    }

    /// Title the questions are generated for; also the quiz-status key.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn module(&self) -> Option<ModuleId> {
        self.module
    }

    #[must_use]
    pub fn is_final(&self) -> bool {
        self.is_final
    }
}

//
// ─── PLAN ──────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PassRule {
    /// Combined score must reach an absolute number of points.
    AtLeast(u32),
    /// Combined score must reach a percentage of the total.
    Percent(u8),
}

impl PassRule {
    #[must_use]
    pub fn is_passed(self, scores: &QuizScores) -> bool {
        match self {
            PassRule::AtLeast(mark) => scores.final_score() >= f64::from(mark),
            PassRule::Percent(pct) => {
                scores.final_total() > 0 && scores.percentage() >= f64::from(pct)
            }
        }
    }
}

/// Size, timing and pass rule of one quiz run.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizPlan {
    quiz_type: QuizType,
    question_count: u32,
    time_limit: Option<Duration>,
    pass_rule: PassRule,
}

impl QuizPlan {
    /// Derive the plan for a mode against a target.
    ///
    /// Mandatory quizzes size and time themselves by whether the target is the
    /// final quiz; practice quizzes take the requested count and are untimed.
    ///
    /// # Errors
    ///
    /// Returns `QuizPlanError::InvalidQuestionCount` for a practice count outside
    /// `1..=PRACTICE_MAX_QUESTIONS`.
    pub fn for_mode(mode: QuizMode, target: &QuizTarget) -> Result<Self, QuizPlanError> {
        match mode {
            QuizMode::Mandatory(kind) => {
                let final_quiz = target.is_final();
                let minutes = match (kind, final_quiz) {
                    (MandatoryKind::Mcq, false) => 5,
                    (MandatoryKind::Descriptive, false) => 15,
                    (MandatoryKind::Mcq, true) => 15,
                    (MandatoryKind::Descriptive, true) => 30,
                };
                let (question_count, mark) = if final_quiz {
                    (FINAL_QUESTION_COUNT, FINAL_PASS_MARK)
                } else {
                    (MODULE_QUESTION_COUNT, MODULE_PASS_MARK)
                };
                Ok(Self {
                    quiz_type: kind.quiz_type(),
                    question_count,
                    time_limit: Some(Duration::from_secs(minutes * MINUTE)),
                    pass_rule: PassRule::AtLeast(mark),
                })
            }
            QuizMode::Practice {
                question_count,
                quiz_type,
            } => {
                if question_count == 0 || question_count > PRACTICE_MAX_QUESTIONS {
                    return Err(QuizPlanError::InvalidQuestionCount {
                        requested: question_count,
                        max: PRACTICE_MAX_QUESTIONS,
                    });
                }
                Ok(Self {
                    quiz_type,
                    question_count,
                    time_limit: None,
                    pass_rule: PassRule::Percent(PRACTICE_PASS_PERCENT),
                })
            }
        }
    }

    /// Override the countdown length; `None` makes the quiz untimed.
    #[must_use]
    pub fn with_time_limit(mut self, time_limit: Option<Duration>) -> Self {
        self.time_limit = time_limit;
        self
    }

    #[must_use]
    pub fn quiz_type(&self) -> QuizType {
        self.quiz_type
    }

    #[must_use]
    pub fn question_count(&self) -> u32 {
        self.question_count
    }

    #[must_use]
    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    #[must_use]
    pub fn pass_rule(&self) -> PassRule {
        self.pass_rule
    }
}

//
// ─── SCORES ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizScores {
    pub mcq_score: u32,
    pub mcq_total: u32,
    pub descriptive_score: f64,
    pub descriptive_total: u32,
}

impl QuizScores {
    #[must_use]
    pub fn final_score(&self) -> f64 {
        f64::from(self.mcq_score) + self.descriptive_score
    }

    #[must_use]
    pub fn final_total(&self) -> u32 {
        self.mcq_total + self.descriptive_total
    }

    /// Combined score as a percentage; 0 for an empty quiz.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        let total = self.final_total();
        if total == 0 {
            return 0.0;
        }
        self.final_score() / f64::from(total) * 100.0
    }

    /// Human-readable summary shown on the results screen.
    #[must_use]
    pub fn feedback(&self) -> String {
        let mut text = String::new();
        if self.mcq_total > 0 {
            text.push_str(&format!("MCQ: {}/{}. ", self.mcq_score, self.mcq_total));
        }
        if self.descriptive_total > 0 {
            text.push_str(&format!(
                "Descriptive: {}/{}. ",
                self.descriptive_score, self.descriptive_total
            ));
        }

        let pct = self.percentage();
        let verdict = if self.final_total() > 0 && (pct - 100.0).abs() < f64::EPSILON {
            "Perfect Score! Excellent work!"
        } else if pct > 80.0 {
            "Excellent work!"
        } else if pct > 50.0 {
            "Good job, keep reviewing!"
        } else {
            "Keep practicing!"
        };
        text.push_str(verdict);
        text
    }
}

//
// ─── PERSISTED RECORDS ─────────────────────────────────────────────────────────
//

/// Pass flags of the mandatory quizzes for one subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizStatus {
    #[serde(default)]
    pub mcq_passed: bool,
    #[serde(default)]
    pub descriptive_passed: bool,
}

impl QuizStatus {
    #[must_use]
    pub fn is_passed(&self, kind: MandatoryKind) -> bool {
        match kind {
            MandatoryKind::Mcq => self.mcq_passed,
            MandatoryKind::Descriptive => self.descriptive_passed,
        }
    }

    pub fn set(&mut self, kind: MandatoryKind, passed: bool) {
        match kind {
            MandatoryKind::Mcq => self.mcq_passed = passed,
            MandatoryKind::Descriptive => self.descriptive_passed = passed,
        }
    }

    /// Merge another observation; a pass is never forgotten.
    #[must_use]
    pub fn merged(self, other: QuizStatus) -> QuizStatus {
        QuizStatus {
            mcq_passed: self.mcq_passed || other.mcq_passed,
            descriptive_passed: self.descriptive_passed || other.descriptive_passed,
        }
    }
}

/// A submitted quiz, as sent to the attempt log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub topic: String,
    pub quiz_type: QuizType,
    pub practice: bool,
    pub is_final_quiz: bool,
    pub questions: Vec<Question>,
    pub user_answers: Vec<Option<String>>,
    pub scores: QuizScores,
    pub passed: bool,
    pub submitted_at: DateTime<Utc>,
}
