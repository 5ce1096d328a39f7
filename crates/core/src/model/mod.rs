mod completion;
mod detail;
mod ids;
mod quiz;
mod topic;

pub use completion::{CompletionError, CompletionRecord, CompletionSnapshot};
pub use detail::{DetailSection, StudyItem, SubDetail, SubDetailKey};
pub use ids::{ModuleId, ParseIdError, TopicId};
pub use quiz::{
    FINAL_PASS_MARK, FINAL_QUESTION_COUNT, MODULE_PASS_MARK, MODULE_QUESTION_COUNT,
    PRACTICE_MAX_QUESTIONS, PRACTICE_PASS_PERCENT, MandatoryKind, PassRule, Question, QuizAttempt, QuizMode, QuizPlan, QuizPlanError,
    QuizScores, QuizStatus, QuizTarget, QuizType,
};
pub use topic::{Module, Topic, TopicError};
