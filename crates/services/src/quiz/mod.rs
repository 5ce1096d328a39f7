pub mod countdown;
pub mod machine;
pub mod workflow;

pub use countdown::QuizCountdown;
pub use machine::{
    EMPTY_DESCRIPTIVE_MESSAGE, GradingPlan, QuizOutcome, QuizPhase, QuizSession, QuizTicket,
    SubmitTrigger, Tick,
};
pub use workflow::{QuizReport, QuizService, SharedQuiz, shared};
