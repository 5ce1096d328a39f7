use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::error::QuizError;

use super::machine::{QuizPhase, SubmitTrigger, Tick};
use super::workflow::{QuizReport, QuizService, SharedQuiz, lock};

const TICK: Duration = Duration::from_secs(1);

/// One-second countdown of an active quiz.
///
/// Bound to the run that was active when it was spawned: it stops at the
/// first tick after that run is cancelled, submitted or replaced by a new
/// start. When time runs out it submits; if that submission fails and the
/// run is still active, it submits again on the next tick.
pub struct QuizCountdown {
    task: JoinHandle<Option<Result<QuizReport, QuizError>>>,
}

impl QuizCountdown {
    /// Start counting the current run. Must be called from within a Tokio
    /// runtime, after the quiz has started.
    #[must_use]
    pub fn spawn(service: QuizService, quiz: SharedQuiz) -> Self {
        let run = lock(&quiz).run_id();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let tick = {
                    let mut session = lock(&quiz);
                    if session.run_id() == run {
                        session.tick(TICK)
                    } else {
                        Tick::Idle
                    }
                };
                match tick {
                    Tick::Running(_) | Tick::Paused => {}
                    Tick::Idle => return None,
                    Tick::Expired => {
                        info!("quiz time is up; submitting");
                        match service.submit(&quiz, SubmitTrigger::Expired).await {
                            Err(err) if still_active(&quiz, run) => {
                                warn!(error = %err, "submission after time-out failed; retrying");
                            }
                            result => return Some(result),
                        }
                    }
                }
            }
        });
        Self { task }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the countdown to stop.
    ///
    /// Returns the expiry submission's result, or `None` if the run ended
    /// some other way.
    pub async fn join(self) -> Option<Result<QuizReport, QuizError>> {
        self.task.await.ok().flatten()
    }
}

fn still_active(quiz: &SharedQuiz, run: u64) -> bool {
    let session = lock(quiz);
    session.run_id() == run && session.phase() == QuizPhase::Active
}
