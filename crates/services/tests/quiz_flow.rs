mod support;

use std::time::Duration;

use roadmap_core::model::{MandatoryKind, ModuleId, QuizMode, QuizPlan, QuizStatus, QuizType};
use services::api::GradedAnswer;
use services::quiz::shared;
use services::{
    FetchError, QuizCountdown, QuizError, QuizPhase, QuizService, QuizSession, SessionEngine,
    SharedQuiz, SubmitTrigger,
};
use storage::repository::Storage;

use support::{FakeContentApi, descriptive, engine, mcq, topic};

const MCQ: QuizMode = QuizMode::Mandatory(MandatoryKind::Mcq);
const DESCRIPTIVE: QuizMode = QuizMode::Mandatory(MandatoryKind::Descriptive);

fn module_quiz(module: u64) -> SharedQuiz {
    shared(QuizSession::module_quiz(topic(5), ModuleId::new(module)).unwrap())
}

/// Answer the first `correct` questions with "a" and the rest with "b".
fn answer_mcq(quiz: &SharedQuiz, correct: usize) {
    let mut session = quiz.lock().unwrap();
    for index in 0..session.questions().len() {
        let value = if index < correct { "a" } else { "b" };
        session.answer(index, value).unwrap();
    }
}

fn service(engine: &SessionEngine) -> QuizService {
    QuizService::clone(&engine.quizzes())
}

#[tokio::test]
async fn passing_a_module_quiz_completes_the_module() {
    let api = FakeContentApi::new();
    api.set_questions(vec![mcq("a"); 10]);
    let engine = engine(&api, &Storage::in_memory());
    let quiz = module_quiz(2);

    engine.quizzes().start(&quiz, MCQ).await.unwrap();
    assert_eq!(quiz.lock().unwrap().phase(), QuizPhase::Active);
    assert_eq!(
        quiz.lock().unwrap().remaining(),
        Some(Duration::from_secs(5 * 60))
    );
    answer_mcq(&quiz, 7);

    let report = engine
        .quizzes()
        .submit(&quiz, SubmitTrigger::Manual)
        .await
        .unwrap();

    assert!(report.outcome.passed);
    assert!(report.is_fully_synced());
    assert_eq!(report.outcome.scores.mcq_score, 7);
    assert_eq!(report.outcome.scores.mcq_total, 10);
    assert_eq!(api.calls("analyze_answers"), 0);
    assert_eq!(
        api.status_updates(),
        vec![("Module 2".to_owned(), MandatoryKind::Mcq, true)]
    );

    let attempts = api.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].topic, "Module 2");
    assert!(!attempts[0].practice);
    assert!(!attempts[0].is_final_quiz);

    let progress = engine.completion().get_completion(&topic(5)).await.unwrap();
    assert_eq!(progress.percent, 20);
    assert!(progress.completed_modules.contains(&ModuleId::new(2)));
    assert!(
        engine
            .completion()
            .quiz_status("Module 2")
            .await
            .unwrap()
            .mcq_passed
    );
}

#[tokio::test]
async fn failing_a_module_quiz_leaves_progress_alone() {
    let api = FakeContentApi::new();
    api.set_questions(vec![mcq("a"); 10]);
    let engine = engine(&api, &Storage::in_memory());
    let quiz = module_quiz(1);

    engine.quizzes().start(&quiz, MCQ).await.unwrap();
    answer_mcq(&quiz, 5);
    let report = engine
        .quizzes()
        .submit(&quiz, SubmitTrigger::Manual)
        .await
        .unwrap();

    assert!(!report.outcome.passed);
    assert_eq!(
        api.status_updates(),
        vec![("Module 1".to_owned(), MandatoryKind::Mcq, false)]
    );
    let progress = engine.completion().get_completion(&topic(5)).await.unwrap();
    assert_eq!(progress.percent, 0);

    // A failed mandatory quiz can be retaken.
    quiz.lock().unwrap().retake().unwrap();
    engine.quizzes().start(&quiz, MCQ).await.unwrap();
    assert_eq!(quiz.lock().unwrap().phase(), QuizPhase::Active);
}

#[tokio::test]
async fn passed_mandatory_quiz_is_locked() {
    let api = FakeContentApi::new();
    api.set_questions(vec![mcq("a"); 10]);
    let engine = engine(&api, &Storage::in_memory());
    let quiz = module_quiz(3);

    engine.quizzes().start(&quiz, MCQ).await.unwrap();
    answer_mcq(&quiz, 10);
    engine
        .quizzes()
        .submit(&quiz, SubmitTrigger::Manual)
        .await
        .unwrap();
    quiz.lock().unwrap().retake().unwrap();

    let err = engine.quizzes().start(&quiz, MCQ).await.unwrap_err();

    assert!(matches!(err, QuizError::AlreadyPassed(MandatoryKind::Mcq)));
    assert_eq!(quiz.lock().unwrap().phase(), QuizPhase::Start);
    assert_eq!(api.calls("generate_quiz"), 1);
}

#[tokio::test]
async fn remote_pass_locks_the_quiz_and_is_kept_locally() {
    let api = FakeContentApi::new();
    api.set_remote_status(
        "Module 1",
        QuizStatus {
            mcq_passed: false,
            descriptive_passed: true,
        },
    );
    let engine = engine(&api, &Storage::in_memory());
    let quiz = module_quiz(1);

    let err = engine.quizzes().start(&quiz, DESCRIPTIVE).await.unwrap_err();

    assert!(matches!(
        err,
        QuizError::AlreadyPassed(MandatoryKind::Descriptive)
    ));
    assert_eq!(api.calls("generate_quiz"), 0);
    let local = engine.completion().quiz_status("Module 1").await.unwrap();
    assert!(local.descriptive_passed);
    assert!(!local.mcq_passed);
}

#[tokio::test]
async fn practice_quizzes_do_not_touch_status_or_progress() {
    let api = FakeContentApi::new();
    api.set_questions(vec![mcq("a"), mcq("a"), descriptive("Explain moves")]);
    let engine = engine(&api, &Storage::in_memory());
    let quiz = module_quiz(4);
    let practice = QuizMode::Practice {
        question_count: 3,
        quiz_type: QuizType::Both,
    };

    engine.quizzes().start(&quiz, practice).await.unwrap();
    assert_eq!(quiz.lock().unwrap().remaining(), None);
    {
        let mut session = quiz.lock().unwrap();
        session.answer(0, "a").unwrap();
        session.answer(1, "a").unwrap();
        session.answer(2, "Ownership moves to the callee").unwrap();
    }
    let report = engine
        .quizzes()
        .submit(&quiz, SubmitTrigger::Manual)
        .await
        .unwrap();

    assert!(report.outcome.passed);
    assert_eq!(api.calls("quiz_status"), 0);
    assert!(api.status_updates().is_empty());
    assert_eq!(
        api.quiz_requests()[0].num_questions,
        3,
        "practice keeps the requested size"
    );

    let attempts = api.attempts();
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0].practice);

    let progress = engine.completion().get_completion(&topic(5)).await.unwrap();
    assert_eq!(progress.percent, 0);
    assert_eq!(
        engine.completion().quiz_status("Module 4").await.unwrap(),
        QuizStatus::default()
    );
}

#[tokio::test]
async fn practice_is_available_after_the_mandatory_pass() {
    let api = FakeContentApi::new();
    api.set_remote_status(
        "Module 1",
        QuizStatus {
            mcq_passed: true,
            descriptive_passed: true,
        },
    );
    api.set_questions(vec![mcq("a")]);
    let engine = engine(&api, &Storage::in_memory());
    let quiz = module_quiz(1);

    engine
        .quizzes()
        .start(
            &quiz,
            QuizMode::Practice {
                question_count: 1,
                quiz_type: QuizType::Mcq,
            },
        )
        .await
        .unwrap();

    assert_eq!(quiz.lock().unwrap().phase(), QuizPhase::Active);
}

#[tokio::test]
async fn invalid_practice_size_is_rejected_before_any_request() {
    let api = FakeContentApi::new();
    let engine = engine(&api, &Storage::in_memory());
    let quiz = module_quiz(1);

    let err = engine
        .quizzes()
        .start(
            &quiz,
            QuizMode::Practice {
                question_count: 0,
                quiz_type: QuizType::Mcq,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, QuizError::Plan(_)));
    assert_eq!(api.calls("generate_quiz"), 0);
    assert_eq!(quiz.lock().unwrap().phase(), QuizPhase::Start);
}

#[tokio::test]
async fn blank_descriptive_answers_cannot_be_submitted() {
    let api = FakeContentApi::new();
    api.set_questions(vec![descriptive("What is a trait?"), descriptive("What is a crate?")]);
    let engine = engine(&api, &Storage::in_memory());
    let quiz = module_quiz(1);

    engine.quizzes().start(&quiz, DESCRIPTIVE).await.unwrap();
    quiz.lock().unwrap().answer(1, "   ").unwrap();

    let err = engine
        .quizzes()
        .submit(&quiz, SubmitTrigger::Manual)
        .await
        .unwrap_err();

    assert!(matches!(err, QuizError::Validation(_)));
    let session = quiz.lock().unwrap();
    assert_eq!(session.phase(), QuizPhase::Active);
    assert_eq!(
        session.last_error(),
        Some(services::quiz::EMPTY_DESCRIPTIVE_MESSAGE)
    );
    assert_eq!(api.calls("analyze_answers"), 0);
    assert!(api.attempts().is_empty());
}

#[tokio::test]
async fn grading_failure_returns_to_the_questions() {
    let api = FakeContentApi::new();
    api.set_questions(vec![descriptive("What is a trait?")]);
    api.set_grades(Err(FetchError::ServiceUnavailable));
    let engine = engine(&api, &Storage::in_memory());
    let quiz = module_quiz(1);

    engine.quizzes().start(&quiz, DESCRIPTIVE).await.unwrap();
    quiz.lock().unwrap().answer(0, "Shared behaviour").unwrap();

    let err = engine
        .quizzes()
        .submit(&quiz, SubmitTrigger::Manual)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        QuizError::Fetch(FetchError::ServiceUnavailable)
    ));
    {
        let session = quiz.lock().unwrap();
        assert_eq!(session.phase(), QuizPhase::Active);
        assert_eq!(session.answers()[0].as_deref(), Some("Shared behaviour"));
        assert!(session.last_error().is_some());
    }
    assert!(api.attempts().is_empty());

    api.set_grades(Ok(vec![GradedAnswer {
        score: 0.8,
        feedback: Some("Mostly right".into()),
    }]));
    let report = engine
        .quizzes()
        .submit(&quiz, SubmitTrigger::Manual)
        .await
        .unwrap();

    assert!((report.outcome.scores.descriptive_score - 0.8).abs() < 1e-9);
    assert_eq!(
        report.outcome.answer_feedback,
        vec![Some("Mostly right".to_owned())]
    );
    assert_eq!(api.attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn expired_timer_submits_exactly_once() {
    let api = FakeContentApi::new();
    api.set_questions(vec![descriptive("What is a trait?"), descriptive("What is a crate?")]);
    let engine = engine(&api, &Storage::in_memory());
    let service = service(&engine);
    let quiz = module_quiz(1);

    let target = quiz.lock().unwrap().target().clone();
    let plan = QuizPlan::for_mode(DESCRIPTIVE, &target)
        .unwrap()
        .with_time_limit(Some(Duration::from_secs(2)));
    service.start_with_plan(&quiz, DESCRIPTIVE, plan).await.unwrap();
    quiz.lock().unwrap().answer(0, "Shared behaviour").unwrap();

    let countdown = QuizCountdown::spawn(service.clone(), quiz.clone());
    let report = countdown
        .join()
        .await
        .expect("expiry submission")
        .expect("graded");

    assert_eq!(quiz.lock().unwrap().phase(), QuizPhase::Results);
    assert_eq!(report.outcome.scores.descriptive_total, 2);
    assert_eq!(api.calls("analyze_answers"), 1);
    assert_eq!(api.attempts().len(), 1);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(api.attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn expired_timer_submits_blank_answers_without_grading() {
    let api = FakeContentApi::new();
    api.set_questions(vec![descriptive("What is a trait?")]);
    let engine = engine(&api, &Storage::in_memory());
    let service = service(&engine);
    let quiz = module_quiz(1);

    let target = quiz.lock().unwrap().target().clone();
    let plan = QuizPlan::for_mode(DESCRIPTIVE, &target)
        .unwrap()
        .with_time_limit(Some(Duration::from_secs(1)));
    service.start_with_plan(&quiz, DESCRIPTIVE, plan).await.unwrap();

    let report = QuizCountdown::spawn(service.clone(), quiz.clone())
        .join()
        .await
        .expect("expiry submission")
        .expect("graded");

    assert!(!report.outcome.passed);
    assert!(report.outcome.scores.descriptive_score.abs() < f64::EPSILON);
    assert_eq!(api.calls("analyze_answers"), 0);
    assert_eq!(
        api.status_updates(),
        vec![("Module 1".to_owned(), MandatoryKind::Descriptive, false)]
    );
}

#[tokio::test(start_paused = true)]
async fn manual_submit_stops_the_countdown() {
    let api = FakeContentApi::new();
    api.set_questions(vec![mcq("a"); 10]);
    let engine = engine(&api, &Storage::in_memory());
    let service = service(&engine);
    let quiz = module_quiz(1);

    service.start(&quiz, MCQ).await.unwrap();
    let countdown = QuizCountdown::spawn(service.clone(), quiz.clone());
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert!(!countdown.is_finished());
    assert_eq!(
        quiz.lock().unwrap().remaining(),
        Some(Duration::from_secs(5 * 60 - 3))
    );

    answer_mcq(&quiz, 10);
    service.submit(&quiz, SubmitTrigger::Manual).await.unwrap();

    assert!(countdown.join().await.is_none());
    assert_eq!(api.attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_quiz_stops_the_countdown() {
    let api = FakeContentApi::new();
    api.set_questions(vec![mcq("a"); 10]);
    let engine = engine(&api, &Storage::in_memory());
    let service = service(&engine);
    let quiz = module_quiz(1);

    service.start(&quiz, MCQ).await.unwrap();
    let countdown = QuizCountdown::spawn(service.clone(), quiz.clone());
    quiz.lock().unwrap().cancel().unwrap();

    assert!(countdown.join().await.is_none());
    assert_eq!(quiz.lock().unwrap().phase(), QuizPhase::Start);
    assert!(api.attempts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn restarting_after_cancel_leaves_one_countdown_running() {
    let api = FakeContentApi::new();
    api.set_questions(vec![mcq("a"); 10]);
    let engine = engine(&api, &Storage::in_memory());
    let service = service(&engine);
    let quiz = module_quiz(1);

    service.start(&quiz, MCQ).await.unwrap();
    let first = QuizCountdown::spawn(service.clone(), quiz.clone());
    tokio::time::sleep(Duration::from_millis(500)).await;

    quiz.lock().unwrap().cancel().unwrap();
    service.start(&quiz, MCQ).await.unwrap();
    let second = QuizCountdown::spawn(service.clone(), quiz.clone());
    tokio::time::sleep(Duration::from_millis(3_200)).await;

    assert!(first.is_finished());
    assert!(!second.is_finished());
    assert_eq!(
        quiz.lock().unwrap().remaining(),
        Some(Duration::from_secs(5 * 60 - 3))
    );
    assert!(first.join().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn failed_expiry_submission_is_retried_on_the_next_tick() {
    let api = FakeContentApi::new();
    api.set_questions(vec![descriptive("What is a trait?")]);
    api.set_grades(Err(FetchError::ServiceUnavailable));
    let engine = engine(&api, &Storage::in_memory());
    let service = service(&engine);
    let quiz = module_quiz(1);

    let target = quiz.lock().unwrap().target().clone();
    let plan = QuizPlan::for_mode(DESCRIPTIVE, &target)
        .unwrap()
        .with_time_limit(Some(Duration::from_secs(1)));
    service.start_with_plan(&quiz, DESCRIPTIVE, plan).await.unwrap();
    quiz.lock().unwrap().answer(0, "Shared behaviour").unwrap();

    let countdown = QuizCountdown::spawn(service.clone(), quiz.clone());
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    assert!(!countdown.is_finished());
    assert_eq!(api.calls("analyze_answers"), 2);
    {
        let session = quiz.lock().unwrap();
        assert_eq!(session.phase(), QuizPhase::Active);
        assert_eq!(session.remaining(), Some(Duration::ZERO));
    }

    api.set_grades(Ok(vec![GradedAnswer {
        score: 1.0,
        feedback: None,
    }]));
    let report = countdown
        .join()
        .await
        .expect("expiry submission")
        .expect("graded");

    assert!(report.outcome.passed);
    assert_eq!(api.calls("analyze_answers"), 3);
    assert_eq!(api.attempts().len(), 1);
    assert_eq!(quiz.lock().unwrap().phase(), QuizPhase::Results);
}

#[tokio::test]
async fn final_quiz_needs_fourteen_of_twenty() {
    let api = FakeContentApi::new();
    api.set_questions(vec![mcq("a"); 20]);
    let engine = engine(&api, &Storage::in_memory());

    let failing = shared(QuizSession::final_quiz(topic(5)));
    engine.quizzes().start(&failing, MCQ).await.unwrap();
    assert_eq!(
        failing.lock().unwrap().remaining(),
        Some(Duration::from_secs(15 * 60))
    );
    answer_mcq(&failing, 13);
    let report = engine
        .quizzes()
        .submit(&failing, SubmitTrigger::Manual)
        .await
        .unwrap();
    assert!(!report.outcome.passed);

    failing.lock().unwrap().retake().unwrap();
    engine.quizzes().start(&failing, MCQ).await.unwrap();
    answer_mcq(&failing, 14);
    let report = engine
        .quizzes()
        .submit(&failing, SubmitTrigger::Manual)
        .await
        .unwrap();

    assert!(report.outcome.passed);
    assert!(report.outcome.attempt.is_final_quiz);
    assert!(
        api.quiz_requests()
            .iter()
            .all(|request| request.num_questions == 20 && request.topic == "Rust")
    );
    assert_eq!(
        api.status_updates().last(),
        Some(&("Rust".to_owned(), MandatoryKind::Mcq, true))
    );
    let progress = engine.completion().get_completion(&topic(5)).await.unwrap();
    assert_eq!(progress.percent, 0);
}

#[tokio::test]
async fn sync_failures_are_reported_without_losing_the_result() {
    let api = FakeContentApi::new();
    api.set_questions(vec![mcq("a"); 10]);
    api.fail_attempts(FetchError::Network("connection reset".into()));
    let engine = engine(&api, &Storage::in_memory());
    let quiz = module_quiz(5);

    engine.quizzes().start(&quiz, MCQ).await.unwrap();
    answer_mcq(&quiz, 9);
    let report = engine
        .quizzes()
        .submit(&quiz, SubmitTrigger::Manual)
        .await
        .unwrap();

    assert!(report.outcome.passed);
    assert!(!report.is_fully_synced());
    assert_eq!(report.sync_errors.len(), 1);
    assert!(report.sync_errors[0].contains("saving quiz attempt"));
    assert_eq!(quiz.lock().unwrap().phase(), QuizPhase::Results);

    let progress = engine.completion().get_completion(&topic(5)).await.unwrap();
    assert!(progress.completed_modules.contains(&ModuleId::new(5)));
}
