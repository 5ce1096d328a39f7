#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use roadmap_core::model::{
    DetailSection, MandatoryKind, Module, ModuleId, Question, QuizAttempt, QuizStatus, StudyItem,
    SubDetailKey, Topic, TopicId,
};
use roadmap_core::time::fixed_clock;
use services::api::{AnswerForGrading, GradedAnswer, NoteKind, QuizRequest, SavedNote};
use services::{ContentApi, FetchError, SessionEngine};
use storage::repository::Storage;

/// In-process `ContentApi` with canned answers and call counters.
#[derive(Default)]
pub struct FakeContentApi {
    calls: Mutex<HashMap<&'static str, usize>>,
    notes: Mutex<HashMap<(String, &'static str), Vec<SavedNote>>>,
    notes_error: Mutex<Option<FetchError>>,
    details: Mutex<HashMap<String, Result<Vec<DetailSection>, FetchError>>>,
    detail_gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    questions: Mutex<Vec<Question>>,
    quiz_requests: Mutex<Vec<QuizRequest>>,
    grades: Mutex<Option<Result<Vec<GradedAnswer>, FetchError>>>,
    attempt_error: Mutex<Option<FetchError>>,
    attempts: Mutex<Vec<QuizAttempt>>,
    remote_status: Mutex<HashMap<String, QuizStatus>>,
    status_updates: Mutex<Vec<(String, MandatoryKind, bool)>>,
}

impl FakeContentApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn count(&self, name: &'static str) {
        *self.calls.lock().unwrap().entry(name).or_default() += 1;
    }

    pub fn calls(&self, name: &str) -> usize {
        self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn save_note(&self, topic: &str, kind: NoteKind, note: SavedNote) {
        self.notes
            .lock()
            .unwrap()
            .entry((topic.to_owned(), kind.as_str()))
            .or_default()
            .push(note);
    }

    pub fn fail_notes(&self, err: FetchError) {
        *self.notes_error.lock().unwrap() = Some(err);
    }

    pub fn set_details(&self, title: &str, result: Result<Vec<DetailSection>, FetchError>) {
        self.details.lock().unwrap().insert(title.to_owned(), result);
    }

    /// Hold `generate_details` for `title` until the returned sender fires.
    pub fn gate_details(&self, title: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.detail_gates.lock().unwrap().insert(title.to_owned(), rx);
        tx
    }

    pub fn set_questions(&self, questions: Vec<Question>) {
        *self.questions.lock().unwrap() = questions;
    }

    pub fn quiz_requests(&self) -> Vec<QuizRequest> {
        self.quiz_requests.lock().unwrap().clone()
    }

    pub fn set_grades(&self, grades: Result<Vec<GradedAnswer>, FetchError>) {
        *self.grades.lock().unwrap() = Some(grades);
    }

    pub fn fail_attempts(&self, err: FetchError) {
        *self.attempt_error.lock().unwrap() = Some(err);
    }

    pub fn attempts(&self) -> Vec<QuizAttempt> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn set_remote_status(&self, subject: &str, status: QuizStatus) {
        self.remote_status
            .lock()
            .unwrap()
            .insert(subject.to_owned(), status);
    }

    pub fn status_updates(&self) -> Vec<(String, MandatoryKind, bool)> {
        self.status_updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentApi for FakeContentApi {
    async fn saved_notes(&self, topic: &str, kind: NoteKind) -> Result<Vec<SavedNote>, FetchError> {
        self.count("saved_notes");
        if let Some(err) = self.notes_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self
            .notes
            .lock()
            .unwrap()
            .get(&(topic.to_owned(), kind.as_str()))
            .cloned()
            .unwrap_or_default())
    }

    async fn generate_details(&self, title: &str) -> Result<Vec<DetailSection>, FetchError> {
        self.count("generate_details");
        let gate = self.detail_gates.lock().unwrap().remove(title);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let configured = self.details.lock().unwrap().get(title).cloned();
        configured.unwrap_or_else(|| Ok(vec![section(title)]))
    }

    async fn generate_sub_details(&self, key: &SubDetailKey) -> Result<String, FetchError> {
        self.count("generate_sub_details");
        Ok(format!(
            "```html\n<p>{} in {}</p>\n```",
            key.term, key.context
        ))
    }

    async fn generate_quiz(&self, request: &QuizRequest) -> Result<Vec<Question>, FetchError> {
        self.count("generate_quiz");
        self.quiz_requests.lock().unwrap().push(request.clone());
        Ok(self.questions.lock().unwrap().clone())
    }

    async fn analyze_answers(
        &self,
        answers: &[AnswerForGrading],
    ) -> Result<Vec<GradedAnswer>, FetchError> {
        self.count("analyze_answers");
        let configured = self.grades.lock().unwrap().clone();
        configured.unwrap_or_else(|| {
            Ok(answers
                .iter()
                .map(|_| GradedAnswer {
                    score: 1.0,
                    feedback: Some("Correct!".into()),
                })
                .collect())
        })
    }

    async fn save_quiz_attempt(&self, attempt: &QuizAttempt) -> Result<(), FetchError> {
        self.count("save_quiz_attempt");
        if let Some(err) = self.attempt_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.attempts.lock().unwrap().push(attempt.clone());
        Ok(())
    }

    async fn quiz_status(&self, topic: &str) -> Result<QuizStatus, FetchError> {
        self.count("quiz_status");
        Ok(self
            .remote_status
            .lock()
            .unwrap()
            .get(topic)
            .copied()
            .unwrap_or_default())
    }

    async fn set_quiz_status(
        &self,
        topic: &str,
        kind: MandatoryKind,
        passed: bool,
    ) -> Result<QuizStatus, FetchError> {
        self.count("set_quiz_status");
        self.status_updates
            .lock()
            .unwrap()
            .push((topic.to_owned(), kind, passed));
        let mut remote = self.remote_status.lock().unwrap();
        let status = remote.entry(topic.to_owned()).or_default();
        if passed {
            status.set(kind, true);
        }
        Ok(*status)
    }
}

pub fn section(title: &str) -> DetailSection {
    DetailSection {
        title: format!("{title} basics"),
        items: vec![StudyItem {
            term: format!("{title} term"),
            definition: "A definition".into(),
        }],
    }
}

/// "Rust" with modules 1..=`modules`, titled "Module {id}".
pub fn topic(modules: u64) -> Arc<Topic> {
    let modules = (1..=modules)
        .map(|id| Module::new(ModuleId::new(id), format!("Module {id}"), "").unwrap())
        .collect();
    Arc::new(Topic::new(TopicId::new(1), "Rust", modules).unwrap())
}

pub fn engine(api: &Arc<FakeContentApi>, storage: &Storage) -> SessionEngine {
    let api: Arc<dyn ContentApi> = Arc::clone(api) as Arc<dyn ContentApi>;
    SessionEngine::new(api, storage, fixed_clock(), Duration::from_secs(3))
}

pub fn mcq(answer: &str) -> Question {
    Question::Mcq {
        question: format!("Which is {answer}?"),
        options: vec!["a".into(), "b".into(), "c".into()],
        answer: answer.into(),
    }
}

pub fn descriptive(prompt: &str) -> Question {
    Question::Descriptive {
        question: prompt.into(),
        ideal_answer: format!("Ideal answer to {prompt}"),
    }
}
