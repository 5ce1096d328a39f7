use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use roadmap_core::model::{
    DetailSection, MandatoryKind, Question, QuizAttempt, QuizStatus, QuizType, SubDetailKey,
};

use super::{AnswerForGrading, ContentApi, GradedAnswer, NoteKind, QuizRequest, SavedNote};
use crate::config::ApiConfig;
use crate::error::FetchError;

/// `ContentApi` over HTTP with a bearer credential.
#[derive(Clone)]
pub struct HttpContentClient {
    client: Client,
    config: ApiConfig,
}

impl HttpContentClient {
    /// Build a client for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Network` if the HTTP client cannot be constructed.
    pub fn new(config: ApiConfig) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, FetchError>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned,
    {
        let request = self.client.post(self.config.endpoint(path)).json(body);
        let response = self.send(path, request).await?;
        decode(response).await
    }

    async fn get<Resp>(&self, path: &str, query: &[(&str, &str)]) -> Result<Resp, FetchError>
    where
        Resp: DeserializeOwned,
    {
        let request = self.client.get(self.config.endpoint(path)).query(query);
        let response = self.send(path, request).await?;
        decode(response).await
    }

    async fn send(&self, path: &str, request: RequestBuilder) -> Result<Response, FetchError> {
        let request = match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        debug!(path, "content api request");
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        let err = status_error(status, &body);
        warn!(path, status = status.as_u16(), error = %err, "content api request failed");
        Err(err)
    }
}

async fn decode<Resp: DeserializeOwned>(response: Response) -> Result<Resp, FetchError> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|err| FetchError::Malformed(err.to_string()))
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Map a non-success status (and its body) to a `FetchError`.
fn status_error(status: StatusCode, body: &[u8]) -> FetchError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Unauthorized,
        StatusCode::SERVICE_UNAVAILABLE => FetchError::ServiceUnavailable,
        other => FetchError::Rejected {
            status: other.as_u16(),
            message: serde_json::from_slice::<ErrorBody>(body)
                .ok()
                .and_then(|body| body.error),
        },
    }
}

//
// ─── WIRE BODIES ───────────────────────────────────────────────────────────────
//

#[derive(Deserialize)]
struct NotesResponse {
    #[serde(default)]
    notes: Vec<SavedNote>,
}

#[derive(Serialize)]
struct DetailsRequest<'a> {
    title: &'a str,
}

#[derive(Deserialize)]
struct DetailsResponse {
    details: Vec<DetailSection>,
}

#[derive(Deserialize)]
struct SubDetailsResponse {
    sub_details: String,
}

#[derive(Deserialize)]
struct QuizResponse {
    questions: Vec<Question>,
}

#[derive(Serialize)]
struct GradingRequest<'a> {
    answers: &'a [AnswerForGrading],
}

#[derive(Deserialize)]
struct GradingResponse {
    graded_answers: Vec<GradedAnswer>,
}

#[derive(Serialize)]
struct StatusUpdate<'a> {
    topic: &'a str,
    quiz_type: QuizType,
    passed: bool,
}

#[async_trait]
impl ContentApi for HttpContentClient {
    async fn saved_notes(&self, topic: &str, kind: NoteKind) -> Result<Vec<SavedNote>, FetchError> {
        let body: NotesResponse = self
            .get("get_notes", &[("topic", topic), ("note_type", kind.as_str())])
            .await?;
        Ok(body.notes)
    }

    async fn generate_details(&self, title: &str) -> Result<Vec<DetailSection>, FetchError> {
        let body: DetailsResponse = self
            .post("generate_details", &DetailsRequest { title })
            .await?;
        Ok(body.details)
    }

    async fn generate_sub_details(&self, key: &SubDetailKey) -> Result<String, FetchError> {
        let body: SubDetailsResponse = self.post("generate_sub_details", key).await?;
        Ok(body.sub_details)
    }

    async fn generate_quiz(&self, request: &QuizRequest) -> Result<Vec<Question>, FetchError> {
        let body: QuizResponse = self.post("generate_quiz", request).await?;
        Ok(body.questions)
    }

    async fn analyze_answers(
        &self,
        answers: &[AnswerForGrading],
    ) -> Result<Vec<GradedAnswer>, FetchError> {
        let body: GradingResponse = self
            .post("analyze_answers", &GradingRequest { answers })
            .await?;
        Ok(body.graded_answers)
    }

    async fn save_quiz_attempt(&self, attempt: &QuizAttempt) -> Result<(), FetchError> {
        let request = self
            .client
            .post(self.config.endpoint("save_quiz_attempt"))
            .json(attempt);
        // Any 2xx is an acknowledgement; the body is not inspected.
        self.send("save_quiz_attempt", request).await?;
        Ok(())
    }

    async fn quiz_status(&self, topic: &str) -> Result<QuizStatus, FetchError> {
        self.get("quiz_status", &[("topic", topic)]).await
    }

    async fn set_quiz_status(
        &self,
        topic: &str,
        kind: MandatoryKind,
        passed: bool,
    ) -> Result<QuizStatus, FetchError> {
        let update = StatusUpdate {
            topic,
            quiz_type: kind.quiz_type(),
            passed,
        };
        self.post("quiz_status", &update).await
    }
}
