//! HTTP surface: submission form, job intake, downloads and job status.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{rejection::FormRejection, Path, Request, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Json, Router,
};
use serde::Deserialize;
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::Error;
use crate::job::Submission;
use crate::queue::JobQueue;
use crate::status::JobRegistry;
use crate::storage::resolve_under;

/// Body of a successful `POST /`.
pub const ACKNOWLEDGEMENT: &str = "Download request received. You will receive an email shortly.";

/// Response header carrying the id of an accepted job.
pub const JOB_ID_HEADER: &str = "x-job-id";

const FORM_PAGE: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <title>Video to MP3</title>
    <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/picnic" />
  </head>
  <body>
    <form method="POST">
      <label for="youtube_url">Video URL:</label><br>
      <input type="text" id="youtube_url" name="youtube_url"><br><br>
      <label for="email">Email:</label><br>
      <input type="email" id="email" name="email"><br><br>
      <input type="submit" value="Submit">
    </form>
    <script>
      window.onload = () => {
        const email = document.getElementById("email");
        email.value = localStorage.getItem("email");
        document.querySelector("form").addEventListener("submit", () => {
          localStorage.setItem("email", email.value);
        });
      };
    </script>
  </body>
</html>
"#;

/// Shared handler state.
pub struct AppState {
    pub storage_root: PathBuf,
    pub queue: JobQueue,
    pub registry: Arc<JobRegistry>,
}

/// Form fields. Missing fields are accepted as empty.
#[derive(Debug, Default, Deserialize)]
pub struct SubmissionForm {
    #[serde(default)]
    pub youtube_url: String,
    #[serde(default)]
    pub email: String,
}

impl From<SubmissionForm> for Submission {
    fn from(form: SubmissionForm) -> Self {
        Submission {
            source_url: form.youtube_url,
            recipient: form.email,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::QueueFull | Error::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
            Error::InvalidPath(_) => StatusCode::NOT_FOUND,
            Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!(error = %self, "request failed");
        }
        let body = if status == StatusCode::NOT_FOUND {
            "404 page not found".to_string()
        } else {
            self.to_string()
        };
        (status, body).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let public = ServeDir::new(&state.storage_root);

    Router::new()
        .route("/", get(form_page).post(submit))
        .route("/download/{*path}", get(download))
        .route("/jobs/{id}", get(job_status))
        .nest_service("/public", public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn form_page() -> Html<&'static str> {
    Html(FORM_PAGE)
}

/// Accept a submission and return before any work is done.
///
/// A body that cannot be read as a form counts as a submission with empty fields.
async fn submit(
    State(state): State<Arc<AppState>>,
    form: Result<Form<SubmissionForm>, FormRejection>,
) -> Result<Response, Error> {
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            debug!(%rejection, "unreadable form body, using empty fields");
            SubmissionForm::default()
        }
    };
    let id = Uuid::new_v4();
    let submission = Submission::from(form);
    info!(job_id = %id, url = %submission.source_url, recipient = %submission.recipient, "submission received");

    state.registry.register(id);
    if let Err(e) = state.queue.submit(id, submission) {
        state.registry.remove(id);
        return Err(e);
    }

    Ok(([(JOB_ID_HEADER, id.to_string())], ACKNOWLEDGEMENT).into_response())
}

/// Serve a published file, confined to the storage root.
async fn download(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    request: Request,
) -> Result<Response, Error> {
    let resolved = resolve_under(&state.storage_root, &path)?;
    let metadata = tokio::fs::metadata(&resolved).await?;
    if !metadata.is_file() {
        return Err(Error::InvalidPath(format!("{path} is not a file")));
    }

    match ServeFile::new(&resolved).oneshot(request).await {
        Ok(response) => Ok(response.into_response()),
        Err(never) => match never {},
    }
}

async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.registry.get(id) {
        Some(status) => Json(status).into_response(),
        None => (StatusCode::NOT_FOUND, "unknown job").into_response(),
    }
}
