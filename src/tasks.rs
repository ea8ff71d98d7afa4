//! JSON task entry points, as a background job runner would deliver them.
//!
//! ```json
//! {"task":"convert-pdf-to-images","documentVersionId":"ver_1"}
//! {"task":"convert-page","documentVersionId":"ver_1","pageNumber":3,"url":"https://…","teamId":"team_1"}
//! ```
//!
//! Both tasks are safe to re-trigger: pages that already exist are skipped,
//! and finalisation only sets flags to fixed values.

use crate::coordinator::BatchCoordinator;
use crate::error::{PageError, PipelineError};
use crate::pipeline::worker::ConvertPagePayload;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Id of the document-level task.
pub const CONVERT_DOCUMENT_TASK: &str = "convert-pdf-to-images";
/// Id of the per-page task.
pub const CONVERT_PAGE_TASK: &str = "convert-page";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task")]
pub enum TaskPayload {
    #[serde(rename = "convert-pdf-to-images", rename_all = "camelCase")]
    ConvertDocument { document_version_id: String },

    #[serde(rename = "convert-page")]
    ConvertPage(ConvertPagePayload),
}

impl TaskPayload {
    pub fn task_id(&self) -> &'static str {
        match self {
            TaskPayload::ConvertDocument { .. } => CONVERT_DOCUMENT_TASK,
            TaskPayload::ConvertPage(_) => CONVERT_PAGE_TASK,
        }
    }
}

/// What a task hands back to the job runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskOutput {
    #[serde(rename_all = "camelCase")]
    Document { success: bool, message: String },
    #[serde(rename_all = "camelCase")]
    Page { document_page_id: String },
}

/// A task that did not complete.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Invalid task payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error(transparent)]
    Document(#[from] PipelineError),

    #[error(transparent)]
    Page(#[from] PageError),
}

/// Routes task payloads to the coordinator or its page worker.
#[derive(Clone)]
pub struct TaskRunner {
    coordinator: BatchCoordinator,
}

impl TaskRunner {
    pub fn new(coordinator: BatchCoordinator) -> Self {
        Self { coordinator }
    }

    pub async fn run(&self, payload: &TaskPayload) -> Result<TaskOutput, TaskError> {
        tracing::debug!("Running task {}", payload.task_id());
        match payload {
            TaskPayload::ConvertDocument {
                document_version_id,
            } => {
                self.coordinator
                    .convert_document(document_version_id)
                    .await?;
                Ok(TaskOutput::Document {
                    success: true,
                    message: "Successfully converted PDF to images".to_string(),
                })
            }
            TaskPayload::ConvertPage(page) => {
                let document_page_id = self.coordinator.worker().convert_page(page).await?;
                Ok(TaskOutput::Page { document_page_id })
            }
        }
    }

    /// Parse `json` as a [`TaskPayload`] and run it.
    pub async fn run_json(&self, json: &str) -> Result<TaskOutput, TaskError> {
        let payload: TaskPayload = serde_json::from_str(json)?;
        self.run(&payload).await
    }
}
