use serde_json::Value;

use super::models::{Assignment, AssignmentInput, Submission};
use super::{multipart_form, ApiClient, Attachment};
use crate::error::Result;

impl ApiClient {
    pub async fn list_assignments(&self, classroom_id: &str) -> Result<Vec<Assignment>> {
        self.get(&format!("/classrooms/{}/assignments", classroom_id)).await
    }

    pub async fn get_assignment(&self, assignment_id: &str) -> Result<Assignment> {
        self.get(&format!("/assignments/{}", assignment_id)).await
    }

    pub async fn create_assignment(&self, input: &AssignmentInput) -> Result<Assignment> {
        self.post("/assignments", input).await
    }

    pub async fn update_assignment(
        &self,
        assignment_id: &str,
        input: &AssignmentInput,
    ) -> Result<Assignment> {
        self.put(&format!("/assignments/{}", assignment_id), input).await
    }

    pub async fn delete_assignment(&self, assignment_id: &str) -> Result<Value> {
        self.delete(&format!("/assignments/{}", assignment_id)).await
    }

    /// Uploads a submission as multipart form data.
    pub async fn submit_assignment(
        &self,
        assignment_id: &str,
        comment: Option<&str>,
        files: Vec<Attachment>,
    ) -> Result<Submission> {
        let fields: Vec<(&str, String)> = comment
            .map(|c| vec![("comment", c.to_string())])
            .unwrap_or_default();
        let form = multipart_form(&fields, "files", files)?;

        tracing::info!(assignment_id = %assignment_id, "Submitting assignment");
        self.post_multipart(&format!("/assignments/{}/submit", assignment_id), form)
            .await
    }

    pub async fn list_submissions(&self, assignment_id: &str) -> Result<Vec<Submission>> {
        self.get(&format!("/assignments/{}/submissions", assignment_id)).await
    }
}
