use serde_json::{json, Value};

use super::models::{Comment, Post};
use super::{multipart_form, ApiClient, Attachment};
use crate::error::Result;

impl ApiClient {
    pub async fn list_posts(&self, classroom_id: &str) -> Result<Vec<Post>> {
        self.get(&format!("/classrooms/{}/posts", classroom_id)).await
    }

    pub async fn create_post(
        &self,
        classroom_id: &str,
        content: &str,
        attachments: Vec<Attachment>,
    ) -> Result<Post> {
        let form = multipart_form(
            &[
                ("classroomId", classroom_id.to_string()),
                ("content", content.to_string()),
            ],
            "attachments",
            attachments,
        )?;
        self.post_multipart("/posts", form).await
    }

    pub async fn delete_post(&self, post_id: &str) -> Result<Value> {
        self.delete(&format!("/posts/{}", post_id)).await
    }

    pub async fn add_comment(&self, post_id: &str, content: &str) -> Result<Comment> {
        self.post(
            &format!("/posts/{}/comments", post_id),
            &json!({ "content": content }),
        )
        .await
    }
}
