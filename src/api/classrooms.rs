use serde_json::{json, Value};

use super::models::{Classroom, ClassroomInput};
use super::ApiClient;
use crate::error::Result;

impl ApiClient {
    pub async fn list_classrooms(&self) -> Result<Vec<Classroom>> {
        self.get("/classrooms").await
    }

    pub async fn get_classroom(&self, classroom_id: &str) -> Result<Classroom> {
        self.get(&format!("/classrooms/{}", classroom_id)).await
    }

    pub async fn create_classroom(&self, input: &ClassroomInput) -> Result<Classroom> {
        self.post("/classrooms", input).await
    }

    pub async fn update_classroom(
        &self,
        classroom_id: &str,
        input: &ClassroomInput,
    ) -> Result<Classroom> {
        self.put(&format!("/classrooms/{}", classroom_id), input).await
    }

    pub async fn delete_classroom(&self, classroom_id: &str) -> Result<Value> {
        self.delete(&format!("/classrooms/{}", classroom_id)).await
    }

    /// Joins a classroom by its share code.
    pub async fn join_classroom(&self, code: &str) -> Result<Classroom> {
        self.post("/classrooms/join", &json!({ "code": code })).await
    }
}
