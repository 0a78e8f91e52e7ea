use serde_json::{json, Value};

use super::models::{Quiz, QuizAnswers, QuizAttempt, QuizInput};
use super::ApiClient;
use crate::error::Result;

impl ApiClient {
    pub async fn list_quizzes(&self, classroom_id: &str) -> Result<Vec<Quiz>> {
        self.get(&format!("/classrooms/{}/quizzes", classroom_id)).await
    }

    pub async fn get_quiz(&self, quiz_id: &str) -> Result<Quiz> {
        self.get(&format!("/quizzes/{}", quiz_id)).await
    }

    pub async fn create_quiz(&self, input: &QuizInput) -> Result<Quiz> {
        self.post("/quizzes", input).await
    }

    /// Opens an attempt. The returned id is the session id used on the
    /// real-time channel.
    pub async fn start_quiz(&self, quiz_id: &str) -> Result<QuizAttempt> {
        self.post(&format!("/quizzes/{}/start", quiz_id), &json!({})).await
    }

    pub async fn submit_quiz(&self, attempt_id: &str, answers: &QuizAnswers) -> Result<Value> {
        self.post(&format!("/quizzes/attempts/{}/submit", attempt_id), answers)
            .await
    }

    /// Results as computed by the backend; returned untouched.
    pub async fn quiz_results(&self, quiz_id: &str) -> Result<Value> {
        self.get(&format!("/quizzes/{}/results", quiz_id)).await
    }
}
