use serde_json::{json, Value};

use super::models::{VideoClass, VideoClassInput};
use super::ApiClient;
use crate::error::Result;

impl ApiClient {
    pub async fn list_video_classes(&self, classroom_id: &str) -> Result<Vec<VideoClass>> {
        self.get(&format!("/classrooms/{}/video-classes", classroom_id))
            .await
    }

    pub async fn schedule_video_class(&self, input: &VideoClassInput) -> Result<VideoClass> {
        self.post("/video-classes", input).await
    }

    pub async fn join_video_class(&self, video_class_id: &str) -> Result<VideoClass> {
        self.post(&format!("/video-classes/{}/join", video_class_id), &json!({}))
            .await
    }

    pub async fn end_video_class(&self, video_class_id: &str) -> Result<Value> {
        self.post(&format!("/video-classes/{}/end", video_class_id), &json!({}))
            .await
    }
}
