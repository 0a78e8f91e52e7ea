use serde_json::Value;

use super::models::{AttendanceRecord, AttendanceSheet};
use super::ApiClient;
use crate::error::Result;

impl ApiClient {
    pub async fn classroom_attendance(&self, classroom_id: &str) -> Result<Vec<AttendanceRecord>> {
        self.get(&format!("/classrooms/{}/attendance", classroom_id))
            .await
    }

    pub async fn record_attendance(&self, sheet: &AttendanceSheet) -> Result<Value> {
        tracing::info!(
            classroom_id = %sheet.classroom_id,
            date = %sheet.date,
            records = sheet.records.len(),
            "Recording attendance"
        );
        self.post("/attendance", sheet).await
    }

    pub async fn student_attendance(&self, student_id: &str) -> Result<Vec<AttendanceRecord>> {
        self.get(&format!("/attendance/student/{}", student_id)).await
    }
}
