use quietgate_domain::HistorySnapshot;
use serde::Serialize;

/// API error payload.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    message: String,
}

impl ErrorResponse {
    pub fn new(message: String) -> Self {
        Self { message }
    }
}

/// Health response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Result of a throttled captcha submission.
#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub accepted: bool,
    pub challenge_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub hits: HistorySnapshot,
}

/// Attempt history for one identifier.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub identifier: String,
    pub hits: HistorySnapshot,
}

/// Number of records removed by a clear request.
#[derive(Debug, Serialize)]
pub struct ClearHistoryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub removed: u64,
}
