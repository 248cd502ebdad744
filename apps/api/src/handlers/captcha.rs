use axum::Extension;
use axum::Json;
use axum::http::StatusCode;

use crate::dto::SubmissionResponse;
use crate::error::ApiResult;
use crate::middleware::ThrottleCheck;

/// Accepts a submission unless the throttle gate attached a denial.
///
/// A denied caller should be shown a challenge before trying again. When the
/// history store could not be consulted the submission fails with the store
/// error instead of being accepted unchecked.
pub async fn submit_handler(
    Extension(ThrottleCheck(check)): Extension<ThrottleCheck>,
) -> ApiResult<(StatusCode, Json<SubmissionResponse>)> {
    let outcome = check?;

    let response = match outcome.error {
        Some(reason) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(SubmissionResponse {
                accepted: false,
                challenge_required: true,
                message: Some(reason.message()),
                hits: outcome.hits,
            }),
        ),
        None => (
            StatusCode::OK,
            Json(SubmissionResponse {
                accepted: true,
                challenge_required: false,
                message: None,
                hits: outcome.hits,
            }),
        ),
    };

    Ok(response)
}
