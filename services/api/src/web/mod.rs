pub mod actor;
pub mod reports;
pub mod rest;
pub mod state;

pub use actor::resolve_actor;
pub use reports::{
    activity_handler, bulk_progress_handler, course_summary_handler, lock_status_handler,
};
pub use rest::{check_access_handler, submit_quiz_handler, submit_watch_handler};

use axum::http::StatusCode;
use lms_progress_core::PortError;
use tracing::error;

/// Maps engine errors onto HTTP responses. The error taxonomy is stable:
/// NotFound/Unauthorized/InvalidInput/Conflict each have a status; anything
/// unexpected is logged and reported as a 500 without internals.
pub(crate) fn port_error_response(e: PortError) -> (StatusCode, String) {
    match e {
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        PortError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
        PortError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
        PortError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        PortError::Unexpected(msg) => {
            error!("Unexpected engine error: {msg}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal error occurred".to_string(),
            )
        }
    }
}
