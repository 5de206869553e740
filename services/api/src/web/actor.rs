//! services/api/src/web/actor.rs
//!
//! Actor-resolution middleware.
//!
//! Authentication itself lives upstream (a gateway or the surrounding LMS);
//! by the time a request reaches this service it carries the authenticated
//! student id in the `x-student-id` header. No header means the request is
//! from a guest, which the engine treats as a first-class (always denied)
//! actor, so this middleware never rejects for a missing identity, only for
//! a malformed one.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use lms_progress_core::{Actor, StudentId};
use uuid::Uuid;

pub const STUDENT_ID_HEADER: &str = "x-student-id";

/// Resolves the request's `Actor` and inserts it into request extensions.
pub async fn resolve_actor(mut req: Request, next: Next) -> Result<Response, (StatusCode, String)> {
    let actor = match req.headers().get(STUDENT_ID_HEADER) {
        None => Actor::Guest,
        Some(value) => {
            let raw = value.to_str().map_err(|_| {
                (
                    StatusCode::BAD_REQUEST,
                    format!("{STUDENT_ID_HEADER} header is not valid text"),
                )
            })?;
            let id = Uuid::parse_str(raw).map_err(|_| {
                (
                    StatusCode::BAD_REQUEST,
                    format!("{STUDENT_ID_HEADER} header is not a valid UUID"),
                )
            })?;
            Actor::Student(StudentId(id))
        }
    };

    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}
