//! services/api/src/web/rest.rs
//!
//! Axum handlers for the event-ingestion and access-check endpoints, plus
//! the master definition for the OpenAPI specification.

use crate::web::port_error_response;
use crate::web::state::AppState;
use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use lms_progress_core::{
    Actor, CourseId, EventKind, LessonRef, QuizEvent, WatchEvent,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        submit_watch_handler,
        submit_quiz_handler,
        check_access_handler,
        crate::web::reports::lock_status_handler,
        crate::web::reports::course_summary_handler,
        crate::web::reports::bulk_progress_handler,
        crate::web::reports::activity_handler,
    ),
    components(
        schemas(
            WatchEventRequest,
            WatchEventResponse,
            QuizResultRequest,
            QuizResultResponse,
            AccessResponse,
            EventKindDto,
            crate::web::reports::LessonLockStatusDto,
            crate::web::reports::CourseSummaryResponse,
            crate::web::reports::StudentSummaryDto,
            crate::web::reports::ActivityDto,
            crate::web::reports::ActivityViewDto,
        )
    ),
    tags(
        (name = "Lesson Progress API", description = "Progress tracking and sequential lesson access control.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Request and Response Structs
//=========================================================================================

/// Playback event kinds the client may report.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventKindDto {
    Tick,
    Pause,
    Ended,
}

impl From<EventKindDto> for EventKind {
    fn from(kind: EventKindDto) -> Self {
        match kind {
            EventKindDto::Tick => EventKind::Tick,
            EventKindDto::Pause => EventKind::Pause,
            EventKindDto::Ended => EventKind::Ended,
        }
    }
}

/// A playback progress report.
#[derive(Deserialize, ToSchema)]
pub struct WatchEventRequest {
    pub course: Uuid,
    /// A lesson id, or a positional token like "1-2".
    pub lesson: String,
    pub speed: String,
    pub watched_seconds: f64,
    pub total_duration_seconds: f64,
    pub event_kind: EventKindDto,
}

#[derive(Serialize, ToSchema)]
pub struct WatchEventResponse {
    pub accepted: bool,
    pub completion_percentage: f64,
    pub is_completed: bool,
}

/// A quiz submission result.
#[derive(Deserialize, ToSchema)]
pub struct QuizResultRequest {
    pub course: Uuid,
    /// A lesson id, or a positional token like "1-2".
    pub lesson: String,
    pub score_percentage: f64,
}

#[derive(Serialize, ToSchema)]
pub struct QuizResultResponse {
    pub quiz_attempts: u32,
    pub quiz_best_score: f64,
    pub quiz_passed_at_attempt: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct AccessResponse {
    pub can_access: bool,
    pub reason: String,
    pub previous_lesson_title: Option<String>,
}

fn parse_lesson_ref(raw: &str) -> Result<LessonRef, (StatusCode, String)> {
    raw.parse::<LessonRef>().map_err(port_error_response)
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Report playback progress for a lesson.
///
/// Folds the event into the student's progress record under the engine's
/// monotonic merge rules. Guests receive 401 and cause no writes.
#[utoipa::path(
    post,
    path = "/progress/watch",
    request_body = WatchEventRequest,
    responses(
        (status = 200, description = "Event accepted and merged", body = WatchEventResponse),
        (status = 400, description = "Malformed lesson reference or numbers"),
        (status = 401, description = "Guest actors cannot record progress"),
        (status = 404, description = "Unknown course or lesson"),
        (status = 409, description = "Concurrent-update retries exhausted; safe to retry")
    ),
    params(
        ("x-student-id" = Option<Uuid>, Header, description = "Authenticated student id; absent for guests.")
    )
)]
pub async fn submit_watch_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<WatchEventRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let lesson_ref = parse_lesson_ref(&req.lesson)?;
    let event = WatchEvent {
        speed: req.speed,
        watched_seconds: req.watched_seconds,
        total_duration_seconds: req.total_duration_seconds,
        kind: req.event_kind.into(),
    };

    let outcome = app_state
        .engine
        .submit_watch_event(actor, CourseId(req.course), &lesson_ref, event)
        .await
        .map_err(port_error_response)?;

    Ok(Json(WatchEventResponse {
        accepted: outcome.accepted,
        completion_percentage: outcome.completion_percentage,
        is_completed: outcome.is_completed,
    }))
}

/// Report a quiz submission for a lesson.
#[utoipa::path(
    post,
    path = "/progress/quiz",
    request_body = QuizResultRequest,
    responses(
        (status = 200, description = "Result merged", body = QuizResultResponse),
        (status = 400, description = "Malformed lesson reference or score"),
        (status = 401, description = "Guest actors cannot record progress"),
        (status = 404, description = "Unknown course or lesson")
    ),
    params(
        ("x-student-id" = Option<Uuid>, Header, description = "Authenticated student id; absent for guests.")
    )
)]
pub async fn submit_quiz_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<QuizResultRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let lesson_ref = parse_lesson_ref(&req.lesson)?;
    let event = QuizEvent {
        score_percentage: req.score_percentage,
    };

    let outcome = app_state
        .engine
        .submit_quiz_result(actor, CourseId(req.course), &lesson_ref, event)
        .await
        .map_err(port_error_response)?;

    Ok(Json(QuizResultResponse {
        quiz_attempts: outcome.quiz_attempts,
        quiz_best_score: outcome.quiz_best_score,
        quiz_passed_at_attempt: outcome.quiz_passed_at_attempt,
    }))
}

/// Check whether the actor may view a lesson.
///
/// Always returns a decision, never a 401: a guest gets a denial with a
/// sign-in reason, a student behind an incomplete prerequisite gets the
/// prerequisite's title.
#[utoipa::path(
    get,
    path = "/courses/{course}/lessons/{lesson}/access",
    responses(
        (status = 200, description = "Access decision", body = AccessResponse),
        (status = 400, description = "Malformed lesson reference"),
        (status = 404, description = "Unknown course or lesson")
    ),
    params(
        ("course" = Uuid, Path, description = "The course id."),
        ("lesson" = String, Path, description = "A lesson id, or a positional token like '1-2'."),
        ("x-student-id" = Option<Uuid>, Header, description = "Authenticated student id; absent for guests.")
    )
)]
pub async fn check_access_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path((course, lesson)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let lesson_ref = parse_lesson_ref(&lesson)?;

    let decision = app_state
        .engine
        .can_access(actor, CourseId(course), &lesson_ref)
        .await
        .map_err(port_error_response)?;

    Ok(Json(AccessResponse {
        can_access: decision.can_access,
        reason: decision.reason,
        previous_lesson_title: decision.previous_lesson_title,
    }))
}
