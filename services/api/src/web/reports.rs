//! services/api/src/web/reports.rs
//!
//! Axum handlers for the read side: whole-course lock maps, dashboard
//! summaries, bulk multi-course progress, and the raw activity listing.

use crate::web::port_error_response;
use crate::web::state::AppState;
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use lms_progress_core::{
    representative_speed, Actor, ActivityFilter, CourseId, LessonActivity, LessonId, LessonRef,
    StudentId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// Response Structs
//=========================================================================================

/// One (student, lesson) progress record on the wire.
#[derive(Serialize, ToSchema)]
pub struct ActivityDto {
    pub student: Uuid,
    pub course: Uuid,
    pub lesson: Uuid,
    pub watched_seconds: f64,
    pub total_duration_seconds: f64,
    pub completion_percentage: f64,
    pub is_completed: bool,
    pub completion_date: Option<DateTime<Utc>>,
    pub last_watched_timestamp: Option<DateTime<Utc>>,
    pub video_speed: Option<String>,
    pub quiz_attempts: u32,
    pub quiz_best_score: f64,
    pub quiz_passed_at_attempt: Option<u32>,
}

impl From<LessonActivity> for ActivityDto {
    fn from(a: LessonActivity) -> Self {
        Self {
            student: a.student.0,
            course: a.course.0,
            lesson: a.lesson.0,
            watched_seconds: a.watched_seconds,
            total_duration_seconds: a.total_duration_seconds,
            completion_percentage: a.completion_percentage,
            is_completed: a.is_completed,
            completion_date: a.completion_date,
            last_watched_timestamp: a.last_watched_timestamp,
            video_speed: a.video_speed,
            quiz_attempts: a.quiz_attempts,
            quiz_best_score: a.quiz_best_score,
            quiz_passed_at_attempt: a.quiz_passed_at_attempt,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct LessonLockStatusDto {
    pub lesson: Uuid,
    pub title: String,
    pub can_access: bool,
    pub reason: String,
    pub is_completed: bool,
    pub completion_percentage: f64,
}

/// One student's rollup row on the dashboard.
#[derive(Serialize, ToSchema)]
pub struct StudentSummaryDto {
    pub student: Uuid,
    pub student_name: Option<String>,
    pub completed_lessons: usize,
    /// Completed lessons over lesson count, as a percentage.
    pub overall_progress: f64,
    pub completion_date: Option<DateTime<Utc>>,
    /// The most recently reported playback speed across the student's
    /// records, if any.
    pub video_speed: Option<String>,
    pub lesson_details: Vec<ActivityDto>,
    /// Present when a lesson filter was given: that lesson's record, with
    /// its own completion percentage (distinct from `overall_progress`).
    pub specific_lesson: Option<ActivityDto>,
}

#[derive(Serialize, ToSchema)]
pub struct CourseSummaryResponse {
    pub total_students: usize,
    pub lesson_count: usize,
    pub students: Vec<StudentSummaryDto>,
}

#[derive(Serialize, ToSchema)]
pub struct ActivityViewDto {
    #[serde(flatten)]
    pub activity: ActivityDto,
    pub course_title: Option<String>,
    pub lesson_title: Option<String>,
}

//=========================================================================================
// Query Structs
//=========================================================================================

#[derive(Deserialize)]
pub struct SummaryQuery {
    /// Restrict the summary to one student.
    pub student: Option<Uuid>,
    /// A lesson id or positional token; attaches `specific_lesson` per row.
    pub lesson: Option<String>,
}

#[derive(Deserialize)]
pub struct BulkQuery {
    /// Comma-separated course ids.
    pub courses: String,
}

#[derive(Deserialize)]
pub struct ActivityQuery {
    pub course: Option<Uuid>,
    pub lesson: Option<Uuid>,
    pub student: Option<Uuid>,
}

fn parse_course_list(raw: &str) -> Result<Vec<CourseId>, (StatusCode, String)> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Uuid::parse_str(s).map(CourseId).map_err(|_| {
                (
                    StatusCode::BAD_REQUEST,
                    format!("'{s}' is not a valid course id"),
                )
            })
        })
        .collect()
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// The lock map for every lesson of a course, in lesson order.
#[utoipa::path(
    get,
    path = "/courses/{course}/lock-status",
    responses(
        (status = 200, description = "Per-lesson lock status", body = [LessonLockStatusDto]),
        (status = 401, description = "Guests have no lock map"),
        (status = 404, description = "Unknown course")
    ),
    params(
        ("course" = Uuid, Path, description = "The course id."),
        ("x-student-id" = Option<Uuid>, Header, description = "Authenticated student id.")
    )
)]
pub async fn lock_status_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(course): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let statuses = app_state
        .engine
        .lock_status(actor, CourseId(course))
        .await
        .map_err(port_error_response)?;

    let body: Vec<LessonLockStatusDto> = statuses
        .into_iter()
        .map(|s| LessonLockStatusDto {
            lesson: s.lesson.0,
            title: s.title,
            can_access: s.can_access,
            reason: s.reason,
            is_completed: s.is_completed,
            completion_percentage: s.completion_percentage,
        })
        .collect();
    Ok(Json(body))
}

/// The per-course dashboard summary across students.
#[utoipa::path(
    get,
    path = "/courses/{course}/summary",
    responses(
        (status = 200, description = "Course summary", body = CourseSummaryResponse),
        (status = 400, description = "Malformed lesson filter"),
        (status = 401, description = "Guests cannot read summaries"),
        (status = 404, description = "Unknown course or filter lesson")
    ),
    params(
        ("course" = Uuid, Path, description = "The course id."),
        ("student" = Option<Uuid>, Query, description = "Restrict to one student."),
        ("lesson" = Option<String>, Query, description = "Lesson id or positional token filter."),
        ("x-student-id" = Option<Uuid>, Header, description = "Authenticated student id.")
    )
)]
pub async fn course_summary_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(course): Path<Uuid>,
    Query(query): Query<SummaryQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let lesson_ref = match &query.lesson {
        Some(raw) => Some(raw.parse::<LessonRef>().map_err(port_error_response)?),
        None => None,
    };

    let summary = app_state
        .engine
        .course_summary(
            actor,
            CourseId(course),
            query.student.map(StudentId),
            lesson_ref.as_ref(),
        )
        .await
        .map_err(port_error_response)?;

    let students: Vec<StudentSummaryDto> = summary
        .students
        .into_iter()
        .map(|s| StudentSummaryDto {
            student: s.student.0,
            student_name: s.student_name,
            completed_lessons: s.completed_lessons,
            overall_progress: s.overall_progress,
            completion_date: s.completion_date,
            video_speed: representative_speed(&s.lesson_details).map(str::to_string),
            lesson_details: s.lesson_details.into_iter().map(ActivityDto::from).collect(),
            specific_lesson: s.specific_lesson.map(ActivityDto::from),
        })
        .collect();

    Ok(Json(CourseSummaryResponse {
        total_students: summary.total_students,
        lesson_count: summary.lesson_count,
        students,
    }))
}

/// Overall progress for the calling student across several courses at once.
///
/// Guests receive an empty map so course listings can still render.
#[utoipa::path(
    get,
    path = "/progress/bulk",
    responses(
        (status = 200, description = "Course id to overall progress percentage", body = Object),
        (status = 400, description = "Malformed course list")
    ),
    params(
        ("courses" = String, Query, description = "Comma-separated course ids."),
        ("x-student-id" = Option<Uuid>, Header, description = "Authenticated student id; absent for guests.")
    )
)]
pub async fn bulk_progress_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<BulkQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let courses = parse_course_list(&query.courses)?;

    let progress = app_state
        .engine
        .bulk_progress(actor, &courses)
        .await
        .map_err(port_error_response)?;

    let body: HashMap<String, f64> = progress
        .into_iter()
        .map(|(course, pct)| (course.0.to_string(), pct))
        .collect();
    Ok(Json(body))
}

/// Raw activity listing for reporting, filterable by course, lesson, and
/// student, most recent activity first.
#[utoipa::path(
    get,
    path = "/progress/activity",
    responses(
        (status = 200, description = "Activity records with catalog titles", body = [ActivityViewDto]),
        (status = 401, description = "Guests cannot read activity")
    ),
    params(
        ("course" = Option<Uuid>, Query, description = "Course filter."),
        ("lesson" = Option<Uuid>, Query, description = "Lesson filter."),
        ("student" = Option<Uuid>, Query, description = "Student filter."),
        ("x-student-id" = Option<Uuid>, Header, description = "Authenticated student id.")
    )
)]
pub async fn activity_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<ActivityQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let filter = ActivityFilter {
        course: query.course.map(CourseId),
        lesson: query.lesson.map(LessonId),
        student: query.student.map(StudentId),
    };

    let views = app_state
        .engine
        .list_activity(actor, filter)
        .await
        .map_err(port_error_response)?;

    let body: Vec<ActivityViewDto> = views
        .into_iter()
        .map(|v| ActivityViewDto {
            activity: ActivityDto::from(v.activity),
            course_title: v.course_title,
            lesson_title: v.lesson_title,
        })
        .collect();
    Ok(Json(body))
}
