//! crates/lms_progress_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the engine's collaborators.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! core to be independent of specific external implementations like databases.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::domain::{
    CompletionPolicy, CourseEnrollment, CourseId, CourseOutline, LessonActivity, LessonId,
    QuizEvent, StudentId, WatchEvent,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port and engine operations.
/// This abstracts away the specific errors from external services.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Optimistic-retry budget exhausted on a concurrent update. Safe for the
    /// caller to retry.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Optional filters for activity listings. Empty filter lists everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivityFilter {
    pub course: Option<CourseId>,
    pub lesson: Option<LessonId>,
    pub student: Option<StudentId>,
}

/// The persisted LessonActivity store.
///
/// The two `merge_*` operations are the only writes. Implementations must
/// apply them atomically per record (per-record locking or an optimistic
/// conditional update), so that concurrent merges for the same
/// (student, lesson) pair never overwrite each other's contribution. The
/// merge semantics themselves are `LessonActivity::apply_watch` /
/// `apply_quiz`; adapters only supply the read-modify-write envelope.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Creates the record on first event, then folds the event in. Returns
    /// the post-merge record.
    async fn merge_watch(
        &self,
        student: StudentId,
        course: CourseId,
        lesson: LessonId,
        event: WatchEvent,
        policy: CompletionPolicy,
        now: DateTime<Utc>,
    ) -> PortResult<LessonActivity>;

    /// Same envelope as `merge_watch`, for quiz submissions.
    async fn merge_quiz(
        &self,
        student: StudentId,
        course: CourseId,
        lesson: LessonId,
        event: QuizEvent,
        policy: CompletionPolicy,
        now: DateTime<Utc>,
    ) -> PortResult<LessonActivity>;

    async fn get_activity(
        &self,
        student: StudentId,
        lesson: LessonId,
    ) -> PortResult<Option<LessonActivity>>;

    /// All records in a course, across students. Snapshot read.
    async fn activities_for_course(&self, course: CourseId) -> PortResult<Vec<LessonActivity>>;

    /// One student's records within a course.
    async fn activities_for_student_in_course(
        &self,
        student: StudentId,
        course: CourseId,
    ) -> PortResult<Vec<LessonActivity>>;

    /// One student's records across several courses, in a single batched
    /// call. Backs bulk progress: cost is linear in the rows touched, not in
    /// courses x students.
    async fn activities_for_student_in_courses(
        &self,
        student: StudentId,
        courses: &[CourseId],
    ) -> PortResult<Vec<LessonActivity>>;

    /// Filtered listing, ordered by `last_watched_timestamp` descending.
    async fn list_activities(&self, filter: ActivityFilter) -> PortResult<Vec<LessonActivity>>;
}

/// Read-only access to the course/lesson catalog owned by the authoring
/// system.
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    /// The current ordered lesson sequence of a course.
    async fn outline(&self, course: CourseId) -> PortResult<CourseOutline>;

    /// Lesson counts for several courses at once. Unknown courses are simply
    /// absent from the result.
    async fn lesson_counts(&self, courses: &[CourseId]) -> PortResult<HashMap<CourseId, usize>>;
}

/// Optional enrollment roster. When absent, dashboards fall back to
/// "students with any activity".
#[async_trait]
pub trait EnrollmentDirectory: Send + Sync {
    async fn roster(&self, course: CourseId) -> PortResult<Vec<CourseEnrollment>>;
}
