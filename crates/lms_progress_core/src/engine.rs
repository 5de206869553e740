//! crates/lms_progress_core/src/engine.rs
//!
//! The progress engine: event ingestion and the sequential-access policy.
//! Stateless over its ports; every request is evaluated against the current
//! store and catalog state.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::{
    Actor, CompletionPolicy, CourseId, CourseOutline, LessonId, OutlineEntry, QuizEvent,
    WatchEvent,
};
use crate::ordering::{self, LessonRef};
use crate::ports::{ActivityStore, CourseCatalog, EnrollmentDirectory, PortError, PortResult};

//=========================================================================================
// Outcome Types
//=========================================================================================

/// Result of folding a playback event into the store.
#[derive(Debug, Clone)]
pub struct WatchOutcome {
    pub accepted: bool,
    pub completion_percentage: f64,
    pub is_completed: bool,
}

/// Result of folding a quiz submission into the store.
#[derive(Debug, Clone)]
pub struct QuizOutcome {
    pub quiz_attempts: u32,
    pub quiz_best_score: f64,
    pub quiz_passed_at_attempt: Option<u32>,
}

/// The access evaluator's answer for one lesson. Denials carry a
/// human-readable reason; when the block is an incomplete prerequisite, its
/// title is included so the UI can name it.
#[derive(Debug, Clone)]
pub struct AccessDecision {
    pub can_access: bool,
    pub reason: String,
    pub previous_lesson_title: Option<String>,
}

/// One row of a whole-course lock map.
#[derive(Debug, Clone)]
pub struct LessonLockStatus {
    pub lesson: LessonId,
    pub title: String,
    pub can_access: bool,
    pub reason: String,
    pub is_completed: bool,
    pub completion_percentage: f64,
}

pub(crate) const REASON_SIGN_IN: &str = "Please sign in to view this lesson";
pub(crate) const REASON_FIRST_LESSON: &str = "First lesson";
pub(crate) const REASON_REQUIREMENTS_MET: &str = "All requirements met";
pub(crate) const REASON_PREVIOUS_INCOMPLETE: &str = "Please complete the previous lesson first";
pub(crate) const REASON_MISCONFIGURED: &str = "Course ordering is misconfigured";

impl AccessDecision {
    fn allowed(reason: &str) -> Self {
        Self {
            can_access: true,
            reason: reason.to_string(),
            previous_lesson_title: None,
        }
    }

    fn denied(reason: &str, previous_lesson_title: Option<String>) -> Self {
        Self {
            can_access: false,
            reason: reason.to_string(),
            previous_lesson_title,
        }
    }
}

//=========================================================================================
// ProgressEngine
//=========================================================================================

/// The engine over its collaborator ports. Cheap to clone; all state lives
/// behind the ports.
#[derive(Clone)]
pub struct ProgressEngine {
    pub(crate) store: Arc<dyn ActivityStore>,
    pub(crate) catalog: Arc<dyn CourseCatalog>,
    pub(crate) enrollment: Option<Arc<dyn EnrollmentDirectory>>,
    pub(crate) policy: CompletionPolicy,
}

impl ProgressEngine {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        catalog: Arc<dyn CourseCatalog>,
        enrollment: Option<Arc<dyn EnrollmentDirectory>>,
        policy: CompletionPolicy,
    ) -> Self {
        Self {
            store,
            catalog,
            enrollment,
            policy,
        }
    }

    pub fn policy(&self) -> CompletionPolicy {
        self.policy
    }

    async fn resolve_lesson(
        &self,
        course: CourseId,
        lesson_ref: &LessonRef,
    ) -> PortResult<(CourseOutline, LessonId)> {
        let outline = self.catalog.outline(course).await?;
        let lesson = ordering::resolve(&outline, lesson_ref)?.lesson;
        Ok((outline, lesson))
    }

    //-------------------------------------------------------------------------------------
    // Progress Update Processor
    //-------------------------------------------------------------------------------------

    /// Folds one playback event into the (student, lesson) record.
    ///
    /// Guests are rejected before any resolution or mutation; a rejected
    /// event causes zero writes. Exactly one record is touched: course
    /// aggregates are computed on read, never maintained here.
    pub async fn submit_watch_event(
        &self,
        actor: Actor,
        course: CourseId,
        lesson_ref: &LessonRef,
        event: WatchEvent,
    ) -> PortResult<WatchOutcome> {
        let student = actor.student_id().ok_or(PortError::Unauthorized)?;
        event.validate()?;

        let (_, lesson) = self.resolve_lesson(course, lesson_ref).await?;
        let record = self
            .store
            .merge_watch(student, course, lesson, event, self.policy, Utc::now())
            .await?;

        Ok(WatchOutcome {
            accepted: true,
            completion_percentage: record.completion_percentage,
            is_completed: record.is_completed,
        })
    }

    /// Folds one quiz submission into the shared (student, lesson) record.
    pub async fn submit_quiz_result(
        &self,
        actor: Actor,
        course: CourseId,
        lesson_ref: &LessonRef,
        event: QuizEvent,
    ) -> PortResult<QuizOutcome> {
        let student = actor.student_id().ok_or(PortError::Unauthorized)?;
        event.validate()?;

        let (_, lesson) = self.resolve_lesson(course, lesson_ref).await?;
        let record = self
            .store
            .merge_quiz(student, course, lesson, event, self.policy, Utc::now())
            .await?;

        Ok(QuizOutcome {
            quiz_attempts: record.quiz_attempts,
            quiz_best_score: record.quiz_best_score,
            quiz_passed_at_attempt: record.quiz_passed_at_attempt,
        })
    }

    //-------------------------------------------------------------------------------------
    // Access Policy Evaluator
    //-------------------------------------------------------------------------------------

    /// Decides whether `actor` may view a lesson right now.
    ///
    /// The first lesson of a course is always open; every other lesson
    /// requires the immediately preceding lesson (by `order_index`) to be
    /// completed. Guests are always denied. An outline with a duplicated
    /// `order_index` fails closed rather than picking a predecessor
    /// arbitrarily.
    pub async fn can_access(
        &self,
        actor: Actor,
        course: CourseId,
        lesson_ref: &LessonRef,
    ) -> PortResult<AccessDecision> {
        let outline = self.catalog.outline(course).await?;
        let entry = ordering::resolve(&outline, lesson_ref)?;

        let student = match actor.student_id() {
            Some(id) => id,
            None => return Ok(AccessDecision::denied(REASON_SIGN_IN, None)),
        };

        if outline.has_ambiguous_ordering() {
            return Ok(AccessDecision::denied(REASON_MISCONFIGURED, None));
        }

        let previous = match outline.previous_of(entry) {
            Some(prev) => prev,
            None => return Ok(AccessDecision::allowed(REASON_FIRST_LESSON)),
        };

        let completed = self
            .store
            .get_activity(student, previous.lesson)
            .await?
            .map(|a| a.is_completed)
            .unwrap_or(false);

        if completed {
            Ok(AccessDecision::allowed(REASON_REQUIREMENTS_MET))
        } else {
            Ok(AccessDecision::denied(
                REASON_PREVIOUS_INCOMPLETE,
                Some(previous.title.clone()),
            ))
        }
    }

    /// The lock map for every lesson of a course, in lesson order.
    ///
    /// Computed in a single pass over one outline fetch and one activity
    /// scan, so course pages can render all locks without one access check
    /// per lesson.
    pub async fn lock_status(
        &self,
        actor: Actor,
        course: CourseId,
    ) -> PortResult<Vec<LessonLockStatus>> {
        let student = actor.student_id().ok_or(PortError::Unauthorized)?;
        let outline = self.catalog.outline(course).await?;
        let activities = self
            .store
            .activities_for_student_in_course(student, course)
            .await?;

        let misconfigured = outline.has_ambiguous_ordering();
        let activity_of = |entry: &OutlineEntry| activities.iter().find(|a| a.lesson == entry.lesson);

        let mut statuses = Vec::with_capacity(outline.lesson_count());
        let mut previous_completed = true;
        let mut previous_title: Option<String> = None;

        for entry in outline.lessons() {
            let (is_completed, completion_percentage) = activity_of(entry)
                .map(|a| (a.is_completed, a.completion_percentage))
                .unwrap_or((false, 0.0));

            let (can_access, reason) = if misconfigured {
                (false, REASON_MISCONFIGURED.to_string())
            } else if previous_title.is_none() {
                (true, REASON_FIRST_LESSON.to_string())
            } else if previous_completed {
                (true, REASON_REQUIREMENTS_MET.to_string())
            } else {
                (false, REASON_PREVIOUS_INCOMPLETE.to_string())
            };

            statuses.push(LessonLockStatus {
                lesson: entry.lesson,
                title: entry.title.clone(),
                can_access,
                reason,
                is_completed,
                completion_percentage,
            });

            previous_completed = is_completed;
            previous_title = Some(entry.title.clone());
        }

        Ok(statuses)
    }
}
