//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapters: the concrete implementations
//! of the `ActivityStore`, `CourseCatalog`, and `EnrollmentDirectory` ports
//! from the core crate, over PostgreSQL via `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lms_progress_core::domain::{
    CompletionPolicy, CourseEnrollment, CourseId, CourseOutline, LessonActivity, LessonId,
    OutlineEntry, QuizEvent, StudentId, WatchEvent,
};
use lms_progress_core::ports::{
    ActivityFilter, ActivityStore, CourseCatalog, EnrollmentDirectory, PortError, PortResult,
};
use sqlx::{FromRow, PgPool, Row};
use std::collections::HashMap;
use uuid::Uuid;

/// How many optimistic-update rounds a merge gets before surfacing Conflict.
const MERGE_RETRY_BUDGET: u32 = 4;

const ACTIVITY_COLUMNS: &str = "student_id, course_id, lesson_id, watched_seconds, \
     total_duration_seconds, completion_percentage, is_completed, completion_date, \
     last_watched_timestamp, video_speed, quiz_attempts, quiz_best_score, \
     quiz_passed_at_attempt, version";

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ActivityRecord {
    student_id: Uuid,
    course_id: Uuid,
    lesson_id: Uuid,
    watched_seconds: f64,
    total_duration_seconds: f64,
    completion_percentage: f64,
    is_completed: bool,
    completion_date: Option<DateTime<Utc>>,
    last_watched_timestamp: Option<DateTime<Utc>>,
    video_speed: Option<String>,
    quiz_attempts: i32,
    quiz_best_score: f64,
    quiz_passed_at_attempt: Option<i32>,
    version: i64,
}

impl ActivityRecord {
    fn to_domain(&self) -> LessonActivity {
        LessonActivity {
            student: StudentId(self.student_id),
            course: CourseId(self.course_id),
            lesson: LessonId(self.lesson_id),
            watched_seconds: self.watched_seconds,
            total_duration_seconds: self.total_duration_seconds,
            completion_percentage: self.completion_percentage,
            is_completed: self.is_completed,
            completion_date: self.completion_date,
            last_watched_timestamp: self.last_watched_timestamp,
            video_speed: self.video_speed.clone(),
            quiz_attempts: self.quiz_attempts as u32,
            quiz_best_score: self.quiz_best_score,
            quiz_passed_at_attempt: self.quiz_passed_at_attempt.map(|a| a as u32),
        }
    }
}

#[derive(FromRow)]
struct LessonRow {
    id: Uuid,
    title: String,
    order_index: i32,
    chapter: i32,
    position_in_chapter: i32,
}

impl LessonRow {
    fn to_domain(self) -> OutlineEntry {
        OutlineEntry {
            lesson: LessonId(self.id),
            title: self.title,
            order_index: self.order_index,
            chapter: self.chapter as u32,
            position_in_chapter: self.position_in_chapter as u32,
        }
    }
}

//=========================================================================================
// PgStore: the ActivityStore adapter
//=========================================================================================

/// A Postgres adapter that implements the `ActivityStore` port.
///
/// Merges are applied as optimistic conditional updates keyed on the row's
/// `version` column: read, apply the pure merge, then write only if nobody
/// else bumped the version in between. A handful of retries absorbs the
/// occasional racing tick; exhaustion surfaces as `Conflict`, which the
/// caller may safely retry.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn fetch_versioned(
        &self,
        student: StudentId,
        lesson: LessonId,
    ) -> PortResult<Option<(LessonActivity, i64)>> {
        let record = sqlx::query_as::<_, ActivityRecord>(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM lesson_activity WHERE student_id = $1 AND lesson_id = $2"
        ))
        .bind(student.0)
        .bind(lesson.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(|r| (r.to_domain(), r.version)))
    }

    async fn insert_fresh(&self, record: &LessonActivity) -> PortResult<bool> {
        let result = sqlx::query(
            "INSERT INTO lesson_activity (student_id, course_id, lesson_id, watched_seconds, \
             total_duration_seconds, completion_percentage, is_completed, completion_date, \
             last_watched_timestamp, video_speed, quiz_attempts, quiz_best_score, \
             quiz_passed_at_attempt, version) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 0) \
             ON CONFLICT (student_id, lesson_id) DO NOTHING",
        )
        .bind(record.student.0)
        .bind(record.course.0)
        .bind(record.lesson.0)
        .bind(record.watched_seconds)
        .bind(record.total_duration_seconds)
        .bind(record.completion_percentage)
        .bind(record.is_completed)
        .bind(record.completion_date)
        .bind(record.last_watched_timestamp)
        .bind(record.video_speed.as_deref())
        .bind(record.quiz_attempts as i32)
        .bind(record.quiz_best_score)
        .bind(record.quiz_passed_at_attempt.map(|a| a as i32))
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_versioned(&self, record: &LessonActivity, version: i64) -> PortResult<bool> {
        let result = sqlx::query(
            "UPDATE lesson_activity SET watched_seconds = $1, total_duration_seconds = $2, \
             completion_percentage = $3, is_completed = $4, completion_date = $5, \
             last_watched_timestamp = $6, video_speed = $7, quiz_attempts = $8, \
             quiz_best_score = $9, quiz_passed_at_attempt = $10, version = version + 1 \
             WHERE student_id = $11 AND lesson_id = $12 AND version = $13",
        )
        .bind(record.watched_seconds)
        .bind(record.total_duration_seconds)
        .bind(record.completion_percentage)
        .bind(record.is_completed)
        .bind(record.completion_date)
        .bind(record.last_watched_timestamp)
        .bind(record.video_speed.as_deref())
        .bind(record.quiz_attempts as i32)
        .bind(record.quiz_best_score)
        .bind(record.quiz_passed_at_attempt.map(|a| a as i32))
        .bind(record.student.0)
        .bind(record.lesson.0)
        .bind(version)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected() == 1)
    }

    /// The optimistic read-modify-write loop shared by both merge kinds.
    async fn merge_with<F>(
        &self,
        student: StudentId,
        course: CourseId,
        lesson: LessonId,
        apply: F,
    ) -> PortResult<LessonActivity>
    where
        F: Fn(&mut LessonActivity),
    {
        for _ in 0..MERGE_RETRY_BUDGET {
            match self.fetch_versioned(student, lesson).await? {
                Some((mut record, version)) => {
                    apply(&mut record);
                    if self.update_versioned(&record, version).await? {
                        return Ok(record);
                    }
                }
                None => {
                    let mut record = LessonActivity::new(student, course, lesson);
                    apply(&mut record);
                    if self.insert_fresh(&record).await? {
                        return Ok(record);
                    }
                }
            }
            // Lost the race; re-read and fold into the winner's state.
        }
        Err(PortError::Conflict(format!(
            "Concurrent updates to lesson {} for student {} exceeded the retry budget",
            lesson.0, student.0
        )))
    }

    async fn fetch_activities(&self, where_clause: &str, binds: Vec<Uuid>) -> PortResult<Vec<LessonActivity>> {
        let sql = format!(
            "SELECT {ACTIVITY_COLUMNS} FROM lesson_activity WHERE {where_clause} \
             ORDER BY last_watched_timestamp DESC NULLS LAST"
        );
        let mut query = sqlx::query_as::<_, ActivityRecord>(&sql);
        for bind in binds {
            query = query.bind(bind);
        }
        let records = query.fetch_all(&self.pool).await.map_err(unexpected)?;
        Ok(records.iter().map(ActivityRecord::to_domain).collect())
    }
}

#[async_trait]
impl ActivityStore for PgStore {
    async fn merge_watch(
        &self,
        student: StudentId,
        course: CourseId,
        lesson: LessonId,
        event: WatchEvent,
        policy: CompletionPolicy,
        now: DateTime<Utc>,
    ) -> PortResult<LessonActivity> {
        self.merge_with(student, course, lesson, |record| {
            record.apply_watch(&event, &policy, now)
        })
        .await
    }

    async fn merge_quiz(
        &self,
        student: StudentId,
        course: CourseId,
        lesson: LessonId,
        event: QuizEvent,
        policy: CompletionPolicy,
        now: DateTime<Utc>,
    ) -> PortResult<LessonActivity> {
        self.merge_with(student, course, lesson, |record| {
            record.apply_quiz(&event, &policy, now)
        })
        .await
    }

    async fn get_activity(
        &self,
        student: StudentId,
        lesson: LessonId,
    ) -> PortResult<Option<LessonActivity>> {
        Ok(self
            .fetch_versioned(student, lesson)
            .await?
            .map(|(record, _)| record))
    }

    async fn activities_for_course(&self, course: CourseId) -> PortResult<Vec<LessonActivity>> {
        self.fetch_activities("course_id = $1", vec![course.0]).await
    }

    async fn activities_for_student_in_course(
        &self,
        student: StudentId,
        course: CourseId,
    ) -> PortResult<Vec<LessonActivity>> {
        self.fetch_activities("student_id = $1 AND course_id = $2", vec![student.0, course.0])
            .await
    }

    async fn activities_for_student_in_courses(
        &self,
        student: StudentId,
        courses: &[CourseId],
    ) -> PortResult<Vec<LessonActivity>> {
        let ids: Vec<Uuid> = courses.iter().map(|c| c.0).collect();
        let sql = format!(
            "SELECT {ACTIVITY_COLUMNS} FROM lesson_activity \
             WHERE student_id = $1 AND course_id = ANY($2) \
             ORDER BY last_watched_timestamp DESC NULLS LAST"
        );
        let records = sqlx::query_as::<_, ActivityRecord>(&sql)
            .bind(student.0)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.iter().map(ActivityRecord::to_domain).collect())
    }

    async fn list_activities(&self, filter: ActivityFilter) -> PortResult<Vec<LessonActivity>> {
        let sql = format!(
            "SELECT {ACTIVITY_COLUMNS} FROM lesson_activity \
             WHERE ($1::uuid IS NULL OR course_id = $1) \
               AND ($2::uuid IS NULL OR lesson_id = $2) \
               AND ($3::uuid IS NULL OR student_id = $3) \
             ORDER BY last_watched_timestamp DESC NULLS LAST"
        );
        let records = sqlx::query_as::<_, ActivityRecord>(&sql)
            .bind(filter.course.map(|c| c.0))
            .bind(filter.lesson.map(|l| l.0))
            .bind(filter.student.map(|s| s.0))
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.iter().map(ActivityRecord::to_domain).collect())
    }
}

//=========================================================================================
// PgCatalog: the CourseCatalog adapter
//=========================================================================================

/// Reads course outlines from the catalog tables the authoring system owns.
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CourseCatalog for PgCatalog {
    async fn outline(&self, course: CourseId) -> PortResult<CourseOutline> {
        let title: Option<String> = sqlx::query_scalar("SELECT title FROM courses WHERE id = $1")
            .bind(course.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        let title = title
            .ok_or_else(|| PortError::NotFound(format!("Course {} not found", course.0)))?;

        let rows = sqlx::query_as::<_, LessonRow>(
            "SELECT id, title, order_index, chapter, position_in_chapter \
             FROM lessons WHERE course_id = $1 ORDER BY order_index",
        )
        .bind(course.0)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(CourseOutline::new(
            course,
            title,
            rows.into_iter().map(LessonRow::to_domain).collect(),
        ))
    }

    async fn lesson_counts(&self, courses: &[CourseId]) -> PortResult<HashMap<CourseId, usize>> {
        let ids: Vec<Uuid> = courses.iter().map(|c| c.0).collect();
        let rows = sqlx::query(
            "SELECT course_id, COUNT(*) AS lesson_count FROM lessons \
             WHERE course_id = ANY($1) GROUP BY course_id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        rows.into_iter()
            .map(|row| {
                let course: Uuid = row.try_get("course_id").map_err(unexpected)?;
                let count: i64 = row.try_get("lesson_count").map_err(unexpected)?;
                Ok((CourseId(course), count as usize))
            })
            .collect()
    }
}

//=========================================================================================
// PgEnrollment: the EnrollmentDirectory adapter
//=========================================================================================

/// Reads the enrollment roster, joined with student display names.
#[derive(Clone)]
pub struct PgEnrollment {
    pool: PgPool,
}

impl PgEnrollment {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EnrollmentDirectory for PgEnrollment {
    async fn roster(&self, course: CourseId) -> PortResult<Vec<CourseEnrollment>> {
        let rows = sqlx::query(
            "SELECT e.student_id, s.display_name FROM enrollments e \
             LEFT JOIN students s ON s.id = e.student_id \
             WHERE e.course_id = $1 ORDER BY e.student_id",
        )
        .bind(course.0)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        rows.into_iter()
            .map(|row| {
                let student: Uuid = row.try_get("student_id").map_err(unexpected)?;
                let student_name: Option<String> =
                    row.try_get("display_name").map_err(unexpected)?;
                Ok(CourseEnrollment {
                    student: StudentId(student),
                    student_name,
                })
            })
            .collect()
    }
}
