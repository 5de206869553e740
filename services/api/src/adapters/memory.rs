//! services/api/src/adapters/memory.rs
//!
//! In-memory implementations of the engine's ports. Used by the integration
//! tests and handy for local development without a database. The single
//! mutex around the record map serializes merges, which satisfies the
//! per-record atomicity the `ActivityStore` contract requires.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lms_progress_core::domain::{
    CompletionPolicy, CourseEnrollment, CourseId, CourseOutline, LessonActivity, LessonId,
    QuizEvent, StudentId, WatchEvent,
};
use lms_progress_core::ports::{
    ActivityFilter, ActivityStore, CourseCatalog, EnrollmentDirectory, PortError, PortResult,
};
use std::collections::HashMap;
use std::sync::Mutex;

//=========================================================================================
// MemoryStore
//=========================================================================================

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<(StudentId, LessonId), LessonActivity>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn merge_with<F>(
        &self,
        student: StudentId,
        course: CourseId,
        lesson: LessonId,
        apply: F,
    ) -> LessonActivity
    where
        F: FnOnce(&mut LessonActivity),
    {
        let mut records = self.records.lock().expect("record map poisoned");
        let record = records
            .entry((student, lesson))
            .or_insert_with(|| LessonActivity::new(student, course, lesson));
        apply(record);
        record.clone()
    }

    fn collect<P>(&self, predicate: P) -> Vec<LessonActivity>
    where
        P: Fn(&LessonActivity) -> bool,
    {
        let records = self.records.lock().expect("record map poisoned");
        let mut matched: Vec<LessonActivity> =
            records.values().filter(|a| predicate(a)).cloned().collect();
        matched.sort_by(|a, b| b.last_watched_timestamp.cmp(&a.last_watched_timestamp));
        matched
    }
}

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn merge_watch(
        &self,
        student: StudentId,
        course: CourseId,
        lesson: LessonId,
        event: WatchEvent,
        policy: CompletionPolicy,
        now: DateTime<Utc>,
    ) -> PortResult<LessonActivity> {
        Ok(self.merge_with(student, course, lesson, |record| {
            record.apply_watch(&event, &policy, now)
        }))
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
        Ok(self.merge_with(student, course, lesson, |record| {
            record.apply_quiz(&event, &policy, now)
        }))
    }

    async fn get_activity(
        &self,
        student: StudentId,
        lesson: LessonId,
    ) -> PortResult<Option<LessonActivity>> {
        let records = self.records.lock().expect("record map poisoned");
        Ok(records.get(&(student, lesson)).cloned())
    }

    async fn activities_for_course(&self, course: CourseId) -> PortResult<Vec<LessonActivity>> {
        Ok(self.collect(|a| a.course == course))
    }

    async fn activities_for_student_in_course(
        &self,
        student: StudentId,
        course: CourseId,
    ) -> PortResult<Vec<LessonActivity>> {
        Ok(self.collect(|a| a.student == student && a.course == course))
    }

    async fn activities_for_student_in_courses(
        &self,
        student: StudentId,
        courses: &[CourseId],
    ) -> PortResult<Vec<LessonActivity>> {
        Ok(self.collect(|a| a.student == student && courses.contains(&a.course)))
    }

    async fn list_activities(&self, filter: ActivityFilter) -> PortResult<Vec<LessonActivity>> {
        Ok(self.collect(|a| {
            filter.course.map_or(true, |c| a.course == c)
                && filter.lesson.map_or(true, |l| a.lesson == l)
                && filter.student.map_or(true, |s| a.student == s)
        }))
    }
}

//=========================================================================================
// MemoryCatalog
//=========================================================================================

#[derive(Default)]
pub struct MemoryCatalog {
    outlines: Mutex<HashMap<CourseId, CourseOutline>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, outline: CourseOutline) {
        let mut outlines = self.outlines.lock().expect("outline map poisoned");
        outlines.insert(outline.course, outline);
    }
}

#[async_trait]
impl CourseCatalog for MemoryCatalog {
    async fn outline(&self, course: CourseId) -> PortResult<CourseOutline> {
        let outlines = self.outlines.lock().expect("outline map poisoned");
        outlines
            .get(&course)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Course {} not found", course.0)))
    }

    async fn lesson_counts(&self, courses: &[CourseId]) -> PortResult<HashMap<CourseId, usize>> {
        let outlines = self.outlines.lock().expect("outline map poisoned");
        Ok(courses
            .iter()
            .filter_map(|c| outlines.get(c).map(|o| (*c, o.lesson_count())))
            .collect())
    }
}

//=========================================================================================
// MemoryEnrollment
//=========================================================================================

#[derive(Default)]
pub struct MemoryEnrollment {
    rosters: Mutex<HashMap<CourseId, Vec<CourseEnrollment>>>,
}

impl MemoryEnrollment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enroll(&self, course: CourseId, student: StudentId, student_name: Option<&str>) {
        let mut rosters = self.rosters.lock().expect("roster map poisoned");
        rosters.entry(course).or_default().push(CourseEnrollment {
            student,
            student_name: student_name.map(str::to_string),
        });
    }
}

#[async_trait]
impl EnrollmentDirectory for MemoryEnrollment {
    async fn roster(&self, course: CourseId) -> PortResult<Vec<CourseEnrollment>> {
        let rosters = self.rosters.lock().expect("roster map poisoned");
        Ok(rosters.get(&course).cloned().unwrap_or_default())
    }
}
