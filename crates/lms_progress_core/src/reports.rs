//! crates/lms_progress_core/src/reports.rs
//!
//! Read-time aggregation over LessonActivity records: per-course dashboard
//! summaries, bulk multi-course progress, and filtered activity listings.
//! Aggregates are snapshot reads; nothing here writes to the store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::{Actor, CourseId, LessonActivity, LessonId, StudentId};
use crate::engine::ProgressEngine;
use crate::ordering::{self, LessonRef};
use crate::ports::{ActivityFilter, PortError, PortResult};

//=========================================================================================
// Summary Types
//=========================================================================================

/// A whole-course dashboard summary.
#[derive(Debug, Clone)]
pub struct CourseSummary {
    pub total_students: usize,
    pub lesson_count: usize,
    pub students: Vec<StudentSummary>,
}

/// One student's rollup within a course.
///
/// `overall_progress` is completed lessons over lesson count. When a lesson
/// filter was given, `specific_lesson` carries that lesson's record with its
/// own `completion_percentage`; the two are deliberately distinct aggregates.
#[derive(Debug, Clone)]
pub struct StudentSummary {
    pub student: StudentId,
    pub student_name: Option<String>,
    pub completed_lessons: usize,
    pub overall_progress: f64,
    /// Course-level completion: the latest lesson completion date, present
    /// only once every lesson is completed.
    pub completion_date: Option<DateTime<Utc>>,
    /// All of the student's records in the course, most recent activity first.
    pub lesson_details: Vec<LessonActivity>,
    pub specific_lesson: Option<LessonActivity>,
}

/// An activity record enriched with catalog titles, for reporting.
#[derive(Debug, Clone)]
pub struct ActivityView {
    pub activity: LessonActivity,
    pub course_title: Option<String>,
    pub lesson_title: Option<String>,
}

/// Picks the speed to show for a student: the first recency-ordered record
/// that reported one.
pub fn representative_speed(details: &[LessonActivity]) -> Option<&str> {
    details.iter().find_map(|d| d.video_speed.as_deref())
}

fn overall_progress(completed: usize, lesson_count: usize) -> f64 {
    if lesson_count == 0 {
        return 0.0;
    }
    completed as f64 / lesson_count as f64 * 100.0
}

fn sort_most_recent_first(details: &mut [LessonActivity]) {
    details.sort_by(|a, b| b.last_watched_timestamp.cmp(&a.last_watched_timestamp));
}

//=========================================================================================
// Aggregation Engine
//=========================================================================================

impl ProgressEngine {
    /// The dashboard summary for one course.
    ///
    /// Students come from the enrollment roster when one is wired and
    /// non-empty, otherwise from "students with any activity". Both filters
    /// are optional; `lesson_filter` additionally attaches that lesson's
    /// record per student.
    pub async fn course_summary(
        &self,
        actor: Actor,
        course: CourseId,
        student_filter: Option<StudentId>,
        lesson_filter: Option<&LessonRef>,
    ) -> PortResult<CourseSummary> {
        if actor.is_guest() {
            return Err(PortError::Unauthorized);
        }

        let outline = self.catalog.outline(course).await?;
        let lesson_count = outline.lesson_count();
        let filter_lesson: Option<LessonId> = match lesson_filter {
            Some(r) => Some(ordering::resolve(&outline, r)?.lesson),
            None => None,
        };

        let mut by_student: HashMap<StudentId, Vec<LessonActivity>> = HashMap::new();
        for activity in self.store.activities_for_course(course).await? {
            by_student.entry(activity.student).or_default().push(activity);
        }

        let mut roster: Vec<(StudentId, Option<String>)> = match &self.enrollment {
            Some(dir) => dir
                .roster(course)
                .await?
                .into_iter()
                .map(|e| (e.student, e.student_name))
                .collect(),
            None => Vec::new(),
        };
        if roster.is_empty() {
            roster = by_student.keys().map(|s| (*s, None)).collect();
            roster.sort_by_key(|(s, _)| *s);
        }
        if let Some(only) = student_filter {
            roster.retain(|(s, _)| *s == only);
        }

        let mut students = Vec::with_capacity(roster.len());
        for (student, student_name) in roster {
            let mut details = by_student.remove(&student).unwrap_or_default();
            sort_most_recent_first(&mut details);

            let completed_lessons = details.iter().filter(|a| a.is_completed).count();
            let completion_date = if lesson_count > 0 && completed_lessons == lesson_count {
                details.iter().filter_map(|a| a.completion_date).max()
            } else {
                None
            };
            let specific_lesson =
                filter_lesson.and_then(|l| details.iter().find(|a| a.lesson == l).cloned());

            students.push(StudentSummary {
                student,
                student_name,
                completed_lessons,
                overall_progress: overall_progress(completed_lessons, lesson_count),
                completion_date,
                lesson_details: details,
                specific_lesson,
            });
        }

        Ok(CourseSummary {
            total_students: students.len(),
            lesson_count,
            students,
        })
    }

    /// Overall progress for one student across several courses at once.
    ///
    /// One batched activity scan plus one batched lesson-count lookup;
    /// unknown courses are omitted from the result. Guests get an empty map
    /// rather than an error so course listings can render for them.
    pub async fn bulk_progress(
        &self,
        actor: Actor,
        courses: &[CourseId],
    ) -> PortResult<HashMap<CourseId, f64>> {
        let student = match actor.student_id() {
            Some(id) => id,
            None => return Ok(HashMap::new()),
        };

        let lesson_counts = self.catalog.lesson_counts(courses).await?;
        let activities = self
            .store
            .activities_for_student_in_courses(student, courses)
            .await?;

        let mut completed: HashMap<CourseId, usize> = HashMap::new();
        for activity in &activities {
            if activity.is_completed {
                *completed.entry(activity.course).or_default() += 1;
            }
        }

        Ok(lesson_counts
            .into_iter()
            .map(|(course, count)| {
                let done = completed.get(&course).copied().unwrap_or(0);
                (course, overall_progress(done, count))
            })
            .collect())
    }

    /// Filtered activity listing for reporting, enriched with titles from
    /// the catalog. Records whose course has vanished from the catalog keep
    /// `None` titles instead of failing the whole listing.
    pub async fn list_activity(
        &self,
        actor: Actor,
        filter: ActivityFilter,
    ) -> PortResult<Vec<ActivityView>> {
        if actor.is_guest() {
            return Err(PortError::Unauthorized);
        }

        let activities = self.store.list_activities(filter).await?;

        let mut outlines = HashMap::new();
        for activity in &activities {
            if outlines.contains_key(&activity.course) {
                continue;
            }
            let outline = match self.catalog.outline(activity.course).await {
                Ok(o) => Some(o),
                Err(PortError::NotFound(_)) => None,
                Err(e) => return Err(e),
            };
            outlines.insert(activity.course, outline);
        }

        Ok(activities
            .into_iter()
            .map(|activity| {
                let outline = outlines.get(&activity.course).and_then(|o| o.as_ref());
                ActivityView {
                    course_title: outline.map(|o| o.title.clone()),
                    lesson_title: outline
                        .and_then(|o| o.entry_for(activity.lesson))
                        .map(|e| e.title.clone()),
                    activity,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn record(speed: Option<&str>, at_secs: i64) -> LessonActivity {
        let mut r = LessonActivity::new(
            StudentId(Uuid::new_v4()),
            CourseId(Uuid::new_v4()),
            LessonId(Uuid::new_v4()),
        );
        r.video_speed = speed.map(str::to_string);
        r.last_watched_timestamp = Some(Utc.timestamp_opt(1_700_000_000 + at_secs, 0).unwrap());
        r
    }

    #[test]
    fn representative_speed_takes_first_present_value() {
        let details = vec![record(None, 3), record(Some("1.5x"), 2), record(Some("2x"), 1)];
        assert_eq!(representative_speed(&details), Some("1.5x"));
        assert_eq!(representative_speed(&[]), None);
        assert_eq!(representative_speed(&[record(None, 0)]), None);
    }

    #[test]
    fn overall_progress_handles_empty_courses() {
        assert_eq!(overall_progress(3, 4), 75.0);
        assert_eq!(overall_progress(0, 0), 0.0);
        assert_eq!(overall_progress(4, 4), 100.0);
    }

    #[test]
    fn details_sort_most_recent_first() {
        let mut details = vec![record(None, 1), record(None, 5), record(None, 3)];
        let newest = details[1].last_watched_timestamp;
        sort_most_recent_first(&mut details);
        assert_eq!(details[0].last_watched_timestamp, newest);
    }
}
