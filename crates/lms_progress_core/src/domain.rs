//! crates/lms_progress_core/src/domain.rs
//!
//! Defines the pure, core data structures for the progress engine.
//! These structs are independent of any database or serialization format,
//! and all merge/monotonicity rules for progress records live here.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::ports::{PortError, PortResult};

//=========================================================================================
// Identifiers and Actors
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StudentId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CourseId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LessonId(pub Uuid);

/// The identity the surrounding system authenticated for a request.
///
/// A `Guest` never owns progress records: writes are rejected outright and
/// gated reads are denied with a sign-in reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Student(StudentId),
    Guest,
}

impl Actor {
    pub fn student_id(&self) -> Option<StudentId> {
        match self {
            Actor::Student(id) => Some(*id),
            Actor::Guest => None,
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Actor::Guest)
    }
}

//=========================================================================================
// Course Outline
//=========================================================================================

/// One lesson's place within a course.
#[derive(Debug, Clone)]
pub struct OutlineEntry {
    pub lesson: LessonId,
    pub title: String,
    /// Total order within the course. Unique per course; gaps are allowed.
    pub order_index: i32,
    /// Chapter number and 1-based position within the chapter. Together these
    /// back positional tokens like "2-1".
    pub chapter: u32,
    pub position_in_chapter: u32,
}

/// The ordered lesson sequence of a course, as currently authored.
///
/// The engine only ever reads the outline; reordering is the course-authoring
/// system's concern.
#[derive(Debug, Clone)]
pub struct CourseOutline {
    pub course: CourseId,
    pub title: String,
    lessons: Vec<OutlineEntry>,
}

impl CourseOutline {
    /// Builds an outline, sorting entries by `order_index`.
    pub fn new(course: CourseId, title: impl Into<String>, mut lessons: Vec<OutlineEntry>) -> Self {
        lessons.sort_by_key(|l| l.order_index);
        Self {
            course,
            title: title.into(),
            lessons,
        }
    }

    pub fn lessons(&self) -> &[OutlineEntry] {
        &self.lessons
    }

    pub fn lesson_count(&self) -> usize {
        self.lessons.len()
    }

    pub fn entry_for(&self, lesson: LessonId) -> Option<&OutlineEntry> {
        self.lessons.iter().find(|l| l.lesson == lesson)
    }

    /// The entry immediately preceding `entry` in the total order, if any.
    pub fn previous_of(&self, entry: &OutlineEntry) -> Option<&OutlineEntry> {
        self.lessons
            .iter()
            .filter(|l| l.order_index < entry.order_index)
            .max_by_key(|l| l.order_index)
    }

    /// True if two lessons share an `order_index`. This violates the catalog's
    /// own invariant; the access evaluator fails closed when it sees it.
    pub fn has_ambiguous_ordering(&self) -> bool {
        self.lessons
            .windows(2)
            .any(|w| w[0].order_index == w[1].order_index)
    }
}

/// A roster entry supplied by the (optional) enrollment collaborator.
#[derive(Debug, Clone)]
pub struct CourseEnrollment {
    pub student: StudentId,
    pub student_name: Option<String>,
}

//=========================================================================================
// Events
//=========================================================================================

/// What kind of playback event the client reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Tick,
    Pause,
    Ended,
}

/// A single playback report from the client.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub speed: String,
    pub watched_seconds: f64,
    pub total_duration_seconds: f64,
    pub kind: EventKind,
}

impl WatchEvent {
    /// Rejects events the merge rules cannot safely absorb. A zero total
    /// duration is allowed (the player may not know it yet); NaN or negative
    /// numbers are not.
    pub fn validate(&self) -> PortResult<()> {
        if !self.watched_seconds.is_finite() || self.watched_seconds < 0.0 {
            return Err(PortError::InvalidInput(format!(
                "watched_seconds must be a non-negative number, got {}",
                self.watched_seconds
            )));
        }
        if !self.total_duration_seconds.is_finite() || self.total_duration_seconds < 0.0 {
            return Err(PortError::InvalidInput(format!(
                "total_duration_seconds must be a non-negative number, got {}",
                self.total_duration_seconds
            )));
        }
        Ok(())
    }
}

/// A single quiz submission result.
#[derive(Debug, Clone)]
pub struct QuizEvent {
    pub score_percentage: f64,
}

impl QuizEvent {
    pub fn validate(&self) -> PortResult<()> {
        if !self.score_percentage.is_finite()
            || self.score_percentage < 0.0
            || self.score_percentage > 100.0
        {
            return Err(PortError::InvalidInput(format!(
                "score_percentage must be between 0 and 100, got {}",
                self.score_percentage
            )));
        }
        Ok(())
    }
}

//=========================================================================================
// Completion Policy
//=========================================================================================

/// Configuration constants for when a lesson or quiz counts as done.
#[derive(Debug, Clone, Copy)]
pub struct CompletionPolicy {
    /// Watch percentage at which a lesson counts as completed.
    pub completion_threshold: f64,
    /// Quiz percentage at which `quiz_passed_at_attempt` is stamped.
    pub quiz_pass_threshold: f64,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self {
            completion_threshold: 95.0,
            quiz_pass_threshold: 100.0,
        }
    }
}

//=========================================================================================
// LessonActivity
//=========================================================================================

/// The per-(student, lesson) progress record. At most one exists per pair;
/// it is created lazily on the first accepted event and never deleted here.
#[derive(Debug, Clone)]
pub struct LessonActivity {
    pub student: StudentId,
    pub course: CourseId,
    pub lesson: LessonId,
    /// Monotonically non-decreasing across merges.
    pub watched_seconds: f64,
    /// Last known positive value; zero means "not reported yet".
    pub total_duration_seconds: f64,
    /// Always recomputed from the two fields above, clamped to [0, 100].
    pub completion_percentage: f64,
    /// Sticky: once true, never reverts.
    pub is_completed: bool,
    /// Stamped exactly once, the first instant `is_completed` became true.
    pub completion_date: Option<DateTime<Utc>>,
    pub last_watched_timestamp: Option<DateTime<Utc>>,
    /// Last reported playback-rate label, e.g. "1.5x". Last write wins.
    pub video_speed: Option<String>,
    pub quiz_attempts: u32,
    pub quiz_best_score: f64,
    /// First attempt index at which a passing score was reached.
    pub quiz_passed_at_attempt: Option<u32>,
}

impl LessonActivity {
    /// A fresh, empty record for a (student, lesson) pair.
    pub fn new(student: StudentId, course: CourseId, lesson: LessonId) -> Self {
        Self {
            student,
            course,
            lesson,
            watched_seconds: 0.0,
            total_duration_seconds: 0.0,
            completion_percentage: 0.0,
            is_completed: false,
            completion_date: None,
            last_watched_timestamp: None,
            video_speed: None,
            quiz_attempts: 0,
            quiz_best_score: 0.0,
            quiz_passed_at_attempt: None,
        }
    }

    /// Folds a playback event into the record.
    ///
    /// This is the one place the merge rules are defined; storage adapters
    /// call it inside their atomic read-modify-write envelope. Events with
    /// smaller `watched_seconds` than already recorded (replays, network
    /// reordering, backward seeks) are absorbed by the max-merge without
    /// regressing any monotonic or sticky field.
    pub fn apply_watch(&mut self, event: &WatchEvent, policy: &CompletionPolicy, now: DateTime<Utc>) {
        if event.watched_seconds > self.watched_seconds {
            self.watched_seconds = event.watched_seconds;
        }
        if event.total_duration_seconds > 0.0 {
            self.total_duration_seconds = event.total_duration_seconds;
        }
        self.completion_percentage = completion_percentage(self.watched_seconds, self.total_duration_seconds);

        let crossed = self.completion_percentage >= policy.completion_threshold;
        if (crossed || event.kind == EventKind::Ended) && !self.is_completed {
            self.is_completed = true;
            self.completion_date = Some(now);
        }

        self.last_watched_timestamp = Some(now);
        self.video_speed = Some(event.speed.clone());
    }

    /// Folds a quiz submission into the record. Attempts only ever grow, the
    /// best score is a max-merge, and the passing attempt index is stamped
    /// exactly once.
    pub fn apply_quiz(&mut self, event: &QuizEvent, policy: &CompletionPolicy, now: DateTime<Utc>) {
        self.quiz_attempts += 1;
        if event.score_percentage > self.quiz_best_score {
            self.quiz_best_score = event.score_percentage;
        }
        if event.score_percentage >= policy.quiz_pass_threshold && self.quiz_passed_at_attempt.is_none() {
            self.quiz_passed_at_attempt = Some(self.quiz_attempts);
        }
        self.last_watched_timestamp = Some(now);
    }
}

/// completion = clamp(watched / total * 100, 0, 100); zero/unknown total
/// pins the percentage at 0.
pub fn completion_percentage(watched_seconds: f64, total_duration_seconds: f64) -> f64 {
    if total_duration_seconds <= 0.0 {
        return 0.0;
    }
    (watched_seconds / total_duration_seconds * 100.0).clamp(0.0, 100.0)
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ids() -> (StudentId, CourseId, LessonId) {
        (
            StudentId(Uuid::new_v4()),
            CourseId(Uuid::new_v4()),
            LessonId(Uuid::new_v4()),
        )
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn watch(watched: f64, total: f64, kind: EventKind) -> WatchEvent {
        WatchEvent {
            speed: "1x".to_string(),
            watched_seconds: watched,
            total_duration_seconds: total,
            kind,
        }
    }

    #[test]
    fn watched_seconds_is_max_merged() {
        let (s, c, l) = ids();
        let policy = CompletionPolicy::default();
        let mut rec = LessonActivity::new(s, c, l);

        rec.apply_watch(&watch(40.0, 100.0, EventKind::Tick), &policy, at(0));
        rec.apply_watch(&watch(25.0, 100.0, EventKind::Tick), &policy, at(1));

        assert_eq!(rec.watched_seconds, 40.0);
        assert_eq!(rec.completion_percentage, 40.0);
    }

    #[test]
    fn zero_total_duration_keeps_percentage_at_zero() {
        let (s, c, l) = ids();
        let policy = CompletionPolicy::default();
        let mut rec = LessonActivity::new(s, c, l);

        rec.apply_watch(&watch(30.0, 0.0, EventKind::Tick), &policy, at(0));
        assert_eq!(rec.completion_percentage, 0.0);
        assert!(!rec.is_completed);

        // Duration arrives late; the stored watched_seconds now counts.
        rec.apply_watch(&watch(0.0, 60.0, EventKind::Tick), &policy, at(1));
        assert_eq!(rec.watched_seconds, 30.0);
        assert_eq!(rec.completion_percentage, 50.0);
    }

    #[test]
    fn zero_duration_is_not_accepted_over_a_known_one() {
        let (s, c, l) = ids();
        let policy = CompletionPolicy::default();
        let mut rec = LessonActivity::new(s, c, l);

        rec.apply_watch(&watch(30.0, 60.0, EventKind::Tick), &policy, at(0));
        rec.apply_watch(&watch(30.0, 0.0, EventKind::Tick), &policy, at(1));

        assert_eq!(rec.total_duration_seconds, 60.0);
        assert_eq!(rec.completion_percentage, 50.0);
    }

    #[test]
    fn completion_is_sticky_and_stamped_once() {
        let (s, c, l) = ids();
        let policy = CompletionPolicy::default();
        let mut rec = LessonActivity::new(s, c, l);

        rec.apply_watch(&watch(96.0, 100.0, EventKind::Tick), &policy, at(0));
        assert!(rec.is_completed);
        assert_eq!(rec.completion_date, Some(at(0)));

        // A later, smaller event must not clear or re-stamp anything.
        rec.apply_watch(&watch(10.0, 100.0, EventKind::Tick), &policy, at(5));
        assert!(rec.is_completed);
        assert_eq!(rec.completion_date, Some(at(0)));
        assert_eq!(rec.watched_seconds, 96.0);
    }

    #[test]
    fn ended_event_completes_regardless_of_percentage() {
        let (s, c, l) = ids();
        let policy = CompletionPolicy::default();
        let mut rec = LessonActivity::new(s, c, l);

        rec.apply_watch(&watch(10.0, 100.0, EventKind::Ended), &policy, at(0));
        assert!(rec.is_completed);
        assert_eq!(rec.completion_date, Some(at(0)));
    }

    #[test]
    fn replaying_the_same_event_changes_nothing() {
        let (s, c, l) = ids();
        let policy = CompletionPolicy::default();
        let mut rec = LessonActivity::new(s, c, l);

        let ev = watch(96.0, 100.0, EventKind::Pause);
        rec.apply_watch(&ev, &policy, at(3));
        let snapshot = rec.clone();
        rec.apply_watch(&ev, &policy, at(3));

        assert_eq!(rec.watched_seconds, snapshot.watched_seconds);
        assert_eq!(rec.completion_percentage, snapshot.completion_percentage);
        assert_eq!(rec.is_completed, snapshot.is_completed);
        assert_eq!(rec.completion_date, snapshot.completion_date);
        assert_eq!(rec.last_watched_timestamp, snapshot.last_watched_timestamp);
        assert_eq!(rec.video_speed, snapshot.video_speed);
    }

    #[test]
    fn video_speed_is_last_write_wins() {
        let (s, c, l) = ids();
        let policy = CompletionPolicy::default();
        let mut rec = LessonActivity::new(s, c, l);

        let mut ev = watch(10.0, 100.0, EventKind::Tick);
        ev.speed = "2x".to_string();
        rec.apply_watch(&ev, &policy, at(0));
        ev.speed = "1.5x".to_string();
        ev.watched_seconds = 5.0;
        rec.apply_watch(&ev, &policy, at(1));

        assert_eq!(rec.video_speed.as_deref(), Some("1.5x"));
    }

    #[test]
    fn percentage_is_clamped_to_100() {
        assert_eq!(completion_percentage(120.0, 100.0), 100.0);
        assert_eq!(completion_percentage(0.0, 100.0), 0.0);
        assert_eq!(completion_percentage(50.0, 0.0), 0.0);
    }

    #[test]
    fn quiz_counters_merge_monotonically() {
        let (s, c, l) = ids();
        let policy = CompletionPolicy::default();
        let mut rec = LessonActivity::new(s, c, l);

        rec.apply_quiz(&QuizEvent { score_percentage: 60.0 }, &policy, at(0));
        rec.apply_quiz(&QuizEvent { score_percentage: 100.0 }, &policy, at(1));
        rec.apply_quiz(&QuizEvent { score_percentage: 40.0 }, &policy, at(2));
        rec.apply_quiz(&QuizEvent { score_percentage: 100.0 }, &policy, at(3));

        assert_eq!(rec.quiz_attempts, 4);
        assert_eq!(rec.quiz_best_score, 100.0);
        // Stamped at the first passing attempt, never moved.
        assert_eq!(rec.quiz_passed_at_attempt, Some(2));
    }

    #[test]
    fn events_with_nan_or_negative_numbers_are_invalid() {
        assert!(watch(f64::NAN, 100.0, EventKind::Tick).validate().is_err());
        assert!(watch(-1.0, 100.0, EventKind::Tick).validate().is_err());
        assert!(watch(10.0, f64::NAN, EventKind::Tick).validate().is_err());
        assert!(watch(10.0, -5.0, EventKind::Tick).validate().is_err());
        assert!(watch(10.0, 0.0, EventKind::Tick).validate().is_ok());

        assert!(QuizEvent { score_percentage: f64::NAN }.validate().is_err());
        assert!(QuizEvent { score_percentage: 101.0 }.validate().is_err());
        assert!(QuizEvent { score_percentage: 70.0 }.validate().is_ok());
    }

    #[test]
    fn outline_sorts_by_order_index_and_detects_duplicates() {
        let course = CourseId(Uuid::new_v4());
        let mk = |idx: i32, chapter: u32, pos: u32| OutlineEntry {
            lesson: LessonId(Uuid::new_v4()),
            title: format!("Lesson {idx}"),
            order_index: idx,
            chapter,
            position_in_chapter: pos,
        };

        let outline = CourseOutline::new(course, "Course", vec![mk(30, 2, 1), mk(10, 1, 1), mk(20, 1, 2)]);
        let idxs: Vec<i32> = outline.lessons().iter().map(|l| l.order_index).collect();
        assert_eq!(idxs, vec![10, 20, 30]);
        assert!(!outline.has_ambiguous_ordering());

        let dup = CourseOutline::new(course, "Course", vec![mk(10, 1, 1), mk(10, 1, 2)]);
        assert!(dup.has_ambiguous_ordering());
    }

    #[test]
    fn previous_of_walks_the_total_order() {
        let course = CourseId(Uuid::new_v4());
        let mk = |idx: i32| OutlineEntry {
            lesson: LessonId(Uuid::new_v4()),
            title: format!("Lesson {idx}"),
            order_index: idx,
            chapter: 1,
            position_in_chapter: idx as u32,
        };
        let outline = CourseOutline::new(course, "Course", vec![mk(1), mk(5), mk(9)]);

        let first = &outline.lessons()[0];
        let mid = &outline.lessons()[1];
        assert!(outline.previous_of(first).is_none());
        assert_eq!(outline.previous_of(mid).unwrap().order_index, 1);
    }
}
