//! Shared fixtures for the engine integration tests: an engine wired to the
//! in-memory adapters, with a freshly-seeded course outline.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use api_lib::adapters::{MemoryCatalog, MemoryEnrollment, MemoryStore};
use lms_progress_core::{
    Actor, CompletionPolicy, CourseId, CourseOutline, EventKind, LessonId, OutlineEntry,
    ProgressEngine, StudentId, WatchEvent,
};
use std::sync::Arc;
use uuid::Uuid;

pub struct Fixture {
    pub engine: ProgressEngine,
    pub store: Arc<MemoryStore>,
    pub catalog: Arc<MemoryCatalog>,
    pub enrollment: Arc<MemoryEnrollment>,
    pub course: CourseId,
    pub lessons: Vec<LessonId>,
}

/// An engine over empty in-memory adapters plus one single-chapter course
/// with `lesson_count` lessons.
pub fn fixture(lesson_count: usize) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let catalog = Arc::new(MemoryCatalog::new());
    let enrollment = Arc::new(MemoryEnrollment::new());

    let course = CourseId(Uuid::new_v4());
    let lessons: Vec<LessonId> = (0..lesson_count).map(|_| LessonId(Uuid::new_v4())).collect();
    catalog.insert(outline(course, "Test Course", &lessons));

    let engine = ProgressEngine::new(
        store.clone(),
        catalog.clone(),
        Some(enrollment.clone()),
        CompletionPolicy::default(),
    );

    Fixture {
        engine,
        store,
        catalog,
        enrollment,
        course,
        lessons,
    }
}

pub fn outline(course: CourseId, title: &str, lessons: &[LessonId]) -> CourseOutline {
    let entries = lessons
        .iter()
        .enumerate()
        .map(|(i, lesson)| OutlineEntry {
            lesson: *lesson,
            title: format!("Lesson {}", i + 1),
            order_index: (i + 1) as i32,
            chapter: 1,
            position_in_chapter: (i + 1) as u32,
        })
        .collect();
    CourseOutline::new(course, title, entries)
}

pub fn student() -> Actor {
    Actor::Student(StudentId(Uuid::new_v4()))
}

pub fn watch(watched: f64, total: f64, kind: EventKind) -> WatchEvent {
    WatchEvent {
        speed: "1x".to_string(),
        watched_seconds: watched,
        total_duration_seconds: total,
        kind,
    }
}

pub fn tick(watched: f64, total: f64) -> WatchEvent {
    watch(watched, total, EventKind::Tick)
}
