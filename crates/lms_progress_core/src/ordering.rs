//! crates/lms_progress_core/src/ordering.rs
//!
//! Resolves lesson references against a course outline. A reference is
//! either a lesson id or a positional token like "1-2" / "1.2" taken from
//! learn-page URLs (chapter number, then 1-based position within the
//! chapter).

use std::str::FromStr;

use uuid::Uuid;

use crate::domain::{CourseOutline, LessonId, OutlineEntry};
use crate::ports::{PortError, PortResult};

/// A client-supplied reference to a lesson within a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LessonRef {
    Id(LessonId),
    Number { chapter: u32, position: u32 },
}

impl FromStr for LessonRef {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(id) = Uuid::parse_str(s) {
            return Ok(LessonRef::Id(LessonId(id)));
        }
        parse_number_token(s)
            .map(|(chapter, position)| LessonRef::Number { chapter, position })
            .ok_or_else(|| {
                PortError::InvalidInput(format!(
                    "'{s}' is neither a lesson id nor a positional token like '1-2'"
                ))
            })
    }
}

fn parse_number_token(s: &str) -> Option<(u32, u32)> {
    let (major, minor) = s.split_once(['-', '.'])?;
    let chapter: u32 = major.parse().ok()?;
    let position: u32 = minor.parse().ok()?;
    if chapter == 0 || position == 0 {
        return None;
    }
    Some((chapter, position))
}

/// Resolves a reference to an outline entry.
///
/// Fails with `NotFound` when the id is not part of the course, the course
/// has no lessons, or the position points past the end of its chapter.
pub fn resolve<'a>(outline: &'a CourseOutline, lesson_ref: &LessonRef) -> PortResult<&'a OutlineEntry> {
    if outline.lesson_count() == 0 {
        return Err(PortError::NotFound(format!(
            "Course {} has no lessons",
            outline.course.0
        )));
    }

    match lesson_ref {
        LessonRef::Id(id) => outline.entry_for(*id).ok_or_else(|| {
            PortError::NotFound(format!(
                "Lesson {} is not part of course {}",
                id.0, outline.course.0
            ))
        }),
        LessonRef::Number { chapter, position } => outline
            .lessons()
            .iter()
            .find(|l| l.chapter == *chapter && l.position_in_chapter == *position)
            .ok_or_else(|| {
                PortError::NotFound(format!(
                    "No lesson {chapter}-{position} in course {}",
                    outline.course.0
                ))
            }),
    }
}
