pub mod domain;
pub mod engine;
pub mod ordering;
pub mod ports;
pub mod reports;

pub use domain::{
    Actor, CompletionPolicy, CourseEnrollment, CourseId, CourseOutline, EventKind, LessonActivity,
    LessonId, OutlineEntry, QuizEvent, StudentId, WatchEvent,
};
pub use engine::{AccessDecision, LessonLockStatus, ProgressEngine, QuizOutcome, WatchOutcome};
pub use ordering::LessonRef;
pub use ports::{
    ActivityFilter, ActivityStore, CourseCatalog, EnrollmentDirectory, PortError, PortResult,
};
pub use reports::{representative_speed, ActivityView, CourseSummary, StudentSummary};
