//! Engine-level tests for the access policy and the read-side aggregates:
//! sequential gating, guest denial, lock maps, course summaries, and bulk
//! progress.

mod common;

use common::{fixture, student, tick};
use lms_progress_core::{
    Actor, ActivityFilter, CourseId, CourseOutline, LessonId, LessonRef, OutlineEntry, PortError,
    StudentId,
};
use uuid::Uuid;

async fn complete_lesson(fx: &common::Fixture, actor: Actor, lesson: LessonId) {
    fx.engine
        .submit_watch_event(actor, fx.course, &LessonRef::Id(lesson), tick(100.0, 100.0))
        .await
        .unwrap();
}

//=========================================================================================
// Sequential gating
//=========================================================================================

#[tokio::test]
async fn lessons_unlock_one_at_a_time() {
    let fx = fixture(3);
    let actor = student();
    let refs: Vec<LessonRef> = fx.lessons.iter().map(|l| LessonRef::Id(*l)).collect();

    // No activity yet: only the first lesson is open.
    let d1 = fx.engine.can_access(actor, fx.course, &refs[0]).await.unwrap();
    assert!(d1.can_access);
    let d2 = fx.engine.can_access(actor, fx.course, &refs[1]).await.unwrap();
    assert!(!d2.can_access);
    assert_eq!(d2.previous_lesson_title.as_deref(), Some("Lesson 1"));
    let d3 = fx.engine.can_access(actor, fx.course, &refs[2]).await.unwrap();
    assert!(!d3.can_access);
    assert_eq!(d3.previous_lesson_title.as_deref(), Some("Lesson 2"));

    // Completing lesson 1 opens lesson 2 but not lesson 3.
    complete_lesson(&fx, actor, fx.lessons[0]).await;
    assert!(fx.engine.can_access(actor, fx.course, &refs[1]).await.unwrap().can_access);
    assert!(!fx.engine.can_access(actor, fx.course, &refs[2]).await.unwrap().can_access);

    // Completing lesson 2 opens lesson 3.
    complete_lesson(&fx, actor, fx.lessons[1]).await;
    assert!(fx.engine.can_access(actor, fx.course, &refs[2]).await.unwrap().can_access);
}

#[tokio::test]
async fn partial_progress_does_not_unlock_the_next_lesson() {
    let fx = fixture(2);
    let actor = student();

    fx.engine
        .submit_watch_event(actor, fx.course, &LessonRef::Id(fx.lessons[0]), tick(50.0, 100.0))
        .await
        .unwrap();

    let decision = fx
        .engine
        .can_access(actor, fx.course, &LessonRef::Id(fx.lessons[1]))
        .await
        .unwrap();
    assert!(!decision.can_access);
    assert_eq!(decision.previous_lesson_title.as_deref(), Some("Lesson 1"));
}

#[tokio::test]
async fn guests_are_always_denied_with_a_sign_in_reason() {
    let fx = fixture(2);

    for lesson in &fx.lessons {
        let decision = fx
            .engine
            .can_access(Actor::Guest, fx.course, &LessonRef::Id(*lesson))
            .await
            .unwrap();
        assert!(!decision.can_access);
        assert!(decision.reason.contains("sign in"));
        assert!(decision.previous_lesson_title.is_none());
    }
}

#[tokio::test]
async fn unknown_lesson_is_not_found_even_for_guests() {
    let fx = fixture(1);
    let err = fx
        .engine
        .can_access(Actor::Guest, fx.course, &LessonRef::Id(LessonId(Uuid::new_v4())))
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::NotFound(_)));
}

#[tokio::test]
async fn duplicated_order_index_fails_closed() {
    let fx = fixture(0);
    let actor = student();

    // Seed a broken outline: two lessons share an order_index.
    let l1 = LessonId(Uuid::new_v4());
    let l2 = LessonId(Uuid::new_v4());
    let entries = vec![
        OutlineEntry {
            lesson: l1,
            title: "A".to_string(),
            order_index: 1,
            chapter: 1,
            position_in_chapter: 1,
        },
        OutlineEntry {
            lesson: l2,
            title: "B".to_string(),
            order_index: 1,
            chapter: 1,
            position_in_chapter: 2,
        },
    ];
    fx.catalog.insert(CourseOutline::new(fx.course, "Broken", entries));

    let decision = fx
        .engine
        .can_access(actor, fx.course, &LessonRef::Id(l2))
        .await
        .unwrap();
    assert!(!decision.can_access);
    assert!(decision.previous_lesson_title.is_none());
}

#[tokio::test]
async fn lock_status_reports_the_whole_course_in_order() {
    let fx = fixture(3);
    let actor = student();
    complete_lesson(&fx, actor, fx.lessons[0]).await;

    let statuses = fx.engine.lock_status(actor, fx.course).await.unwrap();
    assert_eq!(statuses.len(), 3);

    assert!(statuses[0].can_access);
    assert!(statuses[0].is_completed);
    assert!(statuses[1].can_access);
    assert!(!statuses[1].is_completed);
    assert!(!statuses[2].can_access);

    let titles: Vec<&str> = statuses.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["Lesson 1", "Lesson 2", "Lesson 3"]);
}

#[tokio::test]
async fn lock_status_requires_a_signed_in_actor() {
    let fx = fixture(1);
    let err = fx.engine.lock_status(Actor::Guest, fx.course).await.unwrap_err();
    assert!(matches!(err, PortError::Unauthorized));
}

//=========================================================================================
// Course summaries
//=========================================================================================

#[tokio::test]
async fn summary_counts_completed_lessons_and_overall_progress() {
    let fx = fixture(4);
    let actor = student();
    for lesson in &fx.lessons[..3] {
        complete_lesson(&fx, actor, *lesson).await;
    }

    let summary = fx
        .engine
        .course_summary(student(), fx.course, None, None)
        .await
        .unwrap();
    assert_eq!(summary.lesson_count, 4);
    assert_eq!(summary.total_students, 1);

    let row = &summary.students[0];
    assert_eq!(row.student, actor.student_id().unwrap());
    assert_eq!(row.completed_lessons, 3);
    assert_eq!(row.overall_progress, 75.0);
    assert!(row.completion_date.is_none());
}

#[tokio::test]
async fn course_completion_date_is_the_last_lesson_completion() {
    let fx = fixture(2);
    let actor = student();
    for lesson in &fx.lessons {
        complete_lesson(&fx, actor, *lesson).await;
    }

    let summary = fx
        .engine
        .course_summary(student(), fx.course, None, None)
        .await
        .unwrap();
    let row = &summary.students[0];
    assert_eq!(row.completed_lessons, 2);
    assert_eq!(row.overall_progress, 100.0);

    let latest = row
        .lesson_details
        .iter()
        .filter_map(|d| d.completion_date)
        .max();
    assert_eq!(row.completion_date, latest);
    assert!(row.completion_date.is_some());
}

#[tokio::test]
async fn summary_orders_details_by_most_recent_activity() {
    let fx = fixture(3);
    let actor = student();

    for lesson in &fx.lessons {
        fx.engine
            .submit_watch_event(actor, fx.course, &LessonRef::Id(*lesson), tick(10.0, 100.0))
            .await
            .unwrap();
    }

    let summary = fx
        .engine
        .course_summary(student(), fx.course, None, None)
        .await
        .unwrap();
    let details = &summary.students[0].lesson_details;
    assert_eq!(details[0].lesson, fx.lessons[2]);
    assert_eq!(details[2].lesson, fx.lessons[0]);
}

#[tokio::test]
async fn summary_uses_the_enrollment_roster_when_present() {
    let fx = fixture(2);
    let active = student();
    let inactive = StudentId(Uuid::new_v4());
    fx.enrollment.enroll(fx.course, active.student_id().unwrap(), Some("Ali"));
    fx.enrollment.enroll(fx.course, inactive, Some("Vali"));

    complete_lesson(&fx, active, fx.lessons[0]).await;

    let summary = fx
        .engine
        .course_summary(student(), fx.course, None, None)
        .await
        .unwrap();
    assert_eq!(summary.total_students, 2);

    let idle_row = summary.students.iter().find(|s| s.student == inactive).unwrap();
    assert_eq!(idle_row.completed_lessons, 0);
    assert_eq!(idle_row.overall_progress, 0.0);
    assert!(idle_row.lesson_details.is_empty());
    assert_eq!(idle_row.student_name.as_deref(), Some("Vali"));
}

#[tokio::test]
async fn summary_falls_back_to_students_with_activity() {
    let fx = fixture(2);
    let actor = student();
    complete_lesson(&fx, actor, fx.lessons[0]).await;

    // No roster seeded: the active student is still reported.
    let summary = fx
        .engine
        .course_summary(student(), fx.course, None, None)
        .await
        .unwrap();
    assert_eq!(summary.total_students, 1);
    assert_eq!(summary.students[0].student, actor.student_id().unwrap());
}

#[tokio::test]
async fn summary_lesson_filter_attaches_the_specific_lesson() {
    let fx = fixture(3);
    let actor = student();
    complete_lesson(&fx, actor, fx.lessons[1]).await;

    let summary = fx
        .engine
        .course_summary(
            student(),
            fx.course,
            None,
            Some(&"1-2".parse::<LessonRef>().unwrap()),
        )
        .await
        .unwrap();

    let row = &summary.students[0];
    let specific = row.specific_lesson.as_ref().unwrap();
    assert_eq!(specific.lesson, fx.lessons[1]);
    assert_eq!(specific.completion_percentage, 100.0);
    assert!(specific.is_completed);

    // The two aggregates stay distinct: one lesson out of three completed.
    let expected = 100.0 / 3.0;
    assert!((row.overall_progress - expected).abs() < 1e-9);
}

#[tokio::test]
async fn summary_is_gated_for_guests() {
    let fx = fixture(1);
    let err = fx
        .engine
        .course_summary(Actor::Guest, fx.course, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::Unauthorized));
}

//=========================================================================================
// Bulk progress and activity listing
//=========================================================================================

#[tokio::test]
async fn bulk_progress_agrees_with_the_course_summary() {
    let fx = fixture(4);
    let actor = student();
    let sid = actor.student_id().unwrap();

    // Second course with two lessons, one completed.
    let course_b = CourseId(Uuid::new_v4());
    let lessons_b = vec![LessonId(Uuid::new_v4()), LessonId(Uuid::new_v4())];
    fx.catalog.insert(common::outline(course_b, "Course B", &lessons_b));

    for lesson in &fx.lessons[..3] {
        complete_lesson(&fx, actor, *lesson).await;
    }
    fx.engine
        .submit_watch_event(actor, course_b, &LessonRef::Id(lessons_b[0]), tick(100.0, 100.0))
        .await
        .unwrap();

    let bulk = fx
        .engine
        .bulk_progress(actor, &[fx.course, course_b])
        .await
        .unwrap();
    assert_eq!(bulk[&fx.course], 75.0);
    assert_eq!(bulk[&course_b], 50.0);

    let summary = fx
        .engine
        .course_summary(actor, fx.course, Some(sid), None)
        .await
        .unwrap();
    assert_eq!(summary.students[0].overall_progress, bulk[&fx.course]);
}

#[tokio::test]
async fn bulk_progress_for_guests_is_empty() {
    let fx = fixture(2);
    let bulk = fx.engine.bulk_progress(Actor::Guest, &[fx.course]).await.unwrap();
    assert!(bulk.is_empty());
}

#[tokio::test]
async fn activity_listing_filters_and_carries_titles() {
    let fx = fixture(2);
    let actor = student();
    let other = student();

    complete_lesson(&fx, actor, fx.lessons[0]).await;
    complete_lesson(&fx, other, fx.lessons[0]).await;

    let all = fx
        .engine
        .list_activity(student(), ActivityFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].course_title.as_deref(), Some("Test Course"));
    assert_eq!(all[0].lesson_title.as_deref(), Some("Lesson 1"));

    let filter = ActivityFilter {
        student: actor.student_id(),
        ..Default::default()
    };
    let mine = fx.engine.list_activity(student(), filter).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].activity.student, actor.student_id().unwrap());
}

#[tokio::test]
async fn activity_listing_is_gated_for_guests() {
    let fx = fixture(1);
    let err = fx
        .engine
        .list_activity(Actor::Guest, ActivityFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::Unauthorized));
}
