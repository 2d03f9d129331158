mod common;

use automation_core::common::PipelineError;
use automation_core::domains::email::models::{
    Audience, Cadence, ScheduleStatus, MAX_EVERY_SECONDS,
};
use automation_core::kernel::test_dependencies::{MockContactResolver, MockEmailSender};
use automation_core::kernel::DispatchSettings;
use automation_core::store::EmailStore;
use chrono::{Duration, Utc};
use common::{seed_catalog, TestHarness};
use serde_json::json;

fn resolver_with(emails: &[&str]) -> MockContactResolver {
    emails.iter().fold(MockContactResolver::new(), |r, email| {
        r.with_contact(email, json!({"first_name": "Ada"}))
    })
}

fn emails(list: &[&str]) -> Audience {
    Audience::Emails(list.iter().map(|e| e.to_string()).collect())
}

#[tokio::test]
async fn recurring_schedule_first_fires_one_cadence_after_creation() {
    let harness = TestHarness::new();
    let engine = harness.engine();
    let (category, template) = seed_catalog(&harness).await.unwrap();

    let now = Utc::now();
    let schedule = engine
        .create_schedule(
            category.id,
            template.id,
            emails(&["ada@example.com"]),
            Cadence::Every { seconds: 3600 },
            now,
        )
        .await
        .unwrap();
    assert_eq!(schedule.status, ScheduleStatus::Active);
    assert_eq!(schedule.next_run_at, Some(now + Duration::hours(1)));
    assert!(schedule.last_run_at.is_none());

    // not due one second before the window, due exactly at it
    let due = engine
        .due_schedules(now + Duration::hours(1) - Duration::seconds(1))
        .await
        .unwrap();
    assert!(due.is_empty());
    let due = engine.due_schedules(now + Duration::hours(1)).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, schedule.id);
}

#[tokio::test]
async fn one_shot_schedule_is_due_at_its_fire_time() {
    let harness = TestHarness::new();
    let engine = harness.engine();
    let (category, template) = seed_catalog(&harness).await.unwrap();

    let at = Utc::now() + Duration::days(1);
    let schedule = engine
        .create_schedule(
            category.id,
            template.id,
            emails(&["ada@example.com"]),
            Cadence::OneShot { at },
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(schedule.next_run_at, Some(at));
}

#[tokio::test]
async fn creation_validates_linkage_and_inputs() {
    let harness = TestHarness::new();
    let engine = harness.engine();
    let catalog = harness.catalog();
    let (category, template) = seed_catalog(&harness).await.unwrap();
    let other = catalog.create_category("Other", None).await.unwrap();
    let now = Utc::now();

    // template from a different category
    let err = engine
        .create_schedule(
            other.id,
            template.id,
            emails(&["ada@example.com"]),
            Cadence::Every { seconds: 60 },
            now,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));

    // empty recipient list
    let err = engine
        .create_schedule(
            category.id,
            template.id,
            Audience::Emails(vec![]),
            Cadence::Every { seconds: 60 },
            now,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));

    // non-positive cadence
    let err = engine
        .create_schedule(
            category.id,
            template.id,
            emails(&["ada@example.com"]),
            Cadence::Every { seconds: 0 },
            now,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));

    // absurdly large cadence is rejected instead of overflowing the
    // interval arithmetic
    let err = engine
        .create_schedule(
            category.id,
            template.id,
            emails(&["ada@example.com"]),
            Cadence::Every { seconds: i64::MAX },
            now,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));

    // the ceiling itself is accepted
    engine
        .create_schedule(
            category.id,
            template.id,
            emails(&["ada@example.com"]),
            Cadence::Every {
                seconds: MAX_EVERY_SECONDS,
            },
            now,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn lifecycle_transitions_are_strict() {
    let harness = TestHarness::new();
    let engine = harness.engine();
    let (category, template) = seed_catalog(&harness).await.unwrap();

    let schedule = engine
        .create_schedule(
            category.id,
            template.id,
            emails(&["ada@example.com"]),
            Cadence::Every { seconds: 60 },
            Utc::now(),
        )
        .await
        .unwrap();

    // resume requires paused
    assert!(engine.resume(schedule.id).await.is_err());

    let paused = engine.pause(schedule.id).await.unwrap();
    assert_eq!(paused.status, ScheduleStatus::Paused);
    // pause requires active
    assert!(engine.pause(schedule.id).await.is_err());

    let resumed = engine.resume(schedule.id).await.unwrap();
    assert_eq!(resumed.status, ScheduleStatus::Active);

    let disabled = engine.disable(schedule.id).await.unwrap();
    assert_eq!(disabled.status, ScheduleStatus::Disabled);

    // disabled is terminal
    assert!(engine.pause(schedule.id).await.is_err());
    assert!(engine.resume(schedule.id).await.is_err());
    assert!(engine.disable(schedule.id).await.is_err());
}

#[tokio::test]
async fn fire_before_the_window_is_rejected() {
    let harness = TestHarness::new();
    let engine = harness.engine();
    let (category, template) = seed_catalog(&harness).await.unwrap();

    let now = Utc::now();
    let schedule = engine
        .create_schedule(
            category.id,
            template.id,
            emails(&["ada@example.com"]),
            Cadence::Every { seconds: 3600 },
            now,
        )
        .await
        .unwrap();

    let err = engine.fire(schedule.id, now).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
}

#[tokio::test]
async fn fire_dispatches_and_advances_the_schedule() {
    let recipients = ["ada@example.com", "grace@example.com"];
    let harness =
        TestHarness::with_mocks(resolver_with(&recipients), MockEmailSender::new());
    let engine = harness.engine();
    let (category, template) = seed_catalog(&harness).await.unwrap();

    let now = Utc::now();
    let schedule = engine
        .create_schedule(
            category.id,
            template.id,
            emails(&recipients),
            Cadence::Every { seconds: 3600 },
            now,
        )
        .await
        .unwrap();

    let fire_at = now + Duration::hours(1);
    let result = engine.fire(schedule.id, fire_at).await.unwrap();
    assert_eq!(result.sent, 2);
    assert_eq!(result.failed, 0);
    assert_eq!(result.attempted, 2);

    let schedule = engine.get_schedule(schedule.id).await.unwrap().unwrap();
    assert_eq!(schedule.status, ScheduleStatus::Active);
    assert_eq!(schedule.last_run_at, Some(fire_at));
    assert_eq!(schedule.next_run_at, Some(fire_at + Duration::hours(1)));
    assert_eq!(harness.sender.send_calls().len(), 2);
}

#[tokio::test]
async fn one_shot_fire_disables_the_schedule() {
    let harness = TestHarness::with_mocks(
        resolver_with(&["ada@example.com"]),
        MockEmailSender::new(),
    );
    let engine = harness.engine();
    let (category, template) = seed_catalog(&harness).await.unwrap();

    let at = Utc::now();
    let schedule = engine
        .create_schedule(
            category.id,
            template.id,
            emails(&["ada@example.com"]),
            Cadence::OneShot { at },
            Utc::now() - Duration::minutes(5),
        )
        .await
        .unwrap();

    let result = engine.fire(schedule.id, at).await.unwrap();
    assert_eq!(result.sent, 1);

    let schedule = engine.get_schedule(schedule.id).await.unwrap().unwrap();
    assert_eq!(schedule.status, ScheduleStatus::Disabled);
    assert_eq!(schedule.next_run_at, None);
}

#[tokio::test]
async fn overdue_recurring_schedule_fires_once_and_recovers() {
    let harness = TestHarness::with_mocks(
        resolver_with(&["ada@example.com"]),
        MockEmailSender::new(),
    );
    let engine = harness.engine();
    let (category, template) = seed_catalog(&harness).await.unwrap();

    // created long ago, several windows missed
    let created = Utc::now() - Duration::days(2);
    let schedule = engine
        .create_schedule(
            category.id,
            template.id,
            emails(&["ada@example.com"]),
            Cadence::Every { seconds: 3600 },
            created,
        )
        .await
        .unwrap();

    let now = Utc::now();
    let result = engine.fire(schedule.id, now).await.unwrap();
    assert_eq!(result.sent, 1);

    // exactly one catch-up fire; the next window is anchored on now
    let schedule = engine.get_schedule(schedule.id).await.unwrap().unwrap();
    assert_eq!(schedule.next_run_at, Some(now + Duration::hours(1)));
    let err = engine.fire(schedule.id, now).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
}

#[tokio::test]
async fn fire_runs_on_a_spawned_task() {
    let harness = TestHarness::with_mocks(
        resolver_with(&["ada@example.com"]),
        MockEmailSender::new(),
    );
    let engine = std::sync::Arc::new(harness.engine());
    let (category, template) = seed_catalog(&harness).await.unwrap();

    let now = Utc::now();
    let schedule = engine
        .create_schedule(
            category.id,
            template.id,
            emails(&["ada@example.com"]),
            Cadence::Every { seconds: 60 },
            now,
        )
        .await
        .unwrap();

    // the fire future must be Send so the cron runner can spawn it
    let task_engine = engine.clone();
    let result = tokio::spawn(async move {
        task_engine
            .fire(schedule.id, now + Duration::seconds(60))
            .await
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(result.sent, 1);
}

#[tokio::test]
async fn racing_fires_dispatch_the_window_exactly_once() {
    let recipients = ["ada@example.com", "grace@example.com"];
    let harness =
        TestHarness::with_mocks(resolver_with(&recipients), MockEmailSender::new());
    let engine = harness.engine();
    let (category, template) = seed_catalog(&harness).await.unwrap();

    let now = Utc::now();
    let schedule = engine
        .create_schedule(
            category.id,
            template.id,
            emails(&recipients),
            Cadence::Every { seconds: 3600 },
            now,
        )
        .await
        .unwrap();

    let fire_at = now + Duration::hours(1);
    let (a, b) = tokio::join!(
        engine.fire(schedule.id, fire_at),
        engine.fire(schedule.id, fire_at)
    );

    // one caller wins the window; the other reports no work (or finds the
    // schedule no longer due), and no recipient is double-sent
    let sent: usize = [&a, &b]
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .map(|r| r.sent)
        .sum();
    assert_eq!(sent, 2);
    assert_eq!(harness.sender.send_calls().len(), 2);
}

#[tokio::test]
async fn throttled_fire_defers_without_dispatching() {
    let settings = DispatchSettings {
        schedule_rate_limit_max: 1,
        schedule_rate_limit_window_ms: 60 * 60 * 1000,
        rate_limit_backoff_secs: 300,
        ..DispatchSettings::default()
    };
    let harness = TestHarness::with_mocks(
        resolver_with(&["ada@example.com"]),
        MockEmailSender::new(),
    )
    .with_settings(settings);
    let engine = harness.engine();
    let (category, template) = seed_catalog(&harness).await.unwrap();

    let now = Utc::now();
    let schedule = engine
        .create_schedule(
            category.id,
            template.id,
            emails(&["ada@example.com"]),
            Cadence::Every { seconds: 60 },
            now,
        )
        .await
        .unwrap();

    let first = now + Duration::seconds(60);
    assert_eq!(engine.fire(schedule.id, first).await.unwrap().sent, 1);

    // the second window arrives inside the throttle window
    let second = first + Duration::seconds(60);
    let result = engine.fire(schedule.id, second).await.unwrap();
    assert_eq!(result.attempted, 0);
    assert_eq!(result.sent, 0);

    let schedule = engine.get_schedule(schedule.id).await.unwrap().unwrap();
    // pushed back by the backoff, not dispatched and not marked as run
    assert_eq!(schedule.next_run_at, Some(second + Duration::seconds(300)));
    assert_eq!(schedule.last_run_at, Some(first));
    assert_eq!(harness.sender.send_calls().len(), 1);
}

#[tokio::test]
async fn manual_trigger_sends_without_touching_the_cadence() {
    let harness = TestHarness::with_mocks(
        resolver_with(&["ada@example.com"]),
        MockEmailSender::new(),
    );
    let engine = harness.engine();
    let (category, template) = seed_catalog(&harness).await.unwrap();

    let now = Utc::now();
    let schedule = engine
        .create_schedule(
            category.id,
            template.id,
            emails(&["ada@example.com"]),
            Cadence::Every { seconds: 3600 },
            now,
        )
        .await
        .unwrap();
    engine.pause(schedule.id).await.unwrap();

    // allowed while paused
    let result = engine.trigger_manual(schedule.id, now).await.unwrap();
    assert_eq!(result.sent, 1);

    let after = engine.get_schedule(schedule.id).await.unwrap().unwrap();
    assert_eq!(after.next_run_at, schedule.next_run_at);
    assert_eq!(after.last_run_at, None);
    assert_eq!(after.status, ScheduleStatus::Paused);
}

#[tokio::test]
async fn manual_trigger_is_refused_for_disabled_schedules() {
    let harness = TestHarness::new();
    let engine = harness.engine();
    let (category, template) = seed_catalog(&harness).await.unwrap();

    let schedule = engine
        .create_schedule(
            category.id,
            template.id,
            emails(&["ada@example.com"]),
            Cadence::Every { seconds: 3600 },
            Utc::now(),
        )
        .await
        .unwrap();
    engine.disable(schedule.id).await.unwrap();

    let err = engine.trigger_manual(schedule.id, Utc::now()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
}

#[tokio::test]
async fn throttled_manual_trigger_is_an_error() {
    let settings = DispatchSettings {
        schedule_rate_limit_max: 1,
        schedule_rate_limit_window_ms: 60 * 60 * 1000,
        ..DispatchSettings::default()
    };
    let harness = TestHarness::with_mocks(
        resolver_with(&["ada@example.com"]),
        MockEmailSender::new(),
    )
    .with_settings(settings);
    let engine = harness.engine();
    let (category, template) = seed_catalog(&harness).await.unwrap();

    let now = Utc::now();
    let schedule = engine
        .create_schedule(
            category.id,
            template.id,
            emails(&["ada@example.com"]),
            Cadence::Every { seconds: 3600 },
            now,
        )
        .await
        .unwrap();

    engine.trigger_manual(schedule.id, now).await.unwrap();
    let err = engine.trigger_manual(schedule.id, now).await.unwrap_err();
    assert!(matches!(err, PipelineError::RateLimited(_)));
}

#[tokio::test]
async fn manual_trigger_consumes_the_pending_window_for_idempotency() {
    let harness = TestHarness::with_mocks(
        resolver_with(&["ada@example.com"]),
        MockEmailSender::new(),
    );
    let engine = harness.engine();
    let (category, template) = seed_catalog(&harness).await.unwrap();

    let now = Utc::now();
    let schedule = engine
        .create_schedule(
            category.id,
            template.id,
            emails(&["ada@example.com"]),
            Cadence::Every { seconds: 3600 },
            now,
        )
        .await
        .unwrap();

    // manual nudge ahead of the cadence stamps the pending window
    let result = engine.trigger_manual(schedule.id, now).await.unwrap();
    assert_eq!(result.sent, 1);

    // the scheduled fire for that same window then skips every recipient
    let fire_at = now + Duration::hours(1);
    let result = engine.fire(schedule.id, fire_at).await.unwrap();
    assert_eq!(result.sent, 0);
    assert_eq!(result.skipped, 1);
    assert_eq!(harness.sender.send_calls().len(), 1);
}

#[tokio::test]
async fn repeated_manual_triggers_are_idempotent_within_a_window() {
    let recipients = ["ada@example.com", "grace@example.com"];
    let harness =
        TestHarness::with_mocks(resolver_with(&recipients), MockEmailSender::new());
    let engine = harness.engine();
    let (category, template) = seed_catalog(&harness).await.unwrap();

    let now = Utc::now();
    let schedule = engine
        .create_schedule(
            category.id,
            template.id,
            emails(&recipients),
            Cadence::Every { seconds: 24 * 3600 },
            now,
        )
        .await
        .unwrap();

    let first = engine.trigger_manual(schedule.id, now).await.unwrap();
    assert_eq!(first.attempted, 2);
    assert_eq!(first.sent, 2);
    assert_eq!(first.skipped, 0);
    assert_eq!(first.failed, 0);

    // same pending window, so the resend guard catches both recipients
    let second = engine.trigger_manual(schedule.id, now).await.unwrap();
    assert_eq!(second.sent, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(harness.sender.send_calls().len(), 2);
}

#[tokio::test]
async fn segment_audiences_resolve_through_the_crm() {
    let resolver = resolver_with(&["ada@example.com", "grace@example.com"])
        .with_segment("volunteers", &["ada@example.com", "grace@example.com"]);
    let harness = TestHarness::with_mocks(resolver, MockEmailSender::new());
    let engine = harness.engine();
    let (category, template) = seed_catalog(&harness).await.unwrap();

    let now = Utc::now();
    let schedule = engine
        .create_schedule(
            category.id,
            template.id,
            Audience::Segment("volunteers".to_string()),
            Cadence::Every { seconds: 60 },
            now,
        )
        .await
        .unwrap();

    let result = engine
        .fire(schedule.id, now + Duration::seconds(60))
        .await
        .unwrap();
    assert_eq!(result.sent, 2);
}

#[tokio::test]
async fn send_log_stats_reflect_mixed_outcomes() {
    // grace has no CRM record, so her send fails while ada's succeeds
    let resolver = MockContactResolver::new().with_contact("ada@example.com", json!({}));
    let harness = TestHarness::with_mocks(resolver, MockEmailSender::new());
    let engine = harness.engine();
    let (category, template) = seed_catalog(&harness).await.unwrap();

    let now = Utc::now();
    let schedule = engine
        .create_schedule(
            category.id,
            template.id,
            emails(&["ada@example.com", "grace@example.com"]),
            Cadence::Every { seconds: 60 },
            now,
        )
        .await
        .unwrap();

    let result = engine
        .fire(schedule.id, now + Duration::seconds(60))
        .await
        .unwrap();
    assert_eq!(result.sent, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.attempted, 2);

    let stats = harness.store.send_log_stats(Some(schedule.id)).await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.sent, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.skipped, 0);
}
