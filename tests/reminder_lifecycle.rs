/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! End-to-end tests for the reminder state machine: scan, claim, deliver,
//! retry, dead-letter, and stale-claim recovery. The scheduler and the
//! delivery consumer are driven by hand (one scan, one event at a time) so
//! every assertion is deterministic.

mod common;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serial_test::serial;
use tracing_test::traced_test;
use uuid::Uuid;

use tocsin::delivery::{DeliveryConsumer, NotificationChannel};
use tocsin::models::event::ReminderDue;
use tocsin::models::reminder::{Reminder, ReminderStatus};
use tocsin::retry::{BackoffStrategy, RetryPolicy};
use tocsin::scheduler::ReminderScheduler;
use tocsin::store::{NewTask, TaskService};
use tocsin::DeliveryError;

/// Delivers according to a pre-loaded script; an empty script succeeds.
struct ScriptedChannel {
    script: Mutex<VecDeque<Result<(), DeliveryError>>>,
}

impl ScriptedChannel {
    fn new(script: Vec<Result<(), DeliveryError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
        })
    }
}

#[async_trait]
impl NotificationChannel for ScriptedChannel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn deliver(&self, _due: &ReminderDue) -> Result<(), DeliveryError> {
        self.script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

/// No backoff, no jitter: retried reminders are claimable on the next scan.
fn immediate_retry_policy(max_attempts: i32) -> RetryPolicy {
    RetryPolicy::builder()
        .max_attempts(max_attempts)
        .initial_delay(Duration::ZERO)
        .backoff(BackoffStrategy::Fixed)
        .jitter(false)
        .build()
}

fn scheduler(harness: &common::Harness, policy: RetryPolicy) -> ReminderScheduler {
    ReminderScheduler::new(
        harness.dal.clone(),
        harness.bus.clone(),
        policy,
        Duration::from_secs(60),
        100,
        chrono::Duration::minutes(5),
    )
}

fn consumer(
    harness: &common::Harness,
    channel: Arc<dyn NotificationChannel>,
    policy: RetryPolicy,
) -> DeliveryConsumer {
    DeliveryConsumer::new(
        harness.dal.clone(),
        harness.bus.clone(),
        channel,
        policy,
        Duration::from_secs(5),
    )
}

/// Creates a task whose reminder is already past its scheduled time, so the
/// next scan claims it. The store refuses to schedule reminders in the
/// past, so the reminder row is planted directly.
async fn overdue_task(harness: &common::Harness, user_id: &str) -> (Uuid, Uuid) {
    let task = harness
        .store
        .create_task(NewTask {
            user_id: user_id.into(),
            title: "water the plants".into(),
            due_at: Some(Utc::now() + chrono::Duration::hours(1)),
            ..Default::default()
        })
        .await
        .expect("failed to create task");

    let now = Utc::now();
    let reminder = Reminder {
        id: Uuid::new_v4(),
        task_id: task.id,
        user_id: user_id.into(),
        scheduled_for: now - chrono::Duration::minutes(1),
        status: ReminderStatus::Pending,
        attempt: 0,
        delivery_channel: "in-app".into(),
        claimed_at: None,
        last_attempt_at: None,
        last_error: None,
        created_at: now,
        updated_at: now,
    };
    harness
        .dal
        .reminder()
        .create(&reminder)
        .await
        .expect("failed to create reminder");

    (task.id, reminder.id)
}

#[tokio::test]
#[serial]
async fn future_reminders_are_not_claimed() {
    let h = common::harness().await;
    let task = h
        .store
        .create_task(NewTask {
            user_id: "user-1".into(),
            title: "t".into(),
            due_at: Some(Utc::now() + chrono::Duration::hours(2)),
            reminder_offset_minutes: Some(30),
            ..Default::default()
        })
        .await
        .unwrap();

    let reminders = h.dal.reminder().list_for_task(task.id).await.unwrap();
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].status, ReminderStatus::Pending);

    let mut due_rx = h.bus.subscribe_reminder_due();
    scheduler(&h, RetryPolicy::default()).scan_once().await.unwrap();

    assert!(due_rx.try_recv().is_err());
    let reminder = h.dal.reminder().get_by_id(reminders[0].id).await.unwrap().unwrap();
    assert_eq!(reminder.status, ReminderStatus::Pending);
}

#[tokio::test]
#[serial]
async fn scan_claims_once_and_publishes_once() {
    let h = common::harness().await;
    let (_task_id, reminder_id) = overdue_task(&h, "user-1").await;

    let mut due_rx = h.bus.subscribe_reminder_due();
    let scheduler = scheduler(&h, RetryPolicy::default());

    scheduler.scan_once().await.unwrap();
    let due = due_rx.try_recv().expect("expected a due event");
    assert_eq!(due.reminder_id, reminder_id);
    assert_eq!(due.attempt, 1);
    assert_eq!(due.task_title, "water the plants");

    let claimed = h.dal.reminder().get_by_id(reminder_id).await.unwrap().unwrap();
    assert_eq!(claimed.status, ReminderStatus::Due);
    assert!(claimed.claimed_at.is_some());

    // A second scan must not re-claim the same reminder.
    scheduler.scan_once().await.unwrap();
    assert!(due_rx.try_recv().is_err());
}

#[tokio::test]
#[serial]
async fn concurrent_scans_claim_each_reminder_once() {
    let h = common::harness().await;
    let (_task_id, reminder_id) = overdue_task(&h, "user-1").await;

    let mut due_rx = h.bus.subscribe_reminder_due();
    let first = scheduler(&h, RetryPolicy::default());
    let second = scheduler(&h, RetryPolicy::default());

    // Two scheduler instances racing over the same database; the
    // conditional claim update lets exactly one of them win.
    let (a, b) = tokio::join!(first.scan_once(), second.scan_once());
    a.unwrap();
    b.unwrap();

    let due = due_rx.try_recv().expect("expected a due event");
    assert_eq!(due.reminder_id, reminder_id);
    assert_eq!(due.attempt, 1);
    assert!(due_rx.try_recv().is_err(), "reminder was claimed twice");

    let claimed = h.dal.reminder().get_by_id(reminder_id).await.unwrap().unwrap();
    assert_eq!(claimed.attempt, 1);
}

#[tokio::test]
#[serial]
async fn reprocessing_the_same_due_event_sends_once() {
    let h = common::harness().await;
    let (_task_id, reminder_id) = overdue_task(&h, "user-1").await;

    let mut due_rx = h.bus.subscribe_reminder_due();
    let mut outcome_rx = h.bus.subscribe_reminder_outcomes();

    let policy = immediate_retry_policy(3);
    scheduler(&h, policy.clone()).scan_once().await.unwrap();
    let due = due_rx.try_recv().unwrap();

    // A redelivered bus event must not produce a second notification: the
    // first process moves the row out of `due`, the second finds nothing
    // to deliver.
    let consumer = consumer(&h, ScriptedChannel::new(vec![Ok(()), Ok(())]), policy);
    consumer.process(due.clone()).await.unwrap();
    consumer.process(due).await.unwrap();

    let reminder = h.dal.reminder().get_by_id(reminder_id).await.unwrap().unwrap();
    assert_eq!(reminder.status, ReminderStatus::Sent);
    assert_eq!(reminder.attempt, 1);

    let outcome = outcome_rx.try_recv().unwrap();
    assert_eq!(outcome.status, ReminderStatus::Sent);
    assert!(outcome_rx.try_recv().is_err(), "sent outcome emitted twice");
}

#[tokio::test]
#[serial]
async fn successful_delivery_marks_sent_with_one_outcome() {
    let h = common::harness().await;
    let (_task_id, reminder_id) = overdue_task(&h, "user-1").await;

    let mut due_rx = h.bus.subscribe_reminder_due();
    let mut outcome_rx = h.bus.subscribe_reminder_outcomes();

    let policy = immediate_retry_policy(3);
    scheduler(&h, policy.clone()).scan_once().await.unwrap();
    let due = due_rx.try_recv().unwrap();

    let consumer = consumer(&h, ScriptedChannel::new(vec![Ok(())]), policy);
    consumer.process(due).await.unwrap();

    let reminder = h.dal.reminder().get_by_id(reminder_id).await.unwrap().unwrap();
    assert_eq!(reminder.status, ReminderStatus::Sent);
    assert_eq!(reminder.attempt, 1);

    let outcome = outcome_rx.try_recv().unwrap();
    assert_eq!(outcome.status, ReminderStatus::Sent);
    assert!(outcome_rx.try_recv().is_err());
}

#[tokio::test]
#[serial]
async fn transient_failures_exhaust_into_dead_letter() {
    let h = common::harness().await;
    let (_task_id, reminder_id) = overdue_task(&h, "user-1").await;

    let policy = immediate_retry_policy(3);
    let scheduler = scheduler(&h, policy.clone());
    let channel = ScriptedChannel::new(vec![
        Err(DeliveryError::ChannelUnavailable("down".into())),
        Err(DeliveryError::ChannelUnavailable("down".into())),
        Err(DeliveryError::ChannelUnavailable("down".into())),
    ]);
    let consumer = consumer(&h, channel, policy);

    let mut due_rx = h.bus.subscribe_reminder_due();
    let mut outcome_rx = h.bus.subscribe_reminder_outcomes();

    for expected_attempt in 1..=3 {
        scheduler.scan_once().await.unwrap();
        let due = due_rx.try_recv().expect("expected a due event");
        assert_eq!(due.attempt, expected_attempt);
        consumer.process(due).await.unwrap();
    }

    let reminder = h.dal.reminder().get_by_id(reminder_id).await.unwrap().unwrap();
    assert_eq!(reminder.status, ReminderStatus::DeadLettered);
    assert_eq!(reminder.attempt, 3);
    assert!(reminder.last_error.is_some());

    // Exactly one failed outcome, on the final attempt.
    let outcome = outcome_rx.try_recv().unwrap();
    assert_eq!(outcome.status, ReminderStatus::DeadLettered);
    assert_eq!(outcome.attempt, 3);
    assert!(outcome_rx.try_recv().is_err());

    // Dead-lettered reminders never come back.
    scheduler.scan_once().await.unwrap();
    assert!(due_rx.try_recv().is_err());
}

#[tokio::test]
#[serial]
async fn recovery_after_transient_failures_delivers() {
    let h = common::harness().await;
    let (_task_id, reminder_id) = overdue_task(&h, "user-1").await;

    let policy = immediate_retry_policy(3);
    let scheduler = scheduler(&h, policy.clone());
    let channel = ScriptedChannel::new(vec![
        Err(DeliveryError::Timeout),
        Err(DeliveryError::Timeout),
        Ok(()),
    ]);
    let consumer = consumer(&h, channel, policy);

    let mut due_rx = h.bus.subscribe_reminder_due();
    let mut outcome_rx = h.bus.subscribe_reminder_outcomes();

    for _ in 0..3 {
        scheduler.scan_once().await.unwrap();
        let due = due_rx.try_recv().unwrap();
        consumer.process(due).await.unwrap();
    }

    let reminder = h.dal.reminder().get_by_id(reminder_id).await.unwrap().unwrap();
    assert_eq!(reminder.status, ReminderStatus::Sent);
    assert_eq!(reminder.attempt, 3);

    let outcome = outcome_rx.try_recv().unwrap();
    assert_eq!(outcome.status, ReminderStatus::Sent);
    assert!(outcome_rx.try_recv().is_err());
}

#[tokio::test]
#[serial]
async fn permanent_failure_dead_letters_without_retry() {
    let h = common::harness().await;
    let (_task_id, reminder_id) = overdue_task(&h, "user-1").await;

    let policy = immediate_retry_policy(3);
    let mut due_rx = h.bus.subscribe_reminder_due();
    scheduler(&h, policy.clone()).scan_once().await.unwrap();
    let due = due_rx.try_recv().expect("expected a due event");

    let channel = ScriptedChannel::new(vec![Err(DeliveryError::Rejected("bad payload".into()))]);
    consumer(&h, channel, policy).process(due).await.unwrap();

    let reminder = h.dal.reminder().get_by_id(reminder_id).await.unwrap().unwrap();
    assert_eq!(reminder.status, ReminderStatus::DeadLettered);
    assert_eq!(reminder.attempt, 1);
}

#[tokio::test]
#[serial]
async fn completed_task_cancels_its_reminder_at_scan() {
    let h = common::harness().await;
    let (task_id, reminder_id) = overdue_task(&h, "user-1").await;

    // Complete the task behind the scheduler's back (no store, no events).
    h.dal.task().mark_completed(task_id).await.unwrap();

    let mut due_rx = h.bus.subscribe_reminder_due();
    scheduler(&h, RetryPolicy::default()).scan_once().await.unwrap();

    assert!(due_rx.try_recv().is_err());
    let reminder = h.dal.reminder().get_by_id(reminder_id).await.unwrap().unwrap();
    assert_eq!(reminder.status, ReminderStatus::Cancelled);
}

#[tokio::test]
#[traced_test]
#[serial]
async fn stale_claim_is_recovered_and_redelivered() {
    let h = common::harness().await;
    let task = h
        .store
        .create_task(NewTask {
            user_id: "user-1".into(),
            title: "stale".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    // A claim from a consumer that died ten minutes ago.
    let now = Utc::now();
    let reminder = Reminder {
        id: Uuid::new_v4(),
        task_id: task.id,
        user_id: "user-1".into(),
        scheduled_for: now - chrono::Duration::minutes(15),
        status: ReminderStatus::Due,
        attempt: 1,
        delivery_channel: "in-app".into(),
        claimed_at: Some(now - chrono::Duration::minutes(10)),
        last_attempt_at: Some(now - chrono::Duration::minutes(10)),
        last_error: None,
        created_at: now,
        updated_at: now,
    };
    h.dal.reminder().create(&reminder).await.unwrap();

    let scheduler = scheduler(&h, immediate_retry_policy(3));
    let mut due_rx = h.bus.subscribe_reminder_due();

    // First scan recovers the claim into retrying.
    scheduler.scan_once().await.unwrap();
    let recovered = h.dal.reminder().get_by_id(reminder.id).await.unwrap().unwrap();
    assert_eq!(recovered.status, ReminderStatus::Retrying);
    assert!(logs_contain("Recovering stale reminder claim"));

    // Second scan claims it again as attempt 2.
    scheduler.scan_once().await.unwrap();
    let due = due_rx.try_recv().expect("expected a re-claimed due event");
    assert_eq!(due.reminder_id, reminder.id);
    assert_eq!(due.attempt, 2);
}

#[tokio::test]
#[serial]
async fn recovered_stale_claim_waits_out_the_backoff() {
    let h = common::harness().await;
    let task = h
        .store
        .create_task(NewTask {
            user_id: "user-1".into(),
            title: "stale".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let now = Utc::now();
    let reminder = Reminder {
        id: Uuid::new_v4(),
        task_id: task.id,
        user_id: "user-1".into(),
        scheduled_for: now - chrono::Duration::minutes(15),
        status: ReminderStatus::Due,
        attempt: 1,
        delivery_channel: "in-app".into(),
        claimed_at: Some(now - chrono::Duration::minutes(10)),
        last_attempt_at: Some(now - chrono::Duration::minutes(10)),
        last_error: None,
        created_at: now,
        updated_at: now,
    };
    h.dal.reminder().create(&reminder).await.unwrap();

    // A real backoff this time: recovery must push the retry into the
    // future rather than making the row instantly claimable again.
    let policy = RetryPolicy::builder()
        .max_attempts(3)
        .initial_delay(Duration::from_secs(60))
        .backoff(BackoffStrategy::Fixed)
        .jitter(false)
        .build();
    let scheduler = scheduler(&h, policy);
    let mut due_rx = h.bus.subscribe_reminder_due();

    scheduler.scan_once().await.unwrap();
    let recovered = h.dal.reminder().get_by_id(reminder.id).await.unwrap().unwrap();
    assert_eq!(recovered.status, ReminderStatus::Retrying);
    assert!(
        recovered.scheduled_for > Utc::now(),
        "recovered claim was rescheduled without backoff"
    );

    scheduler.scan_once().await.unwrap();
    assert!(due_rx.try_recv().is_err());
}

#[tokio::test]
#[serial]
async fn exhausted_stale_claim_is_dead_lettered() {
    let h = common::harness().await;
    let task = h
        .store
        .create_task(NewTask {
            user_id: "user-1".into(),
            title: "stale".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let now = Utc::now();
    let reminder = Reminder {
        id: Uuid::new_v4(),
        task_id: task.id,
        user_id: "user-1".into(),
        scheduled_for: now - chrono::Duration::minutes(15),
        status: ReminderStatus::Due,
        attempt: 3,
        delivery_channel: "in-app".into(),
        claimed_at: Some(now - chrono::Duration::minutes(10)),
        last_attempt_at: Some(now - chrono::Duration::minutes(10)),
        last_error: None,
        created_at: now,
        updated_at: now,
    };
    h.dal.reminder().create(&reminder).await.unwrap();

    let mut outcome_rx = h.bus.subscribe_reminder_outcomes();
    scheduler(&h, immediate_retry_policy(3)).scan_once().await.unwrap();

    let recovered = h.dal.reminder().get_by_id(reminder.id).await.unwrap().unwrap();
    assert_eq!(recovered.status, ReminderStatus::DeadLettered);

    let outcome = outcome_rx.try_recv().unwrap();
    assert_eq!(outcome.status, ReminderStatus::DeadLettered);
    assert_eq!(outcome.attempt, 3);
}

#[tokio::test]
#[serial]
async fn cancelled_reminder_is_skipped_by_delivery() {
    let h = common::harness().await;
    let (task_id, reminder_id) = overdue_task(&h, "user-1").await;

    let policy = immediate_retry_policy(3);
    let mut due_rx = h.bus.subscribe_reminder_due();
    scheduler(&h, policy.clone()).scan_once().await.unwrap();
    let due = due_rx.try_recv().unwrap();

    // The task is deleted between claim and delivery; the cancel wins.
    h.store.delete_task(task_id).await.unwrap();

    let mut outcome_rx = h.bus.subscribe_reminder_outcomes();
    let consumer = consumer(&h, ScriptedChannel::new(vec![Ok(())]), policy);
    consumer.process(due).await.unwrap();

    // Row is gone (cascade) or cancelled; either way no outcome is emitted.
    if let Some(reminder) = h.dal.reminder().get_by_id(reminder_id).await.unwrap() {
        assert_eq!(reminder.status, ReminderStatus::Cancelled);
    }
    assert!(outcome_rx.try_recv().is_err());
}
