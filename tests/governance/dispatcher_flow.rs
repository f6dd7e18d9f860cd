use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use promptwarden::config::QuotaPolicy;
use promptwarden::ledger::UserId;
use promptwarden::orchestrator::Dispatcher;
use promptwarden::orchestrator::dispatch::{CHAT_SPAM_REASON, COMMAND_SPAM_REASON};
use promptwarden::platform::PlatformEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::warden_harness::{self, FakeCompletion, FakePlatform, PlatformCall};

async fn dispatcher(platform: &Arc<FakePlatform>) -> Dispatcher {
    let ledger = warden_harness::memory_ledger().await;
    let completion = Arc::new(FakeCompletion::answering("ok"));
    let orchestrator = Arc::new(warden_harness::orchestrator(
        ledger,
        completion,
        Arc::clone(platform),
    ));
    Dispatcher::new(orchestrator, platform.clone(), &QuotaPolicy::default())
}

/// Feed `events` through a fresh dispatcher and wait for every task.
async fn drive(platform: &Arc<FakePlatform>, events: Vec<PlatformEvent>) {
    let (tx, rx) = mpsc::channel(events.len().max(1));
    for event in events {
        tx.send(event).await.unwrap();
    }
    drop(tx);

    tokio::time::timeout(
        Duration::from_secs(5),
        dispatcher(platform).await.run(rx, CancellationToken::new()),
    )
    .await
    .expect("dispatcher drains and stops once the stream closes");
}

#[tokio::test]
async fn sixth_command_in_burst_window_suspends_instead_of_running() {
    let platform = Arc::new(FakePlatform::new());
    let events = (0..6)
        .map(|id| PlatformEvent::Command(warden_harness::command(id, "hello", 20, &[])))
        .collect();

    drive(&platform, events).await;

    let defers = platform
        .calls()
        .into_iter()
        .filter(|call| matches!(call, PlatformCall::Defer { .. }))
        .count();
    assert_eq!(defers, 6, "limited commands are still acknowledged");
    assert_eq!(platform.replies().len(), 5);
    assert_eq!(
        platform.suspensions(),
        vec![(
            UserId(20),
            Duration::from_secs(60),
            COMMAND_SPAM_REASON.to_string()
        )]
    );
}

#[tokio::test]
async fn commands_spread_past_the_window_are_all_served() {
    let platform = Arc::new(FakePlatform::new());
    let events = (0..6)
        .map(|id| {
            let mut command = warden_harness::command(id, "hello", 21, &[]);
            command.received_at += TimeDelta::seconds(i64::try_from(id).unwrap() * 5);
            PlatformEvent::Command(command)
        })
        .collect();

    drive(&platform, events).await;

    assert_eq!(platform.replies().len(), 6);
    assert!(platform.suspensions().is_empty());
}

#[tokio::test]
async fn chat_flood_suspends_and_posts_notice() {
    let platform = Arc::new(FakePlatform::new());
    let start = warden_harness::fixed_now();
    let events = (0..5)
        .map(|i| {
            PlatformEvent::Message(warden_harness::chat_message(
                i,
                22,
                start + TimeDelta::seconds(i64::try_from(i).unwrap() * 2),
            ))
        })
        .collect();

    drive(&platform, events).await;

    assert_eq!(
        platform.suspensions(),
        vec![(
            UserId(22),
            Duration::from_secs(60),
            CHAT_SPAM_REASON.to_string()
        )]
    );
    assert_eq!(
        platform.notices(),
        vec!["<@22> has been timed out for 60 seconds. Reason: Spamming in chat".to_string()]
    );
}

#[tokio::test]
async fn slow_chatter_is_left_alone() {
    let platform = Arc::new(FakePlatform::new());
    let start = warden_harness::fixed_now();
    let events = (0..5)
        .map(|i| {
            PlatformEvent::Message(warden_harness::chat_message(
                i,
                23,
                start + TimeDelta::seconds(i64::try_from(i).unwrap() * 3),
            ))
        })
        .collect();

    drive(&platform, events).await;

    assert!(platform.calls().is_empty());
}

#[tokio::test]
async fn bot_messages_never_count_toward_a_flood() {
    let platform = Arc::new(FakePlatform::new());
    let start = warden_harness::fixed_now();
    let events = (0..10)
        .map(|i| {
            let mut message = warden_harness::chat_message(i, 24, start);
            message.author_is_bot = true;
            PlatformEvent::Message(message)
        })
        .collect();

    drive(&platform, events).await;

    assert!(platform.calls().is_empty());
}

#[tokio::test]
async fn direct_message_flood_is_announced_without_suspension() {
    let platform = Arc::new(FakePlatform::new());
    let start = warden_harness::fixed_now();
    let events = (0..5)
        .map(|i| {
            let mut message = warden_harness::chat_message(i, 25, start);
            message.guild_id = None;
            PlatformEvent::Message(message)
        })
        .collect();

    drive(&platform, events).await;

    assert!(platform.suspensions().is_empty());
    assert_eq!(
        platform.notices(),
        vec!["<@25> has been timed out for 60 seconds. Reason: Spamming in chat".to_string()]
    );
}

#[tokio::test]
async fn flood_notice_is_posted_even_when_suspension_fails() {
    let platform = Arc::new(FakePlatform::new().failing_suspend());
    let start = warden_harness::fixed_now();
    let events = (0..5)
        .map(|i| PlatformEvent::Message(warden_harness::chat_message(i, 26, start)))
        .collect();

    drive(&platform, events).await;

    assert!(platform.suspensions().is_empty());
    assert_eq!(platform.notices().len(), 1);
    assert_eq!(
        platform.notices()[0],
        "<@26> has been timed out for 60 seconds. Reason: Spamming in chat"
    );
}

#[tokio::test]
async fn cancellation_stops_an_idle_dispatcher() {
    let platform = Arc::new(FakePlatform::new());
    let (_tx, rx) = mpsc::channel::<PlatformEvent>(1);
    let cancel = CancellationToken::new();
    let run = tokio::spawn(dispatcher(&platform).await.run(rx, cancel.clone()));

    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("dispatcher should stop on cancel")
        .expect("dispatcher task should not panic");
    assert!(platform.calls().is_empty());
}
