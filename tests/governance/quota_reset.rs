use std::sync::Arc;
use std::time::Duration;

use promptwarden::governance::run_quota_scheduler;
use promptwarden::ledger::{Ledger, UserId};
use tokio_util::sync::CancellationToken;

use super::warden_harness::{self, FakeCompletion, FakePlatform};

#[tokio::test]
async fn reset_restores_an_exhausted_allowance() {
    let ledger = warden_harness::memory_ledger().await;
    let completion = Arc::new(FakeCompletion::answering("fresh answer"));
    let platform = Arc::new(FakePlatform::new());
    let orchestrator = warden_harness::orchestrator(
        Arc::clone(&ledger),
        Arc::clone(&completion),
        Arc::clone(&platform),
    );

    for id in 0..4 {
        orchestrator
            .handle(&warden_harness::prompt_command(300 + id, 30, "tell me"))
            .await
            .unwrap();
    }
    assert_eq!(completion.calls(), 3, "fourth prompt is over the allowance");

    let rows = ledger.reset_all_uses().await.expect("reset succeeds");
    assert_eq!(rows, 1);

    orchestrator
        .handle(&warden_harness::prompt_command(304, 30, "tell me again"))
        .await
        .unwrap();

    assert_eq!(completion.calls(), 4);
    assert_eq!(ledger.get_user(UserId(30)).await.unwrap().unwrap().uses, 1);
    assert_eq!(
        platform.replies().last().map(|r| r.content.as_str()),
        Some("fresh answer")
    );
}

#[tokio::test]
async fn scheduler_exits_on_cancel_without_resetting() {
    let ledger = warden_harness::memory_ledger().await;
    ledger.insert_user(UserId(31), "user31").await.unwrap();
    ledger.increment_use(UserId(31)).await.unwrap();

    let cancel = CancellationToken::new();
    let scheduler = tokio::spawn(run_quota_scheduler(
        Arc::clone(&ledger) as Arc<dyn Ledger>,
        warden_harness::aedt_midnight(),
        cancel.clone(),
    ));

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), scheduler)
        .await
        .expect("scheduler should stop promptly")
        .expect("scheduler task should not panic");

    assert_eq!(ledger.get_user(UserId(31)).await.unwrap().unwrap().uses, 1);
}
