use promptwarden::delivery::{DELIVERY_APOLOGY, deliver};
use promptwarden::error::DeliveryError;
use promptwarden::platform::{Embed, Reply};

use super::warden_harness::{self, FakePlatform, PlatformCall};

fn footer_embed() -> Embed {
    Embed {
        description: Some("**Your prompt:**".into()),
        footer: Some("tell me things".into()),
        ..Embed::default()
    }
}

#[tokio::test]
async fn long_reply_goes_out_in_order_with_decoration_on_last_chunk() {
    let platform = FakePlatform::new().with_max_len(20);
    let command = warden_harness::prompt_command(1, 7, "tell me things");
    let reply = Reply::text("alpha line\nbravo line\ncharlie")
        .with_embed(footer_embed())
        .with_link("More", "https://example.com/more");

    let sent = deliver(&platform, &command, reply)
        .await
        .expect("delivery should succeed");

    assert_eq!(sent, 2);
    let replies = platform.replies();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].content, "alpha line");
    assert!(replies[0].embed.is_none());
    assert!(replies[0].link.is_none());
    assert_eq!(replies[1].content, "bravo line\ncharlie");
    assert_eq!(replies[1].embed, Some(footer_embed()));
    assert_eq!(
        replies[1].link.as_ref().map(|link| link.url.as_str()),
        Some("https://example.com/more")
    );
}

#[tokio::test]
async fn every_chunk_respects_platform_limit() {
    let platform = FakePlatform::new().with_max_len(16);
    let command = warden_harness::prompt_command(2, 7, "essay");
    let body = "One sentence here. Another sentence follows. ".repeat(6);

    deliver(&platform, &command, Reply::text(body.clone()))
        .await
        .expect("delivery should succeed");

    let replies = platform.replies();
    assert!(replies.len() > 1);
    for reply in &replies {
        assert!(reply.content.chars().count() <= 16, "{:?}", reply.content);
        assert!(!reply.content.trim().is_empty());
    }
    let rejoined: String = replies.iter().map(|r| r.content.replace(' ', "")).collect();
    assert_eq!(rejoined, body.replace(' ', ""));
}

#[tokio::test]
async fn decoration_only_reply_is_sent_alone() {
    let platform = FakePlatform::new();
    let command = warden_harness::command(3, "help", 7, &[]);

    let sent = deliver(&platform, &command, Reply::default().with_embed(footer_embed()))
        .await
        .expect("delivery should succeed");

    assert_eq!(sent, 1);
    let replies = platform.replies();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].content.is_empty());
    assert!(replies[0].embed.is_some());
}

#[tokio::test]
async fn empty_reply_sends_nothing() {
    let platform = FakePlatform::new();
    let command = warden_harness::command(4, "hello", 7, &[]);

    let sent = deliver(&platform, &command, Reply::text("  \n "))
        .await
        .expect("empty delivery is not an error");

    assert_eq!(sent, 0);
    assert!(platform.calls().is_empty());
}

#[tokio::test]
async fn failed_chunk_stops_delivery_and_apologizes() {
    let platform = FakePlatform::new().with_max_len(20).failing_reply_at(1);
    let command = warden_harness::prompt_command(5, 7, "tell me things");
    let reply = Reply::text("alpha line\nbravo line\ncharlie line\ndelta")
        .with_embed(footer_embed());

    let err = deliver(&platform, &command, reply)
        .await
        .expect_err("second chunk should fail");

    let DeliveryError::Chunk { index, message } = err;
    assert_eq!(index, 1);
    assert_eq!(message, "socket closed");

    let calls = platform.calls();
    assert_eq!(calls.len(), 2, "no chunk after the failure is sent");
    assert_eq!(calls[0], PlatformCall::Reply(Reply::text("alpha line")));
    assert_eq!(
        calls[1],
        PlatformCall::Reply(Reply::text(format!(
            "{DELIVERY_APOLOGY}\n```socket closed```"
        )))
    );
}
