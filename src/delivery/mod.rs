//! Response delivery: chunk a reply to the platform's message limit and
//! send the pieces in order as follow-ups to the originating command.

pub mod chunker;

pub use chunker::{Chunk, Chunks, Split, chunks, split_nicely};

use crate::error::DeliveryError;
use crate::platform::{CommandEvent, Platform, Reply};

pub const DELIVERY_APOLOGY: &str = "Sadly, your prompt could not be processed.";

/// Send `reply` as one or more follow-ups, returning how many went out.
///
/// Chunks are sent sequentially and whitespace-only chunks are skipped. Any
/// embed or link button rides on the final chunk only; a reply with no text
/// sends its decoration alone. The first failed send stops delivery, tells
/// the user, and reports the failing chunk index.
pub async fn deliver(
    platform: &dyn Platform,
    command: &CommandEvent,
    reply: Reply,
) -> Result<usize, DeliveryError> {
    let Reply {
        content,
        mut embed,
        mut link,
    } = reply;

    let mut pending = chunks(&content, platform.max_message_length())
        .filter(has_text)
        .peekable();

    if pending.peek().is_none() {
        if embed.is_none() && link.is_none() {
            tracing::debug!(command = %command.name, "nothing to deliver");
            return Ok(0);
        }
        let message = Reply {
            content: String::new(),
            embed,
            link,
        };
        send(platform, command, &message, 0).await?;
        return Ok(1);
    }

    let mut sent = 0;
    while let Some(chunk) = pending.next() {
        let last = pending.peek().is_none();
        let message = Reply {
            content: chunk.text.to_string(),
            embed: if last { embed.take() } else { None },
            link: if last { link.take() } else { None },
        };
        send(platform, command, &message, sent).await?;
        sent += 1;
    }

    tracing::debug!(command = %command.name, chunks = sent, "response delivered");
    Ok(sent)
}

fn has_text(chunk: &Chunk<'_>) -> bool {
    !chunk.text.trim().is_empty()
}

async fn send(
    platform: &dyn Platform,
    command: &CommandEvent,
    message: &Reply,
    index: usize,
) -> Result<(), DeliveryError> {
    let Err(e) = platform.reply(command, message).await else {
        return Ok(());
    };

    tracing::error!(
        platform = platform.name(),
        command = %command.name,
        user_id = %command.user_id,
        chunk = index,
        error = %e,
        "response chunk delivery failed"
    );

    let apology = Reply::text(format!("{DELIVERY_APOLOGY}\n```{e}```"));
    if let Err(apology_err) = platform.reply(command, &apology).await {
        tracing::error!(error = %apology_err, "delivery failure notice could not be sent");
    }

    Err(DeliveryError::Chunk {
        index,
        message: e.to_string(),
    })
}
