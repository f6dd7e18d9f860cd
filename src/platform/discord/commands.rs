use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use super::types::{BUTTON_STYLE_LINK, ComponentType, InteractionType, snowflake_timestamp};
use crate::ledger::UserId;
use crate::platform::{CommandEvent, Embed, LinkButton, Reply};

const OPTION_TYPE_STRING: u8 = 3;

/// Slash commands the bot registers on READY.
pub fn build_default_commands() -> Vec<Value> {
    vec![
        json!({
            "name": "help",
            "description": "Displays all commands.",
            "type": 1
        }),
        json!({
            "name": "hello",
            "description": "Greets the user.",
            "type": 1
        }),
        json!({
            "name": "fact",
            "description": "Gives a random cool fact!",
            "type": 1
        }),
        json!({
            "name": "promptsleft",
            "description": "Shows how many prompts you have left for the day.",
            "type": 1
        }),
        json!({
            "name": "prompt",
            "description": "Sends your prompt to the AI for a response.",
            "type": 1,
            "options": [
                {
                    "name": "prompt",
                    "description": "What you want to ask",
                    "type": OPTION_TYPE_STRING,
                    "required": true
                }
            ]
        }),
    ]
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Turn an `INTERACTION_CREATE` payload into a command event. Returns `None`
/// for anything other than a well-formed application command.
pub fn parse_command(payload: &Value, received_at: DateTime<Utc>) -> Option<CommandEvent> {
    let interaction_type = payload.get("type").and_then(Value::as_u64)?;
    if InteractionType::from_u64(interaction_type) != Some(InteractionType::ApplicationCommand) {
        return None;
    }

    let id: u64 = str_field(payload, "id")?.parse().ok()?;
    let token = str_field(payload, "token")?.to_string();
    let data = payload.get("data")?;
    let name = str_field(data, "name")?.to_string();

    // Guild invocations carry the user under `member`, DMs at top level.
    let user = payload
        .get("member")
        .and_then(|member| member.get("user"))
        .or_else(|| payload.get("user"))?;
    let user_id = UserId(str_field(user, "id")?.parse().ok()?);
    let user_name = str_field(user, "username").unwrap_or_default().to_string();

    let options = data
        .get("options")
        .and_then(Value::as_array)
        .map(|opts| {
            opts.iter()
                .filter_map(|opt| {
                    let key = str_field(opt, "name")?.to_string();
                    let value = match opt.get("value")? {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    Some((key, value))
                })
                .collect()
        })
        .unwrap_or_default();

    let mut raw = payload.clone();
    if let Some(object) = raw.as_object_mut() {
        object.remove("token");
    }

    Some(CommandEvent {
        id,
        token,
        name,
        options,
        user_id,
        user_name,
        guild_id: str_field(payload, "guild_id").map(str::to_string),
        channel_id: str_field(payload, "channel_id")
            .unwrap_or_default()
            .to_string(),
        received_at: snowflake_timestamp(id).unwrap_or(received_at),
        raw,
    })
}

fn embed_json(embed: &Embed) -> Value {
    let mut value = json!({});
    if let Some(title) = &embed.title {
        value["title"] = json!(title);
    }
    if let Some(description) = &embed.description {
        value["description"] = json!(description);
    }
    if let Some(color) = embed.color {
        value["color"] = json!(color);
    }
    if !embed.fields.is_empty() {
        value["fields"] = embed
            .fields
            .iter()
            .map(|field| {
                json!({
                    "name": field.name,
                    "value": field.value,
                    "inline": field.inline,
                })
            })
            .collect();
    }
    if let Some(footer) = &embed.footer {
        value["footer"] = json!({ "text": footer });
    }
    value
}

fn link_row_json(link: &LinkButton) -> Value {
    json!({
        "type": ComponentType::ActionRow as u8,
        "components": [{
            "type": ComponentType::Button as u8,
            "style": BUTTON_STYLE_LINK,
            "label": link.label,
            "url": link.url,
        }]
    })
}

/// Follow-up message body for a reply.
pub fn reply_payload(reply: &Reply) -> Value {
    let mut body = json!({});
    if !reply.content.is_empty() {
        body["content"] = json!(reply.content);
    }
    if let Some(embed) = &reply.embed {
        body["embeds"] = json!([embed_json(embed)]);
    }
    if let Some(link) = &reply.link {
        body["components"] = json!([link_row_json(link)]);
    }
    body
}
