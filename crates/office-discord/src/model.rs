//! Discord wire types: outbound message payloads and components, interaction
//! callbacks, and the inbound interaction object reduced to what the bot uses.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DiscordError;

// ─── Outbound ─────────────────────────────────────────────────────

const COMPONENT_ACTION_ROW: u8 = 1;
const COMPONENT_BUTTON: u8 = 2;
const COMPONENT_TEXT_INPUT: u8 = 4;
const TEXT_INPUT_SHORT: u8 = 1;

/// Ephemeral message flag.
pub const FLAG_EPHEMERAL: u64 = 1 << 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStyle {
    Primary = 1,
    Secondary = 2,
    Success = 3,
    Danger = 4,
}

/// Message component. Discord distinguishes kinds by the numeric `type`;
/// unused fields are omitted on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
}

impl Component {
    fn bare(kind: u8) -> Self {
        Self {
            kind,
            custom_id: None,
            label: None,
            style: None,
            required: None,
            placeholder: None,
            max_length: None,
            value: None,
            components: Vec::new(),
        }
    }

    pub fn action_row(components: Vec<Component>) -> Self {
        Self {
            components,
            ..Self::bare(COMPONENT_ACTION_ROW)
        }
    }

    pub fn button(custom_id: &str, label: &str, style: ButtonStyle) -> Self {
        Self {
            custom_id: Some(custom_id.to_string()),
            label: Some(label.to_string()),
            style: Some(style as u8),
            ..Self::bare(COMPONENT_BUTTON)
        }
    }

    /// Single-line optional text input for a modal.
    pub fn short_input(custom_id: &str, label: &str, placeholder: Option<&str>) -> Self {
        Self {
            custom_id: Some(custom_id.to_string()),
            label: Some(label.to_string()),
            style: Some(TEXT_INPUT_SHORT),
            required: Some(false),
            placeholder: placeholder.map(ToString::to_string),
            max_length: Some(100),
            ..Self::bare(COMPONENT_TEXT_INPUT)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    /// ISO8601 timestamp shown under the embed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Body for create/edit message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
}

impl MessagePayload {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }
}

/// The subset of a Discord message object the bot reads back.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
}

/// Response to an interaction callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionResponse {
    /// Ephemeral reply visible only to the invoker.
    Ephemeral(String),
    /// Acknowledge a component/modal interaction without a visible reply.
    DeferredUpdate,
    Modal {
        custom_id: String,
        title: String,
        components: Vec<Component>,
    },
}

impl InteractionResponse {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Ephemeral(content) => serde_json::json!({
                "type": 4,
                "data": { "content": content, "flags": FLAG_EPHEMERAL },
            }),
            Self::DeferredUpdate => serde_json::json!({ "type": 6 }),
            Self::Modal {
                custom_id,
                title,
                components,
            } => serde_json::json!({
                "type": 9,
                "data": {
                    "custom_id": custom_id,
                    "title": title,
                    "components": components,
                },
            }),
        }
    }
}

/// Guild slash command definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    /// 1 = CHAT_INPUT.
    #[serde(rename = "type")]
    pub kind: u8,
}

impl CommandSpec {
    pub fn chat_input(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind: 1,
        }
    }
}

// ─── Inbound ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct RawUser {
    id: String,
    username: String,
    #[serde(default)]
    global_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawMember {
    user: RawUser,
    #[serde(default)]
    nick: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawData {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    custom_id: Option<String>,
    #[serde(default)]
    components: Vec<Component>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawInteraction {
    id: String,
    token: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    data: Option<RawData>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    member: Option<RawMember>,
    #[serde(default)]
    user: Option<RawUser>,
}

/// Who triggered an interaction, with the name as displayed at that moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoker {
    pub user_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionKind {
    Ping,
    Command { name: String },
    Button { custom_id: String },
    ModalSubmit {
        custom_id: String,
        fields: BTreeMap<String, String>,
    },
    Other(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub id: String,
    pub token: String,
    pub channel_id: Option<String>,
    pub invoker: Option<Invoker>,
    pub kind: InteractionKind,
}

impl Interaction {
    /// Parse the `d` payload of an `INTERACTION_CREATE` dispatch.
    pub fn from_value(value: serde_json::Value) -> Result<Self, DiscordError> {
        let raw: RawInteraction = serde_json::from_value(value)?;
        Ok(raw.into())
    }
}

impl From<RawInteraction> for Interaction {
    fn from(raw: RawInteraction) -> Self {
        let invoker = match (raw.member, raw.user) {
            (Some(member), _) => Some(Invoker {
                display_name: member
                    .nick
                    .or(member.user.global_name)
                    .unwrap_or(member.user.username),
                user_id: member.user.id,
            }),
            (None, Some(user)) => Some(Invoker {
                display_name: user.global_name.unwrap_or(user.username),
                user_id: user.id,
            }),
            (None, None) => None,
        };

        let data = raw.data.unwrap_or_default();
        let kind = match raw.kind {
            1 => InteractionKind::Ping,
            2 => InteractionKind::Command {
                name: data.name.unwrap_or_default(),
            },
            3 => InteractionKind::Button {
                custom_id: data.custom_id.unwrap_or_default(),
            },
            5 => InteractionKind::ModalSubmit {
                custom_id: data.custom_id.unwrap_or_default(),
                fields: collect_inputs(&data.components),
            },
            other => InteractionKind::Other(other),
        };

        Self {
            id: raw.id,
            token: raw.token,
            channel_id: raw.channel_id,
            invoker,
            kind,
        }
    }
}

/// Flatten modal action rows into `custom_id → value`.
fn collect_inputs(rows: &[Component]) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for component in rows {
        if let (Some(id), Some(value)) = (&component.custom_id, &component.value) {
            fields.insert(id.clone(), value.clone());
        }
        fields.extend(collect_inputs(&component.components));
    }
    fields
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
