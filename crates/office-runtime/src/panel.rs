//! Discord shape of the occupancy panel, the join modal and the guild
//! commands. Identifiers here are persisted in posted messages, so they
//! must stay stable across releases.

use chrono::SecondsFormat;

use office_core::PanelView;
use office_discord::{
    ButtonStyle, CommandSpec, Component, Embed, EmbedFooter, InteractionResponse, MessagePayload,
};

pub const JOIN_BUTTON: &str = "office_join";
pub const LEAVE_BUTTON: &str = "office_leave";
pub const JOIN_MODAL: &str = "office_join_modal";

pub const FIELD_START: &str = "startTime";
pub const FIELD_END: &str = "endTime";
pub const FIELD_NOTE: &str = "note";

pub const CMD_SETUP: &str = "setup-office";
pub const CMD_REMOVE: &str = "remove-office";

/// Full message body for a panel: embed plus Join/Leave buttons.
pub fn panel_message(view: &PanelView) -> MessagePayload {
    MessagePayload {
        content: None,
        embeds: vec![Embed {
            title: view.title.clone(),
            description: view.description(),
            footer: Some(EmbedFooter {
                text: view.footer.clone(),
            }),
            timestamp: Some(view.rendered_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }],
        components: vec![Component::action_row(vec![
            Component::button(JOIN_BUTTON, "Join", ButtonStyle::Success),
            Component::button(LEAVE_BUTTON, "Leave", ButtonStyle::Danger),
        ])],
    }
}

pub fn join_modal() -> InteractionResponse {
    let row = |input| Component::action_row(vec![input]);
    InteractionResponse::Modal {
        custom_id: JOIN_MODAL.to_string(),
        title: "Join the office".to_string(),
        components: vec![
            row(Component::short_input(
                FIELD_START,
                "Arrival time (HH:MM, blank = now)",
                Some("09:30"),
            )),
            row(Component::short_input(
                FIELD_END,
                "Expected leave time (HH:MM)",
                Some("18:00"),
            )),
            row(Component::short_input(FIELD_NOTE, "Note", None)),
        ],
    }
}

pub fn commands() -> Vec<CommandSpec> {
    vec![
        CommandSpec::chat_input(CMD_SETUP, "Post the office occupancy panel in this channel"),
        CommandSpec::chat_input(CMD_REMOVE, "Stop updating the panel in this channel"),
    ]
}
