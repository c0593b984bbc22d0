//! office-discord: Discord IO boundary.
//! REST calls (messages, interaction callbacks, command registration), a
//! minimal gateway session that delivers interactions, and the wire types
//! for both. No occupancy logic lives here.

pub mod error;
pub mod gateway;
pub mod model;
pub mod rest;

pub use error::DiscordError;
pub use gateway::{Gateway, INTENT_GUILDS};
pub use model::{
    ButtonStyle, CommandSpec, Component, Embed, EmbedFooter, Interaction, InteractionKind,
    InteractionResponse, Invoker, Message, MessagePayload,
};
pub use rest::RestClient;
