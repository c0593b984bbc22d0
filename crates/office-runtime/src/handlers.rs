//! Interaction handlers. Each action runs mutate → respond → notify →
//! refresh. Once the mutation is stored, notify and refresh always run even
//! if the reply fails. Other errors stop at [`handle_interaction`]: they are
//! logged and the user gets a one-line ephemeral reply.

use std::collections::BTreeMap;

use anyhow::Context;

use office_core::{
    Deregistration, ReferenceZone, RegisterOutcome, RegisterRequest, Registration, Transition,
};
use office_discord::{Interaction, InteractionKind, InteractionResponse, Invoker};

use crate::cli::Feedback;
use crate::context::AppContext;
use crate::panel::{
    CMD_REMOVE, CMD_SETUP, FIELD_END, FIELD_NOTE, FIELD_START, JOIN_BUTTON, JOIN_MODAL,
    LEAVE_BUTTON, join_modal,
};
use crate::sync::{refresh_panels, remove_panel, setup_panel};

const FAILURE_REPLY: &str = "Something went wrong. Please try again in a moment.";
const ALREADY_REGISTERED_REPLY: &str =
    "You are already registered. Press \"Leave\" first to register again.";
const NOT_REGISTERED_REPLY: &str = "You are not registered.";

pub async fn handle_interaction(ctx: &AppContext, interaction: Interaction) {
    if let Err(e) = dispatch(ctx, &interaction).await {
        tracing::warn!(interaction_id = %interaction.id, "interaction failed: {e:#}");
        let reply = InteractionResponse::Ephemeral(FAILURE_REPLY.to_string());
        if let Err(e) = ctx.platform.respond_to(&interaction, &reply).await {
            tracing::debug!(interaction_id = %interaction.id, "failure reply not delivered: {e}");
        }
    }
}

async fn dispatch(ctx: &AppContext, interaction: &Interaction) -> anyhow::Result<()> {
    match &interaction.kind {
        InteractionKind::Command { name } => on_command(ctx, interaction, name).await,
        InteractionKind::Button { custom_id } if custom_id == JOIN_BUTTON => {
            respond(ctx, interaction, join_modal()).await
        }
        InteractionKind::Button { custom_id } if custom_id == LEAVE_BUTTON => {
            on_leave(ctx, interaction).await
        }
        InteractionKind::ModalSubmit { custom_id, fields } if custom_id == JOIN_MODAL => {
            on_join(ctx, interaction, fields).await
        }
        other => {
            tracing::debug!(interaction_id = %interaction.id, ?other, "ignoring interaction");
            Ok(())
        }
    }
}

async fn on_command(ctx: &AppContext, interaction: &Interaction, name: &str) -> anyhow::Result<()> {
    let channel_id = interaction
        .channel_id
        .as_deref()
        .context("command invoked outside a channel")?;

    let text = match name {
        CMD_SETUP => {
            setup_panel(ctx, channel_id).await?;
            "Office panel posted. It will stay up to date."
        }
        CMD_REMOVE => {
            if remove_panel(ctx, channel_id).await? {
                "Panel removed. The message stays but is no longer updated."
            } else {
                "This channel has no office panel."
            }
        }
        other => {
            tracing::debug!(command = other, "unknown command");
            "Unknown command."
        }
    };
    respond(ctx, interaction, InteractionResponse::Ephemeral(text.to_string())).await
}

async fn on_join(
    ctx: &AppContext,
    interaction: &Interaction,
    fields: &BTreeMap<String, String>,
) -> anyhow::Result<()> {
    let invoker = invoker(interaction)?;
    let request = RegisterRequest {
        user_id: invoker.user_id.clone(),
        display_name: invoker.display_name.clone(),
        planned_start: fields.get(FIELD_START).cloned(),
        expected_end: fields.get(FIELD_END).cloned(),
        note: fields.get(FIELD_NOTE).cloned(),
    };
    let engine = ctx.engine;
    let now = ctx.now();
    let registration = match ctx
        .with_store(move |store| engine.register(store, &request, now))
        .await
    {
        Ok(registration) => registration,
        Err(e) => {
            // A stale entry may have been closed before the failure.
            settle(ctx, e.transitions()).await;
            return Err(e.into());
        }
    };

    if !registration.ignored.is_empty() {
        tracing::debug!(
            user_id = %invoker.user_id,
            ignored = ?registration.ignored,
            "malformed time fields ignored"
        );
    }
    let reply = join_reply(ctx.feedback, &registration, engine.zone());
    if let Err(e) = respond(ctx, interaction, reply).await {
        tracing::warn!(interaction_id = %interaction.id, "join reply not delivered: {e:#}");
    }
    settle(ctx, &registration.transitions).await;
    Ok(())
}

async fn on_leave(ctx: &AppContext, interaction: &Interaction) -> anyhow::Result<()> {
    let user_id = invoker(interaction)?.user_id.clone();
    let engine = ctx.engine;
    let now = ctx.now();
    let outcome = ctx
        .with_store(move |store| engine.deregister(store, &user_id, now))
        .await?;

    let reply = match (&outcome, ctx.feedback) {
        (Deregistration::NotRegistered, _) => {
            InteractionResponse::Ephemeral(NOT_REGISTERED_REPLY.to_string())
        }
        (Deregistration::Left { .. }, Feedback::Quiet) => InteractionResponse::DeferredUpdate,
        (Deregistration::Left { history }, Feedback::Verbose) => InteractionResponse::Ephemeral(
            format!(
                "Checked out at {}. See you next time!",
                engine.zone().format(history.ended_at)
            ),
        ),
    };
    if let Err(e) = respond(ctx, interaction, reply).await {
        tracing::warn!(interaction_id = %interaction.id, "leave reply not delivered: {e:#}");
    }

    if let Deregistration::Left { history } = outcome {
        settle(ctx, &[Transition::Left { history }]).await;
    }
    Ok(())
}

/// Notify and refresh after a mutation. Failures here are logged only:
/// the user already has their reply.
async fn settle(ctx: &AppContext, transitions: &[Transition]) {
    if transitions.is_empty() {
        return;
    }
    ctx.notifier.emit(&*ctx.platform, transitions).await;
    if let Err(e) = refresh_panels(ctx).await {
        tracing::warn!("panel refresh after action failed: {e}");
    }
}

fn join_reply(feedback: Feedback, registration: &Registration, zone: ReferenceZone) -> InteractionResponse {
    let entry = match (&registration.outcome, feedback) {
        (RegisterOutcome::AlreadyActive, _) => {
            return InteractionResponse::Ephemeral(ALREADY_REGISTERED_REPLY.to_string());
        }
        (RegisterOutcome::Registered { .. }, Feedback::Quiet) => {
            return InteractionResponse::DeferredUpdate;
        }
        (RegisterOutcome::Registered { entry, .. }, Feedback::Verbose) => entry,
    };

    let end = entry
        .expected_end
        .map_or_else(|| office_core::render::UNSET.to_string(), |t| zone.format(t));
    let mut text = if entry.planned_start.is_some() {
        format!(
            "Scheduled: arriving {} / expected end {end}.",
            zone.format(entry.start)
        )
    } else {
        format!("Checked in at {} / expected end {end}.", zone.format(entry.start))
    };
    for field in &registration.ignored {
        text.push_str(&format!(
            "\nThe {} was not a valid time (use HH:MM) and was left unset.",
            field.as_str()
        ));
    }
    InteractionResponse::Ephemeral(text)
}

fn invoker(interaction: &Interaction) -> anyhow::Result<&Invoker> {
    interaction
        .invoker
        .as_ref()
        .context("interaction carries no user")
}

async fn respond(
    ctx: &AppContext,
    interaction: &Interaction,
    response: InteractionResponse,
) -> anyhow::Result<()> {
    ctx.platform
        .respond_to(interaction, &response)
        .await
        .context("interaction callback failed")
}
