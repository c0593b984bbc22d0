//! `office-tracker register-commands`: PUT the guild command set.

use std::time::Duration;

use office_discord::RestClient;

use crate::config::Settings;
use crate::panel::commands;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn cmd_register(settings: &Settings) -> anyhow::Result<()> {
    let token = settings.token()?;
    let application_id = settings.application_id()?;
    let guild_id = settings.guild_id()?;

    let rest = RestClient::new(token, REQUEST_TIMEOUT)?;
    let specs = commands();
    rest.register_guild_commands(application_id, guild_id, &specs)
        .await?;

    tracing::info!(guild_id, count = specs.len(), "guild commands registered");
    for spec in &specs {
        println!("/{} - {}", spec.name, spec.description);
    }
    Ok(())
}
