//! Replies for failed commands.

use chrono::Utc;

use super::{CommandError, CommandSpec, Context};
use crate::cooldown::describe_retry;
use crate::embed::Embed;
use crate::modules::Module;

/// The red error card every failure reply starts from.
pub fn error_embed(ctx: &Context<'_>) -> Embed {
    Embed::new()
        .author(ctx.author)
        .title("⛔ Error!")
        .description(format!(
            "Sorry {}, but {} found an error.",
            ctx.author,
            ctx.bot_nick()
        ))
        .timestamp(Utc::now())
}

/// Report `err` from `spec` to the user.
///
/// Everything is logged; replies are only sent while the Errors module is
/// loaded. Cooldown warnings share the per-user mention reply limit, so a
/// user hammering a command hears about it at most once per window.
pub async fn on_command_error(
    ctx: &Context<'_>,
    spec: &CommandSpec,
    err: CommandError,
) -> anyhow::Result<()> {
    match &err {
        CommandError::OnCooldown(_) => {
            tracing::debug!(command = spec.name, author = ctx.author, "On cooldown")
        }
        e if e.is_check_failure() => {
            tracing::info!(command = spec.name, author = ctx.author, error = %e, "Check failed")
        }
        e => tracing::warn!(command = spec.name, author = ctx.author, error = %e, "Command failed"),
    }

    if !ctx.state.modules.lock().is_loaded(Module::Errors) {
        return Ok(());
    }

    if let CommandError::OnCooldown(retry_after) = err {
        if ctx
            .state
            .reply_rate_limit(ctx.author, ctx.channel, ctx.received)
            .is_some()
        {
            tracing::debug!(author = ctx.author, "Cooldown warning suppressed");
            return Ok(());
        }
        return ctx
            .say(&format!(
                "Slow down {}! You must wait {} to use this command!",
                ctx.author,
                describe_retry(retry_after)
            ))
            .await;
    }

    let embed = error_embed(ctx).field(
        format!("Error in {}", spec.name),
        format!("`{}`\n{err}", spec.usage()),
        false,
    );
    ctx.send_embed(&embed).await
}
