//! Meta module: commands about the bot itself.

use std::time::Instant;

use chrono::Utc;
use rand::seq::SliceRandom;

use super::errors::error_embed;
use super::{CommandError, Context, find, in_module};
use crate::embed::Embed;
use crate::modules::Module;
use crate::stats::{self, format_span};
use crate::status::{RESET_STATUS, Status, with_commas};

const PING_TITLES: [&str; 2] = ["🏓 Pong", "🏓 Ping"];
const RICKROLL: &str = "https://media.giphy.com/media/lgcUUCXgC8mEo/giphy.gif";
/// Custom prefixes must be shorter than this many characters.
const MAX_PREFIX_CHARS: usize = 10;

pub async fn setstatus(ctx: &Context<'_>, args: &str) -> Result<(), CommandError> {
    let template = if args.is_empty() { RESET_STATUS } else { args };
    let status = Status::new(template)?;
    *ctx.state.status.lock() = status;
    ctx.state.status_refresh.notify_one();
    tracing::info!(template, "Status changed");
    ctx.say(&format!("Set status to `{template}`")).await?;
    Ok(())
}

pub async fn update(ctx: &Context<'_>) -> Result<(), CommandError> {
    ctx.state.status_refresh.notify_one();
    ctx.say("Updated all schedules").await?;
    Ok(())
}

pub async fn help(ctx: &Context<'_>, args: &str) -> Result<(), CommandError> {
    let wanted: Vec<&str> = args.split_whitespace().collect();
    let prefix = &ctx.prefix;

    let embed = match wanted.as_slice() {
        [] => {
            let loaded: Vec<Module> = ctx.state.modules.lock().loaded().collect();
            let mut embed = Embed::new()
                .author(ctx.author)
                .title("🔧 Module List")
                .description(format!(
                    "Do `{prefix}help [module]` for more info on a specific module."
                ))
                .timestamp(Utc::now());
            for module in loaded.into_iter().filter(Module::listed_in_help) {
                embed = embed.field(module.name(), module.description(), false);
            }
            embed
        }
        [name] => match loaded_module(ctx, name) {
            Some(module) => {
                let mut embed = Embed::new()
                    .author(ctx.author)
                    .title(format!("🚧 {} Command List", module.name()))
                    .description(format!(
                        "{} - {}\nDo `{prefix}help [command]` for more info on a command",
                        module.name(),
                        module.description()
                    ))
                    .timestamp(Utc::now());
                for spec in in_module(module).filter(|c| !c.hidden) {
                    embed = embed.field(format!("`{}`", spec.usage()), spec.help, false);
                }
                if let Some(msgid) = ctx.msgid {
                    ctx.handle.react(ctx.reply_target(), "👍", msgid).await?;
                }
                embed
            }
            None => match find(name).filter(|c| ctx.state.modules.lock().is_loaded(c.module)) {
                Some(spec) => {
                    let aliases = if spec.aliases.is_empty() {
                        "No Aliases".to_string()
                    } else {
                        spec.aliases.join(", ")
                    };
                    Embed::new()
                        .author(ctx.author)
                        .title("🔧 Command Syntax")
                        .description("H.A.R.P.E.R.'s commands and how to use them.")
                        .field(
                            format!("{} - {}", spec.name, spec.help),
                            format!("Proper Syntax:\n`{}`", spec.usage()),
                            false,
                        )
                        .field("Command Aliases", aliases, false)
                        .timestamp(Utc::now())
                }
                None => Embed::new()
                    .title("⛔ Error!")
                    .description(format!(
                        "How would you even use the command or module \"{name}\"?\n\
                         Sorry, but I don't see a command or module called \"{name}\""
                    ))
                    .timestamp(Utc::now()),
            },
        },
        _ => Embed::new()
            .author(ctx.author)
            .title("⛔ Error!")
            .description("That is way too many modules!")
            .timestamp(Utc::now()),
    };
    ctx.send_embed(&embed).await?;
    Ok(())
}

fn loaded_module(ctx: &Context<'_>, name: &str) -> Option<Module> {
    Module::from_name(name).filter(|m| ctx.state.modules.lock().is_loaded(*m))
}

pub async fn prefix(ctx: &Context<'_>, args: &str) -> Result<(), CommandError> {
    let Some(channel) = ctx.channel else {
        return Err(CommandError::PrivateMessageOnly);
    };

    if args.chars().count() >= MAX_PREFIX_CHARS {
        let embed = error_embed(ctx).field(
            "Too many characters!",
            format!(
                "{}, your custom prefix is equal to or has over {MAX_PREFIX_CHARS} characters.",
                ctx.author
            ),
            false,
        );
        ctx.send_embed(&embed).await?;
        return Ok(());
    }

    let new_prefix = if args.is_empty() {
        ctx.state.db.clear_prefix(channel)?;
        ctx.state.config.default_prefix.clone()
    } else {
        ctx.state.db.set_prefix(channel, args)?;
        args.to_string()
    };
    tracing::info!(channel, prefix = %new_prefix, "Prefix changed");

    ctx.say(&format!(
        "Set the custom prefix to `{new_prefix}`\n\
         Do `{new_prefix}prefix` to set it back to the default prefix.\n\
         Ping {} to check the current prefix.",
        ctx.bot_nick()
    ))
    .await?;
    Ok(())
}

pub async fn stats(ctx: &Context<'_>) -> Result<(), CommandError> {
    let bot = ctx.bot_nick();
    let (channels, members) = {
        let roster = ctx.state.roster.lock();
        (roster.channel_count(), roster.unique_members())
    };
    let process = stats::probe(ctx.state.started);
    let title = pick_ping_title();
    let latency = latency_lines(ctx);

    let embed = Embed::new()
        .author(&bot)
        .title("📊 Stats")
        .description(format!("List of {bot}'s statistics"))
        .field(
            "🔢 Channel Count",
            format!("Working in {} channels.", with_commas(channels)),
            true,
        )
        .field(
            "👥 Member Count",
            format!("Serving {} members.", with_commas(members)),
            true,
        )
        .field("🌐 Version", format!("Version {}", ctx.state.config.version), true)
        .field(
            "💬 Channel Prefix",
            format!("This channel's prefix is `{}`", ctx.prefix),
            true,
        )
        .field("🦀 Runtime", format!("{bot} runs on Rust (edition 2024)."), true)
        .field(
            "📜 SDK Version",
            format!("{bot} runs on harper-sdk {}.", harper_sdk::VERSION),
            true,
        )
        .field(title, latency, true)
        .field("⏰ Uptime", format_span(process.uptime).join("\n"), true)
        .field("💾 CPU Time", format_span(process.cpu_time).join("\n"), true)
        .field("⚙️ CPU Usage", format!("{:.1}%", process.cpu_percent), true)
        .field(
            "💽 Peak Memory",
            format!(
                "{:.3} / {} MiB ({:.0}%)",
                process.memory_peak_mib,
                with_commas(process.memory_total_mib.round() as usize),
                process.memory_percent()
            ),
            true,
        )
        .footer(format!("{} | {bot}", ctx.state.config.owner_label()))
        .timestamp(Utc::now());
    ctx.send_embed(&embed).await?;
    Ok(())
}

pub async fn ping(ctx: &Context<'_>) -> Result<(), CommandError> {
    let embed = Embed::new()
        .author(ctx.bot_nick())
        .field(pick_ping_title(), latency_lines(ctx), false)
        .timestamp(Utc::now());
    ctx.send_embed(&embed).await?;
    Ok(())
}

fn pick_ping_title() -> &'static str {
    PING_TITLES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(PING_TITLES[0])
}

/// Server round trip and time spent on this command so far.
fn latency_lines(ctx: &Context<'_>) -> String {
    let server = match ctx.handle.latency() {
        Some(rtt) => format!("{:.3}ms", rtt.as_secs_f64() * 1000.0),
        None => "not measured yet".to_string(),
    };
    let command = Instant::now().saturating_duration_since(ctx.received);
    format!(
        "Server Latency: {server}\nCommand Latency: {:.3}ms",
        command.as_secs_f64() * 1000.0
    )
}

pub async fn logout(ctx: &Context<'_>) -> Result<(), CommandError> {
    let bot = ctx.bot_nick();
    ctx.say(&format!(":wave: Goodbye {}! I'm shutting dow...", ctx.author))
        .await?;
    tracing::info!(by = ctx.author, "Logging out");
    ctx.handle
        .quit(Some(&format!("{bot} was logged out.")))
        .await?;
    ctx.state.request_stop();
    Ok(())
}

/// Reply to a non-owner trying `logout`.
pub async fn logout_denied(ctx: &Context<'_>) -> anyhow::Result<()> {
    let embed = Embed::new()
        .author(ctx.author)
        .field(
            "You Silly Billy 😜",
            "You thought you can actually use the logout command!",
            false,
        )
        .image(RICKROLL)
        .timestamp(Utc::now());
    ctx.send_embed(&embed).await
}

pub async fn about(ctx: &Context<'_>) -> Result<(), CommandError> {
    ctx.say("H.A.R.P.E.R. Homework Assistant Robot Personal Experimental Resource")
        .await?;
    Ok(())
}

pub async fn load(ctx: &Context<'_>, args: &str) -> Result<(), CommandError> {
    let name = module_arg(args)?;
    ctx.state.modules.lock().load(name)?;
    ctx.say(&format!("`{name} loaded successfully.`")).await?;
    Ok(())
}

pub async fn unload(ctx: &Context<'_>, args: &str) -> Result<(), CommandError> {
    let name = module_arg(args)?;
    ctx.state.modules.lock().unload(name)?;
    ctx.say(&format!("`{name} unloaded successfully.`")).await?;
    Ok(())
}

pub async fn reload(ctx: &Context<'_>, args: &str) -> Result<(), CommandError> {
    let name = module_arg(args)?;
    ctx.state.modules.lock().reload(name)?;
    ctx.say(&format!("`{name} reloaded successfully.`")).await?;
    Ok(())
}

fn module_arg(args: &str) -> Result<&str, CommandError> {
    if args.is_empty() {
        Err(CommandError::MissingArgument("module"))
    } else {
        Ok(args)
    }
}
