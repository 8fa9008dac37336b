//! Text commands: the command table, argument helpers and dispatch.
//!
//! Every command is described by a static [`CommandSpec`]. Dispatch runs
//! the command's check, then its cooldown, then the handler; any failure on
//! the way is handed to [`errors::on_command_error`].

pub mod errors;
pub mod homework;
pub mod meta;

use std::time::{Duration, Instant};

use harper_sdk::client::ClientHandle;

use crate::bot::BotState;
use crate::cooldown::{BucketType, Cooldown};
use crate::embed::Embed;
use crate::modules::{Module, ModuleError};
use crate::quadratic::DomainError;
use crate::status::InvalidActivity;

/// Longest line sent in one PRIVMSG; longer lines are wrapped.
const MAX_LINE: usize = 400;

/// Who may run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Anyone,
    /// Nicks listed as owners in the configuration.
    Owner,
    /// Operators of the channel the command was sent in.
    Admin,
}

/// Handler a command dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SetStatus,
    Update,
    Help,
    Prefix,
    Stats,
    Ping,
    Logout,
    About,
    Load,
    Unload,
    Reload,
    Download,
    ConfigHomework,
    Quadratics,
    Wolfram,
}

#[derive(Debug)]
pub struct CommandSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub module: Module,
    /// Argument synopsis, e.g. `<a> <b> <c>`.
    pub signature: &'static str,
    pub help: &'static str,
    /// Left out of module listings in `help`.
    pub hidden: bool,
    pub check: Check,
    pub cooldown: Option<Cooldown>,
    pub action: Action,
}

impl CommandSpec {
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    /// `name signature`, or just the name when the command takes no arguments.
    pub fn usage(&self) -> String {
        if self.signature.is_empty() {
            self.name.to_string()
        } else {
            format!("{} {}", self.name, self.signature)
        }
    }
}

pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "setstatus",
        aliases: &["status"],
        module: Module::Meta,
        signature: "[status]",
        help: "Change bot status",
        hidden: true,
        check: Check::Owner,
        cooldown: Some(Cooldown::new(1, 5, BucketType::User)),
        action: Action::SetStatus,
    },
    CommandSpec {
        name: "update",
        aliases: &[],
        module: Module::Meta,
        signature: "",
        help: "Update schedules",
        hidden: true,
        check: Check::Owner,
        cooldown: Some(Cooldown::new(1, 5, BucketType::User)),
        action: Action::Update,
    },
    CommandSpec {
        name: "help",
        aliases: &[],
        module: Module::Meta,
        signature: "[module...]",
        help: "Displays this message",
        hidden: true,
        check: Check::Anyone,
        cooldown: Some(Cooldown::new(2, 5, BucketType::User)),
        action: Action::Help,
    },
    CommandSpec {
        name: "prefix",
        aliases: &["change_prefix"],
        module: Module::Meta,
        signature: "[new_prefix]",
        help: "Set a custom prefix for this channel",
        hidden: false,
        check: Check::Admin,
        cooldown: Some(Cooldown::new(1, 10, BucketType::Channel)),
        action: Action::Prefix,
    },
    CommandSpec {
        name: "stats",
        aliases: &["statistics", "info"],
        module: Module::Meta,
        signature: "",
        help: "Displays statistics",
        hidden: false,
        check: Check::Anyone,
        cooldown: Some(Cooldown::new(1, 8, BucketType::User)),
        action: Action::Stats,
    },
    CommandSpec {
        name: "ping",
        aliases: &["latency"],
        module: Module::Meta,
        signature: "",
        help: "Returns the server latency",
        hidden: false,
        check: Check::Anyone,
        cooldown: Some(Cooldown::new(1, 5, BucketType::User)),
        action: Action::Ping,
    },
    CommandSpec {
        name: "logout",
        aliases: &["close", "disconnect"],
        module: Module::Meta,
        signature: "",
        help: "This command disconnects the bot from all services.",
        hidden: true,
        check: Check::Owner,
        cooldown: None,
        action: Action::Logout,
    },
    CommandSpec {
        name: "about",
        aliases: &[],
        module: Module::Meta,
        signature: "",
        help: "What H.A.R.P.E.R. stands for",
        hidden: false,
        check: Check::Anyone,
        cooldown: None,
        action: Action::About,
    },
    CommandSpec {
        name: "load",
        aliases: &[],
        module: Module::Meta,
        signature: "<module>",
        help: "Module loader",
        hidden: true,
        check: Check::Owner,
        cooldown: None,
        action: Action::Load,
    },
    CommandSpec {
        name: "unload",
        aliases: &[],
        module: Module::Meta,
        signature: "<module>",
        help: "Module unloader",
        hidden: true,
        check: Check::Owner,
        cooldown: None,
        action: Action::Unload,
    },
    CommandSpec {
        name: "reload",
        aliases: &[],
        module: Module::Meta,
        signature: "<module>",
        help: "Module reloader. Unload then reload",
        hidden: true,
        check: Check::Owner,
        cooldown: None,
        action: Action::Reload,
    },
    CommandSpec {
        name: "download",
        aliases: &["d"],
        module: Module::Homework,
        signature: "<day> [page=1] <urls...>",
        help: "Save homework files under your configured name and topic",
        hidden: false,
        check: Check::Owner,
        cooldown: None,
        action: Action::Download,
    },
    CommandSpec {
        name: "config_homework",
        aliases: &["conf-hw"],
        module: Module::Homework,
        signature: "<new_topic> <new_name>",
        help: "Set the name and topic used for saved homework",
        hidden: false,
        check: Check::Owner,
        cooldown: None,
        action: Action::ConfigHomework,
    },
    CommandSpec {
        name: "quadratics",
        aliases: &["quadratic"],
        module: Module::Homework,
        signature: "<a> <b> <c>",
        help: "Solve and plot ax^2 + bx + c",
        hidden: false,
        check: Check::Anyone,
        cooldown: None,
        action: Action::Quadratics,
    },
    CommandSpec {
        name: "wolfram",
        aliases: &["wlfram"],
        module: Module::Homework,
        signature: "<question>",
        help: "Ask Wolfram|Alpha a question",
        hidden: false,
        check: Check::Anyone,
        cooldown: Some(Cooldown::new(1, 10, BucketType::User)),
        action: Action::Wolfram,
    },
];

/// Look a command up by name or alias, ignoring case.
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|c| c.matches(name))
}

/// Commands belonging to `module`, in table order.
pub fn in_module(module: Module) -> impl Iterator<Item = &'static CommandSpec> {
    COMMANDS.iter().filter(move |c| c.module == module)
}

/// Why a command did not complete.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0} is a required argument that is missing.")]
    MissingArgument(&'static str),
    #[error("{0}")]
    BadArgument(String),
    #[error("You do not own this bot.")]
    NotOwner,
    #[error("You are missing Administrator permission(s) to run this command.")]
    MissingPermissions,
    #[error("This command cannot be used in private messages.")]
    PrivateMessageOnly,
    #[error("You are on cooldown. Try again in {:.2}s", .0.as_secs_f64())]
    OnCooldown(Duration),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error(transparent)]
    Status(#[from] InvalidActivity),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CommandError {
    pub fn is_check_failure(&self) -> bool {
        matches!(
            self,
            CommandError::NotOwner | CommandError::MissingPermissions | CommandError::PrivateMessageOnly
        )
    }
}

/// Everything a handler needs about the message that invoked it.
pub struct Context<'a> {
    pub state: &'a BotState,
    pub handle: &'a ClientHandle,
    pub author: &'a str,
    /// `None` for private messages.
    pub channel: Option<&'a str>,
    /// IRCv3 `msgid` of the invoking message, if the server sent one.
    pub msgid: Option<&'a str>,
    /// Prefix in effect where the message was sent.
    pub prefix: String,
    pub received: Instant,
}

impl Context<'_> {
    /// Where replies go: the channel, or the author for private messages.
    pub fn reply_target(&self) -> &str {
        self.channel.unwrap_or(self.author)
    }

    pub fn bot_nick(&self) -> String {
        self.state.bot_nick()
    }

    /// Send `text`, one PRIVMSG per line.
    pub async fn say(&self, text: &str) -> anyhow::Result<()> {
        for line in text.lines() {
            for chunk in wrap_line(line, MAX_LINE) {
                self.handle.privmsg(self.reply_target(), chunk).await?;
            }
        }
        Ok(())
    }

    pub async fn send_embed(&self, embed: &Embed) -> anyhow::Result<()> {
        for line in embed.render() {
            self.say(&line).await?;
        }
        Ok(())
    }
}

/// Split one line into chunks of at most `max` bytes on char boundaries,
/// preferring to break at spaces.
fn wrap_line(line: &str, max: usize) -> Vec<&str> {
    if line.is_empty() {
        return vec![" "];
    }
    let mut chunks = Vec::new();
    let mut rest = line;
    while rest.len() > max {
        let mut cut = max;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if let Some(space) = rest[..cut].rfind(' ')
            && space > 0
        {
            cut = space;
        }
        chunks.push(&rest[..cut]);
        rest = rest[cut..].trim_start();
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }
    chunks
}

/// Run `spec` for the message in `ctx`, reporting any failure.
pub async fn invoke(ctx: &Context<'_>, spec: &'static CommandSpec, args: &str) -> anyhow::Result<()> {
    tracing::info!(
        command = spec.name,
        author = ctx.author,
        channel = ctx.channel.unwrap_or("(private)"),
        "Command invoked"
    );
    let result = match prepare(ctx, spec) {
        Ok(()) => run(ctx, spec, args).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => Ok(()),
        Err(CommandError::NotOwner) if spec.action == Action::Logout => meta::logout_denied(ctx).await,
        Err(err) => errors::on_command_error(ctx, spec, err).await,
    }
}

fn prepare(ctx: &Context<'_>, spec: &CommandSpec) -> Result<(), CommandError> {
    match spec.check {
        Check::Anyone => {}
        Check::Owner => {
            if !ctx.state.config.is_owner(ctx.author) {
                return Err(CommandError::NotOwner);
            }
        }
        Check::Admin => {
            let Some(channel) = ctx.channel else {
                return Err(CommandError::PrivateMessageOnly);
            };
            if !ctx.state.roster.lock().is_operator(channel, ctx.author) {
                return Err(CommandError::MissingPermissions);
            }
        }
    }
    if let Some(cooldown) = spec.cooldown {
        let key = cooldown.bucket.key(ctx.author, ctx.channel);
        if let Some(retry) = ctx.state.rate_limit(spec.name, &key, ctx.received) {
            return Err(CommandError::OnCooldown(retry));
        }
    }
    Ok(())
}

async fn run(ctx: &Context<'_>, spec: &CommandSpec, args: &str) -> Result<(), CommandError> {
    match spec.action {
        Action::SetStatus => meta::setstatus(ctx, args).await,
        Action::Update => meta::update(ctx).await,
        Action::Help => meta::help(ctx, args).await,
        Action::Prefix => meta::prefix(ctx, args).await,
        Action::Stats => meta::stats(ctx).await,
        Action::Ping => meta::ping(ctx).await,
        Action::Logout => meta::logout(ctx).await,
        Action::About => meta::about(ctx).await,
        Action::Load => meta::load(ctx, args).await,
        Action::Unload => meta::unload(ctx, args).await,
        Action::Reload => meta::reload(ctx, args).await,
        Action::Download => homework::download(ctx, args).await,
        Action::ConfigHomework => homework::config_homework(ctx, args).await,
        Action::Quadratics => homework::quadratics(ctx, args).await,
        Action::Wolfram => homework::wolfram(ctx, args).await,
    }
}

/// Next whitespace-separated argument, or a missing-argument error naming `param`.
pub(crate) fn required<'a>(
    args: &mut std::str::SplitWhitespace<'a>,
    param: &'static str,
) -> Result<&'a str, CommandError> {
    args.next().ok_or(CommandError::MissingArgument(param))
}

/// Parse a numeric argument.
pub(crate) fn number(value: &str, param: &str) -> Result<f64, CommandError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            CommandError::BadArgument(format!(
                "Converting to a number failed for parameter \"{param}\"."
            ))
        })
}
