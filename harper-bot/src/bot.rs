//! Bot state and event handling.
//!
//! [`BotState`] is shared by the event handler and the status rotation task.
//! Locks are `parking_lot` mutexes and are never held across an await.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Timelike, Utc};
use harper_sdk::client::{ClientHandle, Flow};
use harper_sdk::event::Event;
use harper_sdk::irc::is_channel;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::commands::{self, COMMANDS, Context};
use crate::config::Config;
use crate::cooldown::{BucketType, Cooldown, CooldownMapping};
use crate::db::Db;
use crate::modules::{Module, Modules};
use crate::prefix::{self, Parsed};
use crate::ready::Ready;
use crate::roster::Roster;
use crate::status::{Status, StatusContext};
use crate::wolfram::WolframClient;

/// Rate limit on the "what's my prefix" mention reply.
const MENTION_COOLDOWN: Cooldown = Cooldown::new(1, 5, BucketType::User);

pub struct BotState {
    pub config: Config,
    pub db: Db,
    pub roster: Mutex<Roster>,
    pub status: Mutex<Status>,
    pub modules: Mutex<Modules>,
    pub ready: Mutex<Ready>,
    /// When the process came up, for uptime.
    pub started: Instant,
    /// Wakes the status rotation task ahead of schedule.
    pub status_refresh: Notify,
    pub wolfram: Option<WolframClient>,
    pub http: reqwest::Client,
    nick: Mutex<String>,
    handle: Mutex<Option<ClientHandle>>,
    cooldowns: Mutex<HashMap<&'static str, CooldownMapping>>,
    mention_cooldown: Mutex<CooldownMapping>,
    online: AtomicBool,
    stopping: AtomicBool,
}

impl BotState {
    pub fn new(config: Config, db: Db) -> Self {
        let cooldowns = COMMANDS
            .iter()
            .filter_map(|c| c.cooldown.map(|cd| (c.name, CooldownMapping::new(cd))))
            .collect();
        let wolfram = config.wolfram_id.clone().map(WolframClient::new);
        Self {
            roster: Mutex::new(Roster::new(&config.nick)),
            nick: Mutex::new(config.nick.clone()),
            status: Mutex::new(Status::default()),
            modules: Mutex::new(Modules::default()),
            ready: Mutex::new(Ready::new(Module::ALL.iter().map(|m| m.name()))),
            started: Instant::now(),
            status_refresh: Notify::new(),
            wolfram,
            http: reqwest::Client::new(),
            handle: Mutex::new(None),
            cooldowns: Mutex::new(cooldowns),
            mention_cooldown: Mutex::new(CooldownMapping::new(MENTION_COOLDOWN)),
            online: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            config,
            db,
        }
    }

    /// The nick the server confirmed for us.
    pub fn bot_nick(&self) -> String {
        self.nick.lock().clone()
    }

    /// True once every module reported ready after the first registration.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    /// Ask the event loop to stop after the current event.
    pub fn request_stop(&self) {
        self.stopping.store(true, Ordering::Relaxed);
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Relaxed)
    }

    /// Prefix in effect for a channel (`None` for private messages).
    pub fn prefix_for(&self, channel: Option<&str>) -> String {
        let custom = match channel {
            Some(channel) => self.db.prefix(channel).unwrap_or_else(|e| {
                tracing::warn!(channel, error = %e, "Prefix lookup failed");
                None
            }),
            None => None,
        };
        custom.unwrap_or_else(|| self.config.default_prefix.clone())
    }

    /// Consume one use of `command`'s cooldown for `key`.
    pub fn rate_limit(&self, command: &str, key: &str, now: Instant) -> Option<Duration> {
        self.cooldowns
            .lock()
            .get_mut(command)
            .and_then(|mapping| mapping.update_rate_limit(key, now))
    }

    /// Consume one use of the per-user reply limit shared by mention replies
    /// and cooldown warnings. `Some(retry_after)` means stay quiet.
    pub fn reply_rate_limit(&self, nick: &str, channel: Option<&str>, now: Instant) -> Option<Duration> {
        let key = MENTION_COOLDOWN.bucket.key(nick, channel);
        self.mention_cooldown.lock().update_rate_limit(&key, now)
    }

    /// Values the status template is rendered with.
    fn status_text(&self) -> String {
        let nick = self.bot_nick();
        let (guilds, users) = {
            let roster = self.roster.lock();
            (roster.channel_count(), roster.unique_members())
        };
        let ctx = StatusContext {
            guilds,
            users,
            version: &self.config.version,
            nick: &nick,
        };
        self.status.lock().away_text(&ctx)
    }

    /// Publish the current status as our AWAY message.
    pub async fn publish_status(&self, handle: &ClientHandle) -> Result<()> {
        if !self.is_online() {
            return Ok(());
        }
        let text = self.status_text();
        handle.away(Some(&text)).await?;
        tracing::debug!(status = %text, "Status published");
        Ok(())
    }

    fn current_handle(&self) -> Option<ClientHandle> {
        self.handle.lock().clone()
    }
}

/// Handle one event from the connection.
pub async fn handle_event(state: &BotState, handle: ClientHandle, event: Event) -> Result<Flow> {
    state.roster.lock().apply(&event);

    match &event {
        Event::Connected => tracing::info!("Connected"),
        Event::Registered { nick } => {
            tracing::info!(nick = %nick, "Registered");
            *state.nick.lock() = nick.clone();
            *state.handle.lock() = Some(handle.clone());
            on_ready(state, &handle).await?;
        }
        Event::NickChanged { old_nick, new_nick } => {
            let mut current = state.nick.lock();
            if current.eq_ignore_ascii_case(old_nick) {
                *current = new_nick.clone();
            }
        }
        Event::Joined { channel, nick } if nick.eq_ignore_ascii_case(&state.bot_nick()) => {
            tracing::info!(channel = %channel, "Joined");
        }
        Event::Kicked { channel, nick, by, reason } if nick.eq_ignore_ascii_case(&state.bot_nick()) => {
            tracing::warn!(channel = %channel, by = %by, reason = %reason, "Kicked");
        }
        Event::Invited { channel, by } => {
            tracing::info!(channel = %channel, by = %by, "Invited, joining");
            handle.join(channel).await?;
        }
        Event::Message {
            from,
            target,
            text,
            tags,
        } => {
            let msgid = tags.get("msgid").map(String::as_str);
            handle_message(state, &handle, from, target, text, msgid).await?;
        }
        Event::ServerNotice { text } => tracing::debug!(notice = %text, "Server notice"),
        Event::Disconnected { reason } => {
            tracing::warn!(reason = %reason, "Disconnected");
            *state.handle.lock() = None;
        }
        _ => {}
    }

    Ok(if state.is_stopping() {
        Flow::Stop
    } else {
        Flow::Continue
    })
}

/// Mark every module ready and, the first time, bring the bot online.
async fn on_ready(state: &BotState, handle: &ClientHandle) -> Result<()> {
    let all_ready = {
        let mut ready = state.ready.lock();
        for module in Module::ALL {
            ready.ready_up(module.name());
        }
        ready.all_ready()
    };
    if all_ready && !state.online.swap(true, Ordering::Relaxed) {
        tracing::info!("H.A.R.P.E.R. is online and ready to go!");
    }
    state.publish_status(handle).await
}

async fn handle_message(
    state: &BotState,
    handle: &ClientHandle,
    from: &str,
    target: &str,
    text: &str,
    msgid: Option<&str>,
) -> Result<()> {
    let nick = state.bot_nick();
    // echo-message sends our own lines back
    if from.eq_ignore_ascii_case(&nick) {
        return Ok(());
    }

    let received = Instant::now();
    let channel = is_channel(target).then_some(target);
    let prefix = state.prefix_for(channel);

    match prefix::parse(text, &nick, &prefix) {
        Parsed::Other => Ok(()),
        Parsed::Mention => {
            let reply_to = channel.unwrap_or(from);
            match state.reply_rate_limit(from, channel, received) {
                Some(retry) => {
                    handle
                        .privmsg(
                            reply_to,
                            &format!(
                                "Slow Down {from}! Please wait {:.3} seconds.",
                                retry.as_secs_f64()
                            ),
                        )
                        .await
                }
                None => {
                    handle
                        .privmsg(reply_to, &format!("Hey {from}! My prefix here is `{prefix}`"))
                        .await?;
                    handle
                        .privmsg(reply_to, &format!("Do `{prefix}help` to get started."))
                        .await
                }
            }
        }
        Parsed::Command { name, args } => {
            let Some(spec) = commands::find(name) else {
                tracing::debug!(command = name, "Unknown command");
                return Ok(());
            };
            if !state.modules.lock().is_loaded(spec.module) {
                tracing::debug!(command = spec.name, module = spec.module.name(), "Module not loaded");
                return Ok(());
            }
            let ctx = Context {
                state,
                handle,
                author: from,
                channel,
                msgid,
                prefix,
                received,
            };
            commands::invoke(&ctx, spec, args).await
        }
    }
}

/// Time left until the next whole minute.
pub fn until_next_minute(now: DateTime<Utc>) -> Duration {
    let into_minute = Duration::from_secs(u64::from(now.second()))
        + Duration::from_nanos(u64::from(now.nanosecond() % 1_000_000_000));
    Duration::from_secs(60).saturating_sub(into_minute)
}

/// Publish the status at second 0 of every minute and whenever
/// [`BotState::status_refresh`] is notified. Runs until the process exits.
pub async fn run_status_rotation(state: Arc<BotState>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(until_next_minute(Utc::now())) => {}
            _ = state.status_refresh.notified() => {}
        }
        let Some(handle) = state.current_handle() else {
            continue;
        };
        if let Err(e) = state.publish_status(&handle).await {
            tracing::warn!(error = %e, "Failed to publish status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_minute_boundary() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 45).unwrap();
        assert_eq!(until_next_minute(at), Duration::from_secs(15));
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(until_next_minute(at), Duration::from_secs(60));
    }

    #[test]
    fn prefix_falls_back_to_default() {
        let state = BotState::new(Config::default(), Db::open_memory().unwrap());
        assert_eq!(state.prefix_for(Some("#math")), ".");
        state.db.set_prefix("#math", "!").unwrap();
        assert_eq!(state.prefix_for(Some("#MATH")), "!");
        assert_eq!(state.prefix_for(None), ".");
    }

    #[test]
    fn commands_without_cooldown_are_never_limited() {
        let state = BotState::new(Config::default(), Db::open_memory().unwrap());
        let now = Instant::now();
        for _ in 0..5 {
            assert!(state.rate_limit("about", "alice", now).is_none());
        }
        assert!(state.rate_limit("ping", "alice", now).is_none());
        assert!(state.rate_limit("ping", "alice", now).is_some());
    }

    #[test]
    fn reply_limit_is_per_user() {
        let state = BotState::new(Config::default(), Db::open_memory().unwrap());
        let now = Instant::now();
        assert!(state.reply_rate_limit("bob", Some("#math"), now).is_none());
        assert!(state.reply_rate_limit("BOB", None, now).is_some());
        assert!(state.reply_rate_limit("alice", Some("#math"), now).is_none());
        let later = now + Duration::from_secs(5);
        assert!(state.reply_rate_limit("bob", Some("#math"), later).is_none());
    }
}
