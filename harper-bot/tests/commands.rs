//! Command acceptance tests: events go into the dispatcher, IRC commands
//! come out of a bare command channel.
//!
//! Tests cover:
//! - The quadratic reply, its plot, and domain/argument errors
//! - Prefix changes, the length limit, and the operator check
//! - Mentions and their cooldown
//! - help output for modules, commands and bad requests
//! - Owner-only commands, logout, and module load/unload
//! - Homework profiles and invites

use std::collections::HashMap;
use std::sync::Arc;

use harper_bot::bot::{BotState, handle_event};
use harper_bot::config::Config;
use harper_bot::db::Db;
use harper_bot::embed::strip_formatting;
use harper_sdk::client::{ClientHandle, Command, Flow};
use harper_sdk::event::Event;
use tokio::sync::mpsc;

const OWNER: &str = "guhbean";
const OTHER_OWNER: &str = "ada";

struct Harness {
    state: Arc<BotState>,
    handle: ClientHandle,
    rx: mpsc::Receiver<Command>,
    _dir: tempfile::TempDir,
}

impl Harness {
    /// A registered bot sitting in `#math`, where alice is an operator.
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            owners: vec![OWNER.to_string(), OTHER_OWNER.to_string()],
            images_dir: dir.path().join("images"),
            homework_dir: dir.path().join("homework"),
            ..Default::default()
        };
        let state = Arc::new(BotState::new(config, Db::open_memory().unwrap()));
        let (tx, rx) = mpsc::channel(512);
        let mut harness = Self {
            state,
            handle: ClientHandle::from_sender(tx),
            rx,
            _dir: dir,
        };
        harness
            .event(Event::Registered {
                nick: "harper".into(),
            })
            .await;
        harness
            .event(Event::Joined {
                channel: "#math".into(),
                nick: "harper".into(),
            })
            .await;
        harness
            .event(Event::Names {
                channel: "#math".into(),
                nicks: vec!["harper".into(), "@alice".into(), "bob".into(), OWNER.into()],
            })
            .await;
        harness.drain();
        harness
    }

    async fn event(&mut self, event: Event) -> Flow {
        handle_event(&self.state, self.handle.clone(), event)
            .await
            .unwrap()
    }

    fn drain(&mut self) -> Vec<Command> {
        let mut out = Vec::new();
        while let Ok(cmd) = self.rx.try_recv() {
            out.push(cmd);
        }
        out
    }

    /// Send `text` from `from` to `target` and return what the bot sent.
    async fn send(&mut self, from: &str, target: &str, text: &str) -> Vec<Command> {
        self.send_tagged(from, target, text, HashMap::new()).await
    }

    async fn send_tagged(
        &mut self,
        from: &str,
        target: &str,
        text: &str,
        tags: HashMap<String, String>,
    ) -> Vec<Command> {
        self.event(Event::Message {
            from: from.into(),
            target: target.into(),
            text: text.into(),
            tags,
        })
        .await;
        self.drain()
    }

    /// Plain text of every PRIVMSG the bot sent to `#math`.
    async fn say(&mut self, from: &str, text: &str) -> Vec<String> {
        lines(&self.send(from, "#math", text).await, "#math")
    }
}

fn lines(commands: &[Command], to: &str) -> Vec<String> {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::Privmsg { target, text } if target == to => Some(strip_formatting(text)),
            _ => None,
        })
        .collect()
}

fn contains(lines: &[String], needle: &str) -> bool {
    lines.iter().any(|l| l.contains(needle))
}

// ── quadratics ──

#[tokio::test]
async fn quadratic_reply_and_plot() {
    let mut h = Harness::new().await;
    let sent = h.send("bob", "#math", ".quadratics 1 -3 2").await;

    assert!(
        matches!(&sent[0], Command::Raw(line) if line.contains("+typing=active")),
        "typing indicator first: {sent:?}"
    );
    let out = lines(&sent, "#math");
    assert_eq!(
        out[..6],
        [
            "[+] Standard Form = 1x^2 + -3x + 2",
            "[+] Vertex Form = 1(x-1.5)^2 + -0.25",
            "[+] 1st zero/root = 2",
            "[+] 2nd zero/root = 1",
            "[+] Vertex = (1.5, -0.25)",
            "[+] AOS: x = 1.5",
        ]
    );
    let plot = h.state.config.images_dir.join("quadratics.png");
    assert_eq!(out[6], format!("Plot saved to {}", plot.display()));
    assert!(plot.exists());
}

#[tokio::test]
async fn quadratic_alias_is_case_insensitive() {
    let mut h = Harness::new().await;
    let out = h.say("bob", ".QUADRATIC 1 -4 4").await;
    assert!(contains(&out, "[+] 1st zero/root = 2"));
    assert!(contains(&out, "[+] Vertex = (2, 0)"));
}

#[tokio::test]
async fn complex_roots_get_the_error_reply() {
    let mut h = Harness::new().await;
    let out = h.say("bob", ".quadratics 1 0 1").await;
    assert!(contains(&out, "⛔ Error!"));
    assert!(contains(&out, "Sorry bob, but harper found an error."));
    assert!(contains(&out, "Error in quadratics"));
    assert!(contains(&out, "`quadratics <a> <b> <c>`"));
    assert!(contains(&out, "no real roots"));
}

#[tokio::test]
async fn overflowing_roots_still_get_the_answer() {
    let mut h = Harness::new().await;
    let sent = h.send("bob", "#math", ".quadratics 1e200 1e200 1").await;
    let out = lines(&sent, "#math");
    assert!(contains(&out, "[+] 1st zero/root = inf"), "{out:?}");
    assert!(contains(&out, "[+] 2nd zero/root = -inf"));
    assert!(contains(&out, "The roots are too large to plot."));
    assert!(
        sent.iter()
            .any(|c| matches!(c, Command::Raw(line) if line.contains("+typing=done"))),
        "typing indicator cleared: {sent:?}"
    );
}

#[tokio::test]
async fn linear_input_is_rejected() {
    let mut h = Harness::new().await;
    let out = h.say("bob", ".quadratics 0 2 1").await;
    assert!(contains(&out, "not a quadratic"));
}

#[tokio::test]
async fn bad_and_missing_arguments() {
    let mut h = Harness::new().await;
    let out = h.say("bob", ".quadratics 1 x 2").await;
    assert!(contains(&out, "Converting to a number failed for parameter \"b\"."));

    let out = h.say("bob", ".quadratics 1 2").await;
    assert!(contains(&out, "c is a required argument that is missing."));
}

// ── prefixes and mentions ──

#[tokio::test]
async fn operator_sets_and_resets_prefix() {
    let mut h = Harness::new().await;
    let out = h.say("alice", ".prefix !").await;
    assert_eq!(out[0], "Set the custom prefix to `!`");
    assert_eq!(out[1], "Do `!prefix` to set it back to the default prefix.");
    assert_eq!(h.state.db.prefix("#math").unwrap().as_deref(), Some("!"));

    assert!(h.say("bob", ".about").await.is_empty());
    assert_eq!(
        h.say("bob", "!about").await,
        vec!["H.A.R.P.E.R. Homework Assistant Robot Personal Experimental Resource"]
    );
}

#[tokio::test]
async fn empty_prefix_restores_default() {
    let mut h = Harness::new().await;
    h.state.db.set_prefix("#math", "?").unwrap();
    let out = h.say("alice", "?prefix").await;
    assert_eq!(out[0], "Set the custom prefix to `.`");
    assert_eq!(h.state.db.prefix("#math").unwrap(), None);
}

#[tokio::test]
async fn long_prefix_is_refused() {
    let mut h = Harness::new().await;
    let out = h.say("alice", ".prefix abcdefghij").await;
    assert!(contains(&out, "Too many characters!"));
    assert_eq!(h.state.db.prefix("#math").unwrap(), None);

    // The refused attempt still used up the channel cooldown.
    let out = h.say("alice", ".prefix abcdefghi").await;
    assert!(contains(&out, "Slow down alice!"));
}

#[tokio::test]
async fn prefix_needs_operator() {
    let mut h = Harness::new().await;
    let out = h.say("bob", ".prefix !").await;
    assert!(contains(
        &out,
        "You are missing Administrator permission(s) to run this command."
    ));
    assert_eq!(h.state.db.prefix("#math").unwrap(), None);
}

#[tokio::test]
async fn mention_shows_prefix_then_rate_limits() {
    let mut h = Harness::new().await;
    let out = h.say("bob", "harper").await;
    assert_eq!(
        out,
        vec!["Hey bob! My prefix here is `.`", "Do `.help` to get started."]
    );

    let out = h.say("bob", "harper:").await;
    assert_eq!(out.len(), 1);
    assert!(out[0].starts_with("Slow Down bob! Please wait "), "{out:?}");
    assert!(out[0].ends_with(" seconds."));
}

#[tokio::test]
async fn addressed_commands_ignore_the_prefix() {
    let mut h = Harness::new().await;
    h.state.db.set_prefix("#math", "!").unwrap();
    let out = h.say("bob", "harper: about").await;
    assert_eq!(out.len(), 1);
}

#[tokio::test]
async fn private_messages_reply_to_the_sender() {
    let mut h = Harness::new().await;
    let sent = h.send("bob", "harper", ".about").await;
    assert_eq!(lines(&sent, "bob").len(), 1);
}

#[tokio::test]
async fn unknown_commands_and_own_lines_are_ignored() {
    let mut h = Harness::new().await;
    assert!(h.send("bob", "#math", ".dance").await.is_empty());
    assert!(h.send("harper", "#math", ".about").await.is_empty());
    assert!(h.send("bob", "#math", "just chatting").await.is_empty());
}

// ── help ──

#[tokio::test]
async fn help_lists_modules() {
    let mut h = Harness::new().await;
    let out = h.say("bob", ".help").await;
    assert!(contains(&out, "🔧 Module List"));
    assert!(contains(&out, "Do `.help [module]` for more info on a specific module."));
    assert!(out.iter().any(|l| l == "Meta"));
    assert!(out.iter().any(|l| l == "Homework"));
    assert!(!contains(&out, "Errors"));
}

#[tokio::test]
async fn help_for_a_module_reacts_and_hides_hidden_commands() {
    let mut h = Harness::new().await;
    let tags = HashMap::from([("msgid".to_string(), "abc123".to_string())]);
    let sent = h.send_tagged("bob", "#math", ".help meta", tags).await;

    assert!(
        matches!(&sent[0], Command::Raw(line) if line.contains("+draft/react=👍") && line.contains("abc123")),
        "{sent:?}"
    );
    let out = lines(&sent, "#math");
    assert!(contains(&out, "🚧 Meta Command List"));
    assert!(out.iter().any(|l| l == "`prefix [new_prefix]`"));
    assert!(out.iter().any(|l| l == "`ping`"));
    assert!(!contains(&out, "`logout`"));
    assert!(!contains(&out, "`setstatus"));
}

#[tokio::test]
async fn help_for_a_command() {
    let mut h = Harness::new().await;
    let out = h.say("bob", ".help ping").await;
    assert!(contains(&out, "🔧 Command Syntax"));
    assert!(contains(&out, "ping - Returns the server latency"));
    assert!(contains(&out, "  latency"));

    let out = h.say("alice", ".help about").await;
    assert!(contains(&out, "No Aliases"));
}

#[tokio::test]
async fn help_rejects_unknown_and_multiple_names() {
    let mut h = Harness::new().await;
    let out = h.say("bob", ".help nothing").await;
    assert!(contains(
        &out,
        "Sorry, but I don't see a command or module called \"nothing\""
    ));

    let out = h.say("alice", ".help meta homework").await;
    assert!(contains(&out, "That is way too many modules!"));
}

// ── cooldowns, latency, stats ──

#[tokio::test]
async fn ping_reports_latency_and_cools_down() {
    let mut h = Harness::new().await;
    let out = h.say("bob", ".ping").await;
    assert!(out.iter().any(|l| l == "🏓 Pong" || l == "🏓 Ping"), "{out:?}");
    assert!(contains(&out, "Server Latency: not measured yet"));
    assert!(contains(&out, "Command Latency: "));

    let out = h.say("bob", ".latency").await;
    assert_eq!(out.len(), 1);
    assert!(out[0].starts_with("Slow down bob! You must wait `"), "{out:?}");
    assert!(out[0].ends_with(" seconds` to use this command!"));

    // Other users have their own bucket.
    assert!(contains(&h.say("alice", ".ping").await, "Server Latency"));
}

#[tokio::test]
async fn spamming_a_command_on_cooldown_warns_once() {
    let mut h = Harness::new().await;
    assert!(contains(&h.say("bob", ".ping").await, "Server Latency"));

    let mut warnings = 0;
    for _ in 0..5 {
        let out = h.say("bob", ".ping").await;
        warnings += out.iter().filter(|l| l.starts_with("Slow down bob!")).count();
    }
    assert_eq!(warnings, 1);

    // The warning used up bob's mention reply too.
    let out = h.say("bob", "harper").await;
    assert!(out[0].starts_with("Slow Down bob! Please wait "), "{out:?}");
}

#[tokio::test]
async fn stats_describe_the_bot() {
    let mut h = Harness::new().await;
    let out = h.say("bob", ".info").await;
    assert!(contains(&out, "📊 Stats"));
    assert!(contains(&out, "Working in 1 channels."));
    assert!(contains(&out, "Serving 4 members."));
    assert!(contains(&out, "This channel's prefix is `.`"));
    assert!(contains(&out, "day(s)"));
    assert!(contains(&out, "💽 Peak Memory"));
    assert!(contains(&out, "MiB"));
    assert!(contains(&out, "guhbean | harper"));
}

// ── owner commands ──

#[tokio::test]
async fn setstatus_is_owner_only_and_validated() {
    let mut h = Harness::new().await;
    let out = h.say("bob", ".setstatus playing chess").await;
    assert!(contains(&out, "You do not own this bot."));

    let out = h.say(OWNER, ".setstatus playing chess").await;
    assert_eq!(out, vec!["Set status to `playing chess`"]);
    assert_eq!(h.state.status.lock().template(), "playing chess");

    let out = h.say(OTHER_OWNER, ".status dancing all night").await;
    assert!(contains(&out, "Invalid activity type 'dancing'"));
    assert_eq!(h.state.status.lock().template(), "playing chess");
}

#[tokio::test]
async fn setstatus_without_argument_resets() {
    let mut h = Harness::new().await;
    let out = h.say(OWNER, ".setstatus").await;
    assert!(out[0].starts_with("Set status to `watching @{nick}"));
}

#[tokio::test]
async fn update_acknowledges() {
    let mut h = Harness::new().await;
    assert_eq!(h.say(OWNER, ".update").await, vec!["Updated all schedules"]);
}

#[tokio::test]
async fn logout_by_a_stranger_is_mocked() {
    let mut h = Harness::new().await;
    let flow = h
        .event(Event::Message {
            from: "bob".into(),
            target: "#math".into(),
            text: ".logout".into(),
            tags: HashMap::new(),
        })
        .await;
    assert_eq!(flow, Flow::Continue);
    let out = lines(&h.drain(), "#math");
    assert!(contains(&out, "You Silly Billy 😜"));
    assert!(!contains(&out, "⛔ Error!"));
}

#[tokio::test]
async fn logout_by_owner_quits() {
    let mut h = Harness::new().await;
    let flow = h
        .event(Event::Message {
            from: OWNER.into(),
            target: "#math".into(),
            text: ".disconnect".into(),
            tags: HashMap::new(),
        })
        .await;
    assert_eq!(flow, Flow::Stop);
    let sent = h.drain();
    assert!(contains(&lines(&sent, "#math"), "Goodbye guhbean!"));
    assert!(sent.contains(&Command::Quit(Some("harper was logged out.".into()))));
}

#[tokio::test]
async fn unloading_a_module_hides_its_commands() {
    let mut h = Harness::new().await;
    assert_eq!(
        h.say(OWNER, ".unload Homework").await,
        vec!["`Homework unloaded successfully.`"]
    );
    assert!(h.say("bob", ".quadratics 1 -3 2").await.is_empty());
    assert!(!contains(&h.say("alice", ".help").await, "Homework"));

    assert_eq!(
        h.say(OTHER_OWNER, ".load homework").await,
        vec!["`homework loaded successfully.`"]
    );
    assert!(contains(&h.say("bob", ".quadratics 1 -3 2").await, "AOS"));
}

#[tokio::test]
async fn module_errors() {
    let mut h = Harness::new().await;
    let out = h.say(OWNER, ".unload meta").await;
    assert!(contains(&out, "cannot be unloaded"));

    let out = h.say(OWNER, ".load homework").await;
    assert!(contains(&out, "already loaded"));

    let out = h.say(OWNER, ".reload fun").await;
    assert!(contains(&out, "No module named 'fun'"));
}

#[tokio::test]
async fn unloading_errors_silences_failures() {
    let mut h = Harness::new().await;
    h.say(OWNER, ".unload errors").await;
    assert!(h.say("bob", ".quadratics 1 0 1").await.is_empty());
}

// ── homework ──

#[tokio::test]
async fn homework_profile_is_stored() {
    let mut h = Harness::new().await;
    let out = h.say(OWNER, ".conf-hw Algebra Ada Lovelace").await;
    assert_eq!(out, vec!["`New name: Ada Lovelace`", "`New topic: Algebra`"]);
    let profile = h.state.db.homework(OWNER).unwrap().unwrap();
    assert_eq!(profile.fullname, "Ada Lovelace");
    assert_eq!(profile.topic, "Algebra");

    let out = h.say(OTHER_OWNER, ".config_homework Algebra").await;
    assert!(contains(&out, "new_name is a required argument that is missing."));
}

#[tokio::test]
async fn download_needs_a_profile() {
    let mut h = Harness::new().await;
    let out = h.say(OWNER, ".d 3 https://example.invalid/scan.pdf").await;
    assert!(contains(&out, "No homework profile yet."));

    let out = h.say("bob", ".download 3 https://example.invalid/scan.pdf").await;
    assert!(contains(&out, "You do not own this bot."));
}

#[tokio::test]
async fn wolfram_without_app_id_reports_an_error() {
    let mut h = Harness::new().await;
    let out = h.say("bob", ".wolfram integrate x^2").await;
    assert!(contains(&out, "No Wolfram|Alpha app id is configured"));
}

// ── runtime ──

#[tokio::test]
async fn invites_are_accepted() {
    let mut h = Harness::new().await;
    h.event(Event::Invited {
        channel: "#physics".into(),
        by: "alice".into(),
    })
    .await;
    assert_eq!(h.drain(), vec![Command::Join("#physics".into())]);
}

#[tokio::test]
async fn registration_publishes_the_status() {
    let mut h = Harness::new().await;
    h.event(Event::Registered {
        nick: "harper".into(),
    })
    .await;
    let sent = h.drain();
    assert!(
        sent.iter().any(|c| matches!(
            c,
            Command::Raw(line) if line.starts_with("AWAY :Playing a game | 1 servers & 4 users | version ")
        )),
        "{sent:?}"
    );
    assert!(h.state.is_online());
    assert!(h.state.ready.lock().all_ready());
}
