//! Bot presence: the rotating status line.
//!
//! IRC has no rich presence, so the status is published as the bot's AWAY
//! message, e.g. `Playing a game | 3 servers & 41 users | version 0.1.0`.
//! The status is a template whose first word is the activity type; the rest
//! may use `{guilds}`, `{users}`, `{version}` and `{nick}` placeholders
//! (a `:,` spec adds thousands separators, `:s` is accepted and ignored).

use std::fmt;

/// Template used at startup.
pub const DEFAULT_STATUS: &str =
    "playing a game | {guilds:,} servers & {users:,} users | version {version:s}";

/// Template restored by `setstatus` with no argument.
pub const RESET_STATUS: &str =
    "watching @{nick} | {guilds:,} servers & {users:,} users | version {version:s}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityType {
    Playing,
    Watching,
    ListeningTo,
    Streaming,
}

impl ActivityType {
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "playing" => Some(Self::Playing),
            "watching" => Some(Self::Watching),
            "listening-to" => Some(Self::ListeningTo),
            "streaming" => Some(Self::Streaming),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Playing => "Playing",
            Self::Watching => "Watching",
            Self::ListeningTo => "Listening to",
            Self::Streaming => "Streaming",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid activity type '{0}': use playing, watching, listening-to or streaming")]
pub struct InvalidActivity(pub String);

/// Values substituted into the template.
#[derive(Debug, Clone, Copy)]
pub struct StatusContext<'a> {
    pub guilds: usize,
    pub users: usize,
    pub version: &'a str,
    pub nick: &'a str,
}

/// The current status template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    template: String,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            template: DEFAULT_STATUS.to_string(),
        }
    }
}

impl Status {
    /// Validate and build a status from a template.
    pub fn new(template: &str) -> Result<Self, InvalidActivity> {
        let first = template.split(' ').next().unwrap_or("");
        if ActivityType::parse(first).is_none() {
            return Err(InvalidActivity(first.to_string()));
        }
        Ok(Self {
            template: template.to_string(),
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Activity and rendered text. Unknown activity words fall back to
    /// `watching` over the whole rendered message.
    pub fn presence(&self, ctx: &StatusContext<'_>) -> (ActivityType, String) {
        let rendered = render_template(&self.template, ctx);
        match rendered.split_once(' ') {
            Some((word, rest)) => match ActivityType::parse(word) {
                Some(kind) => (kind, rest.to_string()),
                None => (ActivityType::Watching, rendered.clone()),
            },
            None => (ActivityType::Watching, rendered),
        }
    }

    /// Text published as the AWAY message.
    pub fn away_text(&self, ctx: &StatusContext<'_>) -> String {
        let (kind, name) = self.presence(ctx);
        format!("{} {name}", kind.label())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

/// Substitute `{name}` / `{name:spec}` placeholders. Unknown names are left alone.
pub fn render_template(template: &str, ctx: &StatusContext<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let field = &after[..end];
        let (name, spec) = field.split_once(':').unwrap_or((field, ""));
        let value = match name {
            "guilds" => Some(format_count(ctx.guilds, spec)),
            "users" => Some(format_count(ctx.users, spec)),
            "version" => Some(ctx.version.to_string()),
            "nick" => Some(ctx.nick.to_string()),
            _ => None,
        };
        match value {
            Some(v) => out.push_str(&v),
            None => out.push_str(&rest[start..start + end + 2]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

fn format_count(n: usize, spec: &str) -> String {
    if spec.contains(',') {
        with_commas(n)
    } else {
        n.to_string()
    }
}

/// `1234567` → `"1,234,567"`.
pub fn with_commas(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> StatusContext<'static> {
        StatusContext {
            guilds: 1234,
            users: 5,
            version: "0.1.0",
            nick: "harper",
        }
    }

    #[test]
    fn default_status_renders() {
        let status = Status::default();
        assert_eq!(
            status.away_text(&ctx()),
            "Playing a game | 1,234 servers & 5 users | version 0.1.0"
        );
    }

    #[test]
    fn reset_status_mentions_nick() {
        let status = Status::new(RESET_STATUS).unwrap();
        let (kind, name) = status.presence(&ctx());
        assert_eq!(kind, ActivityType::Watching);
        assert!(name.starts_with("@harper |"));
    }

    #[test]
    fn activity_type_is_validated() {
        assert!(Status::new("listening-to lo-fi beats").is_ok());
        assert_eq!(
            Status::new("dancing all night"),
            Err(InvalidActivity("dancing".to_string()))
        );
    }

    #[test]
    fn single_word_falls_back_to_watching() {
        let status = Status::new("streaming").unwrap();
        assert_eq!(
            status.presence(&ctx()),
            (ActivityType::Watching, "streaming".to_string())
        );
    }

    #[test]
    fn unknown_placeholders_survive() {
        assert_eq!(render_template("{guilds} {mystery} {", &ctx()), "1234 {mystery} {");
    }

    #[test]
    fn thousands_separators() {
        assert_eq!(with_commas(0), "0");
        assert_eq!(with_commas(999), "999");
        assert_eq!(with_commas(1000), "1,000");
        assert_eq!(with_commas(1234567), "1,234,567");
    }
}
