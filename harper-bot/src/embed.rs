//! Rich replies rendered as plain IRC lines.
//!
//! An [`Embed`] collects a title, description, named fields and a footer,
//! the way card-style chat messages do, and flattens them into lines that
//! read well in a terminal client.

use chrono::{DateTime, Utc};

/// IRC bold toggle.
const BOLD: char = '\x02';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: String,
    /// Short fields are kept on one line with their name when possible.
    pub inline: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub fields: Vec<Field>,
    pub image: Option<String>,
    pub footer: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Embed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(Field {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn image(mut self, url: impl Into<String>) -> Self {
        self.image = Some(url.into());
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at);
        self
    }

    /// Flatten into IRC lines. Empty sections produce no lines.
    pub fn render(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(author) = &self.author {
            lines.push(format!("« {author} »"));
        }
        if let Some(title) = &self.title {
            lines.push(format!("{BOLD}{title}{BOLD}"));
        }
        if let Some(description) = &self.description {
            lines.extend(description.lines().map(str::to_string));
        }
        for field in &self.fields {
            let value_lines: Vec<&str> = field.value.lines().collect();
            match value_lines.as_slice() {
                [] => lines.push(format!("{BOLD}{}{BOLD}", field.name)),
                [single] if field.inline => {
                    lines.push(format!("{BOLD}{}{BOLD}: {single}", field.name))
                }
                many => {
                    lines.push(format!("{BOLD}{}{BOLD}", field.name));
                    lines.extend(many.iter().map(|l| format!("  {l}")));
                }
            }
        }
        if let Some(image) = &self.image {
            lines.push(image.clone());
        }
        match (&self.footer, &self.timestamp) {
            (Some(footer), Some(at)) => {
                lines.push(format!("— {footer} • {}", at.format("%Y-%m-%d %H:%M UTC")))
            }
            (Some(footer), None) => lines.push(format!("— {footer}")),
            (None, Some(at)) => lines.push(format!("— {}", at.format("%Y-%m-%d %H:%M UTC"))),
            (None, None) => {}
        }
        lines
    }
}

/// Remove IRC formatting codes (for tests and logs).
pub fn strip_formatting(line: &str) -> String {
    line.chars().filter(|c| *c != BOLD).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn renders_sections_in_order() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let embed = Embed::new()
            .author("alice")
            .title("📊 Stats")
            .description("List of harper's statistics")
            .field("🌐 Version", "Version **0.1.0**", true)
            .field("⏰ Uptime", "1 day(s)\n2 hour(s)", true)
            .footer("guhbean | harper")
            .timestamp(at);
        let lines: Vec<String> = embed.render().iter().map(|l| strip_formatting(l)).collect();
        assert_eq!(
            lines,
            vec![
                "« alice »",
                "📊 Stats",
                "List of harper's statistics",
                "🌐 Version: Version **0.1.0**",
                "⏰ Uptime",
                "  1 day(s)",
                "  2 hour(s)",
                "— guhbean | harper • 2024-03-01 12:30 UTC",
            ]
        );
    }

    #[test]
    fn block_fields_keep_their_own_line() {
        let lines = Embed::new().field("Usage", "`ping`", false).render();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "  `ping`");
    }

    #[test]
    fn empty_embed_renders_nothing() {
        assert!(Embed::new().render().is_empty());
    }
}
