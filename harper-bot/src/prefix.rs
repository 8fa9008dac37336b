//! Command prefix resolution.
//!
//! A message is a command when it starts with the channel's prefix or when
//! it is addressed to the bot by nick (`harper: ping`, `harper, ping`,
//! `harper ping`). A message that is only the bot's nick is a mention.

/// How an incoming line should be treated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed<'a> {
    /// A command invocation: `name` and the raw argument text after it.
    Command { name: &'a str, args: &'a str },
    /// The message is just the bot's nick.
    Mention,
    /// Ordinary chatter.
    Other,
}

/// Classify `text` for a bot called `nick` using `prefix`.
pub fn parse<'a>(text: &'a str, nick: &str, prefix: &str) -> Parsed<'a> {
    let text = text.trim_start();

    if let Some(rest) = strip_nick(text, nick) {
        let rest = rest.trim_start_matches([':', ',']).trim_start();
        if rest.is_empty() {
            return Parsed::Mention;
        }
        return split_command(rest);
    }

    match text.strip_prefix(prefix) {
        Some(rest) => split_command(rest),
        None => Parsed::Other,
    }
}

/// `text` with a leading `nick` removed, when the nick is a whole word.
fn strip_nick<'a>(text: &'a str, nick: &str) -> Option<&'a str> {
    let head = text.get(..nick.len())?;
    if !head.eq_ignore_ascii_case(nick) {
        return None;
    }
    let rest = &text[nick.len()..];
    match rest.chars().next() {
        None | Some(':' | ',' | ' ') => Some(rest),
        Some(_) => None,
    }
}

fn split_command(rest: &str) -> Parsed<'_> {
    // "prefix" followed by whitespace is not a command.
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        return Parsed::Other;
    }
    match rest.split_once(char::is_whitespace) {
        Some((name, args)) => Parsed::Command {
            name,
            args: args.trim(),
        },
        None => Parsed::Command {
            name: rest,
            args: "",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_commands() {
        assert_eq!(
            parse(".quadratics 1 -3 2", "harper", "."),
            Parsed::Command {
                name: "quadratics",
                args: "1 -3 2"
            }
        );
        assert_eq!(
            parse("guh ping", "harper", "guh "),
            Parsed::Command {
                name: "ping",
                args: ""
            }
        );
        assert_eq!(parse(". ping", "harper", "."), Parsed::Other);
        assert_eq!(parse(".", "harper", "."), Parsed::Other);
        assert_eq!(parse("hello", "harper", "."), Parsed::Other);
    }

    #[test]
    fn addressed_by_nick() {
        let expected = Parsed::Command {
            name: "help",
            args: "Homework",
        };
        assert_eq!(parse("harper: help Homework", "harper", "!"), expected);
        assert_eq!(parse("Harper, help Homework", "harper", "!"), expected);
        assert_eq!(parse("harper help Homework", "harper", "!"), expected);
    }

    #[test]
    fn bare_mentions() {
        assert_eq!(parse("harper", "harper", "."), Parsed::Mention);
        assert_eq!(parse("HARPER:", "harper", "."), Parsed::Mention);
        assert_eq!(parse("  harper,  ", "harper", "."), Parsed::Mention);
    }

    #[test]
    fn longer_nicks_are_not_mentions() {
        assert_eq!(parse("harperfan", "harper", "."), Parsed::Other);
        assert_eq!(parse("harp", "harper", "."), Parsed::Other);
    }
}
