//! Who is in which channel, kept current from IRC events.

use std::collections::{BTreeMap, BTreeSet};

use harper_sdk::event::Event;

#[derive(Debug, Default, Clone)]
struct ChannelRoster {
    members: BTreeSet<String>,
    operators: BTreeSet<String>,
}

/// Channels the bot is in and the nicks it can see there.
///
/// Channel names and nicks are compared case-insensitively.
#[derive(Debug, Default)]
pub struct Roster {
    own_nick: String,
    channels: BTreeMap<String, ChannelRoster>,
}

impl Roster {
    pub fn new(own_nick: &str) -> Self {
        Self {
            own_nick: own_nick.to_lowercase(),
            channels: BTreeMap::new(),
        }
    }

    pub fn own_nick(&self) -> &str {
        &self.own_nick
    }

    /// Number of channels joined.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    /// Unique nicks across all joined channels, the bot included.
    pub fn unique_members(&self) -> usize {
        self.channels
            .values()
            .flat_map(|c| c.members.iter())
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn is_operator(&self, channel: &str, nick: &str) -> bool {
        self.channels
            .get(&channel.to_lowercase())
            .is_some_and(|c| c.operators.contains(&nick.to_lowercase()))
    }

    pub fn is_member(&self, channel: &str, nick: &str) -> bool {
        self.channels
            .get(&channel.to_lowercase())
            .is_some_and(|c| c.members.contains(&nick.to_lowercase()))
    }

    /// Forget everything (on disconnect).
    pub fn clear(&mut self) {
        self.channels.clear();
    }

    /// Apply one event.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::Registered { nick } => {
                self.own_nick = nick.to_lowercase();
            }
            Event::Joined { channel, nick } => {
                let chan = channel.to_lowercase();
                let nick = nick.to_lowercase();
                if nick == self.own_nick {
                    self.channels.insert(chan.clone(), ChannelRoster::default());
                }
                if let Some(c) = self.channels.get_mut(&chan) {
                    c.members.insert(nick);
                }
            }
            Event::Names { channel, nicks } => {
                let Some(c) = self.channels.get_mut(&channel.to_lowercase()) else {
                    return;
                };
                for raw in nicks {
                    let (modes, nick) = split_membership_prefix(raw);
                    let nick = nick.to_lowercase();
                    if modes.contains('@') || modes.contains('~') || modes.contains('&') {
                        c.operators.insert(nick.clone());
                    }
                    c.members.insert(nick);
                }
            }
            Event::Parted { channel, nick } => {
                self.remove_from(&channel.to_lowercase(), &nick.to_lowercase());
            }
            Event::Kicked { channel, nick, .. } => {
                self.remove_from(&channel.to_lowercase(), &nick.to_lowercase());
            }
            Event::UserQuit { nick, .. } => {
                let nick = nick.to_lowercase();
                for c in self.channels.values_mut() {
                    c.members.remove(&nick);
                    c.operators.remove(&nick);
                }
            }
            Event::NickChanged { old_nick, new_nick } => {
                let old = old_nick.to_lowercase();
                let new = new_nick.to_lowercase();
                if old == self.own_nick {
                    self.own_nick = new.clone();
                }
                for c in self.channels.values_mut() {
                    if c.members.remove(&old) {
                        c.members.insert(new.clone());
                    }
                    if c.operators.remove(&old) {
                        c.operators.insert(new.clone());
                    }
                }
            }
            Event::ModeChanged { channel, mode, arg: Some(target), .. } => {
                let Some(c) = self.channels.get_mut(&channel.to_lowercase()) else {
                    return;
                };
                let target = target.to_lowercase();
                match mode.as_str() {
                    "+o" => {
                        c.operators.insert(target);
                    }
                    "-o" => {
                        c.operators.remove(&target);
                    }
                    _ => {}
                }
            }
            Event::Disconnected { .. } => self.clear(),
            _ => {}
        }
    }

    fn remove_from(&mut self, channel: &str, nick: &str) {
        if nick == self.own_nick {
            self.channels.remove(channel);
            return;
        }
        if let Some(c) = self.channels.get_mut(channel) {
            c.members.remove(nick);
            c.operators.remove(nick);
        }
    }
}

/// Split `@+nick` into (`"@+"`, `"nick"`).
fn split_membership_prefix(raw: &str) -> (&str, &str) {
    let idx = raw
        .find(|c: char| !matches!(c, '~' | '&' | '@' | '%' | '+'))
        .unwrap_or(raw.len());
    raw.split_at(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(channel: &str, nick: &str) -> Event {
        Event::Joined {
            channel: channel.to_string(),
            nick: nick.to_string(),
        }
    }

    fn seeded() -> Roster {
        let mut roster = Roster::new("harper");
        roster.apply(&joined("#math", "harper"));
        roster.apply(&Event::Names {
            channel: "#math".to_string(),
            nicks: vec!["harper".into(), "@Alice".into(), "+bob".into()],
        });
        roster.apply(&joined("#chem", "harper"));
        roster.apply(&joined("#chem", "bob"));
        roster
    }

    #[test]
    fn counts_channels_and_unique_members() {
        let roster = seeded();
        assert_eq!(roster.channel_count(), 2);
        assert_eq!(roster.unique_members(), 3);
        assert!(roster.is_operator("#MATH", "alice"));
        assert!(!roster.is_operator("#math", "bob"));
        assert!(roster.is_member("#chem", "Bob"));
    }

    #[test]
    fn quit_and_part_remove_members() {
        let mut roster = seeded();
        roster.apply(&Event::UserQuit {
            nick: "bob".into(),
            reason: "bye".into(),
        });
        assert_eq!(roster.unique_members(), 2);

        roster.apply(&Event::Parted {
            channel: "#chem".into(),
            nick: "harper".into(),
        });
        assert_eq!(roster.channel_count(), 1);
    }

    #[test]
    fn modes_and_nick_changes_track_operators() {
        let mut roster = seeded();
        roster.apply(&Event::ModeChanged {
            channel: "#math".into(),
            mode: "+o".into(),
            arg: Some("bob".into()),
            set_by: "alice".into(),
        });
        assert!(roster.is_operator("#math", "bob"));

        roster.apply(&Event::NickChanged {
            old_nick: "bob".into(),
            new_nick: "robert".into(),
        });
        assert!(roster.is_operator("#math", "robert"));
        assert!(!roster.is_member("#chem", "bob"));

        roster.apply(&Event::ModeChanged {
            channel: "#math".into(),
            mode: "-o".into(),
            arg: Some("Robert".into()),
            set_by: "alice".into(),
        });
        assert!(!roster.is_operator("#math", "robert"));
    }

    #[test]
    fn kick_of_bot_forgets_channel() {
        let mut roster = seeded();
        roster.apply(&Event::Kicked {
            channel: "#math".into(),
            nick: "harper".into(),
            by: "alice".into(),
            reason: String::new(),
        });
        assert_eq!(roster.channels().collect::<Vec<_>>(), vec!["#chem"]);
    }

    #[test]
    fn membership_prefix_split() {
        assert_eq!(split_membership_prefix("@+nick"), ("@+", "nick"));
        assert_eq!(split_membership_prefix("nick"), ("", "nick"));
    }
}
