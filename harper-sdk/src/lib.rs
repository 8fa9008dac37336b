//! harper-sdk: the IRC client underneath H.A.R.P.E.R.
//!
//! [`client`] owns the socket and the protocol task, [`event`] is what the
//! task reports back, and [`irc`] parses and serialises raw lines.

pub mod client;
pub mod event;
pub mod irc;

/// Version of this SDK, reported by the bot's stats command.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
