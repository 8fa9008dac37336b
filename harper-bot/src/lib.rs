//! harper-bot: H.A.R.P.E.R., the Homework Assistant Robot Personal
//! Experimental Resource, an IRC bot.
//!
//! Commands (default prefix `.`):
//!
//!   .quadratics <a> <b> <c>  Solve, describe and plot a quadratic
//!   .wolfram <question>      Ask Wolfram|Alpha
//!   .conf-hw <topic> <name>  Set how downloaded homework is filed
//!   .download <day> [page] <urls...>
//!   .help [module|command]   List modules and commands
//!   .prefix [new_prefix]     Change this channel's prefix (operators)
//!   .stats / .ping / .about
//!
//! Owners additionally get setstatus, update, logout and load/unload/reload.

pub mod bot;
pub mod commands;
pub mod config;
pub mod cooldown;
pub mod db;
pub mod embed;
pub mod modules;
pub mod plot;
pub mod prefix;
pub mod quadratic;
pub mod ready;
pub mod roster;
pub mod stats;
pub mod status;
pub mod wolfram;
