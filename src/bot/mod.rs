//! Bot front end: command parsing, reply texts and the per-user dispatcher.

pub mod commands;
pub mod dispatcher;
pub mod replies;

pub use commands::{Command, CommandParser};
pub use dispatcher::{Bot, BotDeps};
