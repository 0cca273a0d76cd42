//! Client side of the citizen governor.
//!
//! [`ClientSession`] hosts the governor against an in-process city server;
//! [`run_selfplay`] drives a seeded headless game with it.

mod selfplay;
mod session;

pub use selfplay::{run_selfplay, SelfPlayConfig, SelfPlaySummary};
pub use session::{ClientError, ClientSession, Message};
