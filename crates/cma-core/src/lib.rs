//! Citizen governor.
//!
//! Keeps the labor assignment of player cities on a declared goal: an
//! [`Oracle`] proposes the best assignment for a [`Parameter`], the apply
//! engine moves the server-side city there with as few requests as possible,
//! and the [`Governor`] retries until the server-confirmed city matches or
//! hands control back to the player.

mod agents;
mod apply;
mod codec;
pub mod config;
mod governor;
mod host;
mod oracle;
mod parameter;
mod result;
mod stats;

#[cfg(test)]
mod test_support;

pub use crate::agents::*;
pub use crate::apply::{plan_changes, ApplyOutcome, CityChange};
pub use crate::codec::*;
pub use crate::config::{CorruptParameterPolicy, GovernorConfig};
pub use crate::governor::*;
pub use crate::host::*;
pub use crate::oracle::*;
pub use crate::parameter::*;
pub use crate::result::*;
pub use crate::stats::*;
