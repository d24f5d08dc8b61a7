//! HIVEMIND Agents - Collective and Evolution Loop
//!
//! A [`Collective`] owns a roster of [`Agent`]s and advances it in epochs.
//! Each epoch pairs compatible agents for collaboration (delegated to the
//! orchestrator), asks the decision oracle to break a few ties, trims cached
//! memory references and records a [`HiveSnapshot`]. The services it drives
//! are bundled in [`HiveServices`] and constructed explicitly at startup.

mod agent;
mod collective;
mod compatibility;
mod records;
mod services;
mod tables;

pub use agent::*;
pub use collective::Collective;
pub use compatibility::CompatibilityTable;
pub use records::*;
pub use services::HiveServices;
pub use tables::*;
