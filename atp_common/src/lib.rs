//! ATP Common Library
//!
//! Shared vocabulary for the ATP supervisor workspace: signal aspects and
//! speed codes, cycle-driven timing primitives, decode tables and the
//! collaborator interfaces through which the host simulation supplies track
//! data and braking-curve evaluation.
//!
//! # Module Structure
//!
//! - [`units`] - km/h ↔ m/s conversion helpers
//! - [`timing`] - elapsed-time timer, periodic blinker, distance odometer
//! - [`signal`] - ordered signal aspect enumeration
//! - [`codes`] - cab-signaling speed codes, cab aspects and reduction tables
//! - [`decode`] - composite-key decode tables with wildcard fallback
//! - [`config`] - load-once train parameters (TOML)
//! - [`traits`] - collaborator interfaces (environment, braking curve)

pub mod codes;
pub mod config;
pub mod decode;
pub mod signal;
pub mod timing;
pub mod traits;
pub mod units;
