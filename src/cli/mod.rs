//! Command line front end: parse flags, bring up telemetry, return an
//! [`actions::Action`] for the binary to execute.

pub mod actions;
pub mod commands;
pub mod dispatch;
pub mod telemetry;

mod start;
pub use self::start::start;
