//! Core domain + application logic for the moderation-relay bot.
//!
//! This crate is intentionally framework-agnostic. Telegram / Gemini /
//! urlscan.io live behind ports (traits) implemented in adapter crates.

pub mod audit;
pub mod authz;
pub mod config;
pub mod domain;
pub mod errors;
pub mod intake;
pub mod logging;
pub mod messaging;
pub mod moderation;
pub mod pipeline;
pub mod responder;
pub mod scanner;
pub mod stats;
pub mod supervisor;

pub use errors::{Error, Result};
