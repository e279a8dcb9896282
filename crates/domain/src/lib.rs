//! Shared domain types for the Tecnibot support backend: configuration,
//! errors, trace events, the conversation record and transcript, the stage
//! and button-contract tables, and tickets.

pub mod config;
pub mod conversation;
pub mod error;
pub mod stage;
pub mod ticket;
pub mod trace;

pub use error::{Error, ErrorCode, Result};
