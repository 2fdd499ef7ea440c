//! Core types for the legal assistant
//!
//! This crate provides the foundational types used across all other crates:
//! - Error taxonomy shared by the retrieval pipeline and the server
//! - Chat message and citation types

pub mod chat;
pub mod error;

pub use chat::{ChatMessage, Citation, Role};
pub use error::{Error, Result};
