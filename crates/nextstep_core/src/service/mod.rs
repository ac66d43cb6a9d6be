//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep the HTTP/CLI boundary decoupled from storage details.

pub mod step_service;
