//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate entity, record engine and repository calls into use-case
//!   level APIs.
//! - Keep boundary layers (CLI, HTTP) decoupled from storage details.

pub mod submission_service;
