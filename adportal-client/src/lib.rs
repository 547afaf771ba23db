//! adportal Client - HTTP access to the directory management backend
//!
//! Implements the [`adportal_core::SessionApi`] contract on top of reqwest so
//! the session lifecycle controller never deals with transport details.

pub mod api;

pub use api::{ApiClientConfig, HttpSessionApi};
