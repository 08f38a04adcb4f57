//! TutorUG - learning platform backend for Ugandan O-Level students
//!
//! Serves the subscription, billing, reputation and AI tutor APIs over
//! HTTP, persisting to MongoDB.
//!
//! ## Services
//!
//! - **Access gate**: bearer-token authentication plus the trial/paid check
//!   in front of every paid feature
//! - **Billing**: Flutterwave checkout, verification and signed webhooks
//! - **Reputation**: points, levels, ranks, streaks and leaderboards
//! - **AI tutor**: moderated chat sessions that earn points
//! - **Jobs**: periodic expiry sweeps and trial/renewal reminders

pub mod auth;
pub mod config;
pub mod db;
pub mod jobs;
pub mod routes;
pub mod server;
pub mod stores;
pub mod types;

pub use config::Args;
pub use server::{run, serve, AppState, Providers, StorageMode};
pub use stores::Stores;
pub use types::{Result, TutorugError};
