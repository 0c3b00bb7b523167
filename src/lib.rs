//! Intake Gateway - WhatsApp document intake bot
//!
//! Users send a photo or document over WhatsApp, describe it in a follow-up
//! message, pick a Google Drive folder, and the file is uploaded and
//! recorded. They can later search their documents by description or browse
//! them folder by folder.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │        WhatsApp Cloud API webhook  (api)             │
//! └────────────────────┬─────────────────────────────────┘
//!                      │  dedup
//! ┌────────────────────▼─────────────────────────────────┐
//! │   Conversation engine (engine) + sessions (session)  │
//! └───────┬──────────────────┬────────────────┬──────────┘
//!         │                  │                │
//! ┌───────▼──────┐  ┌────────▼───────┐  ┌─────▼─────────┐
//! │ Messenger /  │  │ Google Drive   │  │ SQLite users  │
//! │ media (chan) │  │ (drive)        │  │ + docs (db)   │
//! └──────────────┘  └────────────────┘  └───────────────┘
//! ```

pub mod api;
pub mod channels;
pub mod config;
pub mod db;
pub mod drive;
pub mod engine;
pub mod error;
pub mod session;

pub use config::Config;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
