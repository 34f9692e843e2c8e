//! mirrorbot: polls and reminders for a chat bot, persisted in a remote
//! key-value store and mirrored locally through its watch stream.
//!
//! # Architecture
//!
//! - **Store**: [`store::RemoteStore`] is the persistence contract, with a
//!   Kubernetes ConfigMap adapter and an in-memory one
//! - **Mirror**: [`Mirror`] keeps every record in memory, updated only by
//!   the watch consumer task
//! - **Scheduler**: [`ExpiryScheduler`] delivers expired polls and reminders
//!   and then deletes them
//! - **Service**: [`RecordService`] is the API command handlers call

pub mod config;
pub mod delivery;
pub mod error;
pub mod mirror;
pub mod records;
pub mod scheduler;
pub mod service;
pub mod store;

pub use config::BotConfig;
pub use error::{BotError, Result};
pub use mirror::Mirror;
pub use records::{Poll, Record, RecordKey, RecordKind, Reminder};
pub use scheduler::ExpiryScheduler;
pub use service::RecordService;
