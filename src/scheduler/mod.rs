//! Expiry scheduler.
//!
//! Delivers poll results and reminders once their expiry passes, then
//! removes them from the store.

pub mod render;
pub mod runner;

pub use runner::{ExpiredRecords, ExpiryScheduler, TickReport, collect_expired};
