//! Background Tasks Module
//!
//! Contains the tasks a cache runs alongside its callers.
//!
//! # Tasks
//! - Expiry: fires TTL deadlines as they come due

mod expiry;

pub use expiry::{spawn_expiry_task, ExpiryDriven};
