//! # StatusGuard Worker Library
//!
//! Background maintenance for the StatusGuard engine.
//!
//! ## Modules
//!
//! - `sweeper`: Persists the expiry of stale pending invitations

pub mod sweeper;
