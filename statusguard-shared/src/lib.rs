//! # StatusGuard Shared Library
//!
//! Authorization and entitlement engine shared by the StatusGuard API server
//! and worker.
//!
//! ## Module Organization
//!
//! - `models`: Database models and data structures
//! - `db`: Pool, migrations and transient-error retry
//! - `auth`: Identity tokens, the resource guard and the admin override layer
//! - `entitlements`: Subscription tier to limits resolution
//! - `quota`: Check-and-reserve quota enforcement
//! - `groups`: Membership store
//! - `invitations`: Invitation state machine
//! - `projects`: Guarded project and incident operations
//! - `audit`: Decision log of denied decisions
//! - `engine`: Facade wiring the components together
//! - `error`: Engine error and denial types

pub mod audit;
pub mod auth;
pub mod db;
pub mod engine;
pub mod entitlements;
pub mod error;
pub mod groups;
pub mod invitations;
pub mod models;
pub mod projects;
pub mod quota;

/// Current version of the StatusGuard shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
