/// API route handlers
///
/// Handlers are organized by resource:
///
/// - `health`: Health check endpoint
/// - `account`: Feature toggles and the caller's subscription
/// - `groups`: Groups and memberships
/// - `invitations`: Group invitations
/// - `projects`: Projects and incidents
/// - `admin`: Cross-tenant admin surface

pub mod account;
pub mod admin;
pub mod groups;
pub mod health;
pub mod invitations;
pub mod projects;
