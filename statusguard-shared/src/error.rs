/// Error types for the authorization and entitlement engine
///
/// Every engine operation returns [`Result<T>`]. Denied decisions carry a typed
/// [`Denial`] whose [`Denial::code`] is the stable reason string exposed to
/// clients and written to the decision log.
///
/// # Error Classes
///
/// - **Authorization**: `NotFound`, `NotOwner`, `Forbidden`, `InactiveUser`, `SelfProtection`
/// - **Quota**: `QuotaExceeded` (carries the limit for client messaging)
/// - **State machine**: `InvitationExpired`, `AlreadyResponded`, `LastOwnerProtected`, `InvalidTransition`
/// - **Transient storage**: serialization failures, deadlocks, lock timeouts and pool
///   acquire timeouts. These are the only errors [`crate::db::retry::with_retry`] retries.
///
/// # Example
///
/// ```
/// use statusguard_shared::error::{Denial, Error};
///
/// let err: Error = Denial::LastOwnerProtected.into();
/// assert_eq!(err.denial().map(Denial::code), Some("last_owner_protected"));
/// assert!(!err.is_transient());
/// ```

use crate::quota::QuotaResource;

/// Result alias used throughout the engine
pub type Result<T> = std::result::Result<T, Error>;

/// Typed reason for a denied decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Denial {
    /// Resource does not exist, or the caller may not know that it exists
    #[error("Resource not found")]
    NotFound,

    /// Caller can see the resource but does not hold the required ownership or role
    #[error("Not the owner of this resource")]
    NotOwner,

    /// Caller's role does not permit the operation
    #[error("Operation not permitted")]
    Forbidden,

    /// Caller's account is deactivated
    #[error("User account is inactive")]
    InactiveUser,

    /// An admin tried to revoke their own admin or active flag
    #[error("Administrators cannot revoke their own admin or active status")]
    SelfProtection,

    /// Creating one more unit would exceed the tier limit
    #[error("{} limit of {limit} reached", resource.as_str())]
    QuotaExceeded { resource: QuotaResource, limit: i64 },

    /// Invitation passed its expiry time
    #[error("Invitation has expired")]
    InvitationExpired,

    /// Invitation already reached a terminal state
    #[error("Invitation has already been responded to")]
    AlreadyResponded,

    /// The group's sole owner cannot be demoted or removed
    #[error("The group owner cannot be removed or demoted")]
    LastOwnerProtected,

    /// Requested transition does not apply to the current state
    #[error("Invalid state transition")]
    InvalidTransition,
}

impl Denial {
    /// Stable reason code, used in HTTP bodies and decision log rows
    pub fn code(&self) -> &'static str {
        match self {
            Denial::NotFound => "not_found",
            Denial::NotOwner => "not_owner",
            Denial::Forbidden => "forbidden",
            Denial::InactiveUser => "inactive_user",
            Denial::SelfProtection => "self_protection",
            Denial::QuotaExceeded { .. } => "quota_exceeded",
            Denial::InvitationExpired => "invitation_expired",
            Denial::AlreadyResponded => "already_responded",
            Denial::LastOwnerProtected => "last_owner_protected",
            Denial::InvalidTransition => "invalid_transition",
        }
    }

    /// Whether the denial hides the existence of the target resource
    pub fn hides_resource(&self) -> bool {
        matches!(self, Denial::NotFound)
    }
}

/// Engine error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The engine denied the operation
    #[error("Access denied: {0}")]
    Denied(#[from] Denial),

    /// Request failed validation
    #[error("Invalid request: {0}")]
    Invalid(String),

    /// Request conflicts with existing state (duplicate name, existing member, ...)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A feature toggle switched the capability off
    #[error("The {0} feature is disabled")]
    FeatureDisabled(&'static str),

    /// Storage failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Error::Invalid(errors.to_string())
    }
}

/// Postgres SQLSTATE codes that indicate contention rather than a bad request
const TRANSIENT_SQLSTATES: [&str; 3] = [
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "55P03", // lock_not_available
];

impl Error {
    /// Returns the denial reason if this is a denied decision
    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Error::Denied(denial) => Some(denial),
            _ => None,
        }
    }

    /// Whether retrying the whole transaction may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::PoolTimedOut) => true,
            Error::Database(sqlx::Error::Database(db_err)) => db_err
                .code()
                .map(|code| TRANSIENT_SQLSTATES.contains(&&*code))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Maps a unique violation on `constraint` to [`Error::Conflict`]
    ///
    /// Any other error is wrapped unchanged.
    pub(crate) fn conflict_on(err: sqlx::Error, constraint: &str, message: &str) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.constraint() == Some(constraint) {
                return Error::Conflict(message.to_string());
            }
        }
        Error::Database(err)
    }
}
