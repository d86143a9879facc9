/// Identity and authorization
///
/// # Modules
///
/// - [`jwt`]: validation of the identity provider's HS256 bearer tokens
/// - [`identity`]: the authenticated caller, resolved from a verified e-mail
/// - [`authorization`]: the resource guard, the single decision point for
///   groups, projects and incidents
/// - [`admin`]: the admin override layer and its self-protection rules
///
/// # Example
///
/// ```no_run
/// use statusguard_shared::auth::jwt::validate_token;
/// use statusguard_shared::auth::identity::Identity;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool, bearer: &str, secret: &str) -> Result<(), Box<dyn std::error::Error>> {
/// let claims = validate_token(bearer, secret)?;
/// let identity = Identity::resolve(&pool, &claims.sub).await?;
/// identity.require_active()?;
/// # Ok(())
/// # }
/// ```

pub mod admin;
pub mod authorization;
pub mod identity;
pub mod jwt;
