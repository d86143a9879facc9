/// Middleware modules for the API server
///
/// - `identity`: Bearer-token identity resolution and the admin feature gate

pub mod identity;
