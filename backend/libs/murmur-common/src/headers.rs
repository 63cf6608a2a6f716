//! Header names shared between the gateway and the services behind it

/// Subject of the authenticated principal, injected by the gateway
pub const PRINCIPAL_SUBJECT: &str = "x-principal-subject";

/// Expiry (unix seconds) of the authenticated principal's token
pub const PRINCIPAL_EXPIRES_AT: &str = "x-principal-expires-at";

/// Prefix reserved for principal headers; never accepted from clients
/// and never returned to them
pub const PRINCIPAL_PREFIX: &str = "x-principal-";

/// Request correlation id
pub const CORRELATION_ID: &str = "x-correlation-id";

/// Returns true for header names the gateway owns and must strip at the edge
pub fn is_principal_header(name: &str) -> bool {
    name.get(..PRINCIPAL_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(PRINCIPAL_PREFIX))
}
