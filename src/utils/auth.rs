use subtle::ConstantTimeEq;

pub const BEARER_PREFIX: &str = "Bearer ";

/// Whether an `Authorization` header value carries the admin token.
///
/// Always false when no admin token is configured. The token comparison runs
/// in constant time; prefix and length are checked beforehand since the
/// length of the secret is not considered sensitive.
pub fn is_admin(authorization: Option<&str>, admin_token: &str) -> bool {
    if admin_token.is_empty() {
        return false;
    }

    let Some(presented) = authorization.and_then(|h| h.strip_prefix(BEARER_PREFIX)) else {
        return false;
    };

    if presented.len() != admin_token.len() {
        return false;
    }

    presented.as_bytes().ct_eq(admin_token.as_bytes()).into()
}
