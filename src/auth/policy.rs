use crate::api::ApiError;
use crate::auth::Claims;

/// Allow only callers whose token claims superuser privilege.
pub fn require_superuser(claims: &Claims) -> Result<(), ApiError> {
    if claims.is_superuser {
        Ok(())
    } else {
        Err(ApiError::not_root())
    }
}

/// Work out which account a delete request targets.
///
/// An absent target always means "delete self", for superusers too.
/// Naming one's own id is the same as omitting it; naming anyone else's
/// requires superuser privilege.
pub fn resolve_delete_target(claims: &Claims, target: Option<i32>) -> Result<i32, ApiError> {
    match target {
        None => Ok(claims.id),
        Some(id) if id == claims.id => Ok(id),
        Some(id) => {
            require_superuser(claims)?;
            Ok(id)
        }
    }
}
