use uuid::Uuid;

use super::Claims;
use crate::domain::Role;
use crate::error::ApiError;

/// Authenticated user context extracted from the JWT
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
    pub email: String,
}

impl AuthContext {
    pub fn from_claims(claims: &Claims) -> Result<Self, &'static str> {
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| "Invalid user ID in token")?;

        Ok(Self {
            user_id,
            role: claims.role,
            email: claims.email.clone(),
        })
    }

    /// 403 unless the caller has `role`
    pub fn require_role(&self, role: Role) -> Result<(), ApiError> {
        if self.role == role {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!(
                "This action is only available to {} accounts",
                role
            )))
        }
    }

    /// 403 unless the caller has one of `roles`
    pub fn require_any(&self, roles: &[Role]) -> Result<(), ApiError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::forbidden("Your account role cannot perform this action"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str, role: Role) -> Claims {
        Claims {
            sub: sub.to_string(),
            role,
            email: "meera@example.com".into(),
            iss: "interiorquote".into(),
            iat: 0,
            exp: 0,
        }
    }

    #[test]
    fn builds_from_claims() {
        let id = Uuid::new_v4();
        let ctx = AuthContext::from_claims(&claims(&id.to_string(), Role::Seller)).unwrap();
        assert_eq!(ctx.user_id, id);
        assert_eq!(ctx.role, Role::Seller);
    }

    #[test]
    fn rejects_non_uuid_subject() {
        assert!(AuthContext::from_claims(&claims("42", Role::Seller)).is_err());
    }

    #[test]
    fn role_guards() {
        let ctx = AuthContext::from_claims(&claims(&Uuid::new_v4().to_string(), Role::Designer))
            .unwrap();
        assert!(ctx.require_role(Role::Designer).is_ok());
        assert!(matches!(
            ctx.require_role(Role::Customer),
            Err(ApiError::Forbidden(_))
        ));
        assert!(ctx.require_any(&[Role::Seller, Role::Designer]).is_ok());
        assert!(ctx.require_any(&[Role::Seller]).is_err());
    }
}
