//! Identity claims forwarded by the upstream auth gateway.
//!
//! The service never verifies credentials itself: the gateway terminates
//! authentication and forwards the verified identity in `X-Member-Id`
//! and role claims in `X-Roles` (comma-separated). Extraction is
//! infallible so public read endpoints can share the extractor; handlers
//! that need an identity or a role ask the claims explicitly.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::domain::MemberId;
use crate::error::LedgerError;

/// Header carrying the verified member identity.
pub const MEMBER_ID_HEADER: &str = "x-member-id";
/// Header carrying comma-separated role claims.
pub const ROLES_HEADER: &str = "x-roles";

/// Verified identity and roles for one request.
#[derive(Debug, Clone, Default)]
pub struct AuthClaims {
    member_id: Option<MemberId>,
    roles: Vec<String>,
}

impl AuthClaims {
    /// Builds claims directly, mainly for tests.
    #[must_use]
    pub fn new(member_id: Option<MemberId>, roles: Vec<String>) -> Self {
        Self { member_id, roles }
    }

    /// The authenticated member id.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidRequest`] when the gateway did not
    /// forward a parseable `X-Member-Id`.
    pub fn member(&self) -> Result<MemberId, LedgerError> {
        self.member_id.ok_or_else(|| {
            LedgerError::InvalidRequest("missing or invalid X-Member-Id header".to_string())
        })
    }

    /// Whether the request carries the given role claim.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Whether the request carries the `admin` role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has_role("admin")
    }

    /// Gate for admin-only operations.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Forbidden`] without the `admin` role.
    pub fn require_admin(&self, operation: &'static str) -> Result<(), LedgerError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(LedgerError::Forbidden(operation))
        }
    }

    /// Gate for operations a member may run on their own resources and
    /// an admin on anyone's.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Forbidden`] when the caller is neither the
    /// subject member nor an admin.
    pub fn require_self_or_admin(
        &self,
        subject: MemberId,
        operation: &'static str,
    ) -> Result<(), LedgerError> {
        if self.is_admin() || self.member_id == Some(subject) {
            Ok(())
        } else {
            Err(LedgerError::Forbidden(operation))
        }
    }
}

impl<S> FromRequestParts<S> for AuthClaims
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let member_id = parts
            .headers
            .get(MEMBER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<uuid::Uuid>().ok())
            .map(MemberId::from_uuid);
        let roles = parts
            .headers
            .get(ROLES_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.split(',')
                    .map(|r| r.trim().to_ascii_lowercase())
                    .filter(|r| !r.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self { member_id, roles })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn missing_identity_is_an_invalid_request() {
        let claims = AuthClaims::default();
        assert!(matches!(
            claims.member(),
            Err(LedgerError::InvalidRequest(_))
        ));
    }

    #[test]
    fn admin_gate() {
        let admin = AuthClaims::new(None, vec!["admin".to_string()]);
        assert!(admin.require_admin("fulfilment").is_ok());

        let member = AuthClaims::new(Some(MemberId::new()), vec!["member".to_string()]);
        assert!(matches!(
            member.require_admin("fulfilment"),
            Err(LedgerError::Forbidden("fulfilment"))
        ));
    }

    #[test]
    fn self_or_admin_gate() {
        let member_id = MemberId::new();
        let own = AuthClaims::new(Some(member_id), Vec::new());
        assert!(own.require_self_or_admin(member_id, "profile update").is_ok());
        assert!(
            own.require_self_or_admin(MemberId::new(), "profile update")
                .is_err()
        );

        let admin = AuthClaims::new(None, vec!["admin".to_string()]);
        assert!(
            admin
                .require_self_or_admin(MemberId::new(), "profile update")
                .is_ok()
        );
    }
}
