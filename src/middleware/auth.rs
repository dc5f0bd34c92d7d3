use axum::extract::{FromRequestParts, Request, State};
use axum::http::{HeaderMap, request::Parts};
use axum::middleware::Next;
use axum::response::Response;
use headers::{Authorization, HeaderMapExt, authorization::Bearer};
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::db::models::Profile;
use crate::error::OpsError;
use crate::router::OpsState;
use crate::types::{Capability, Role};

pub const OPS_KEY_HEADER: &str = "x-ops-key";
pub const PROFILE_HEADER: &str = "x-profile-id";

fn key_matches(candidate: &str, expected: &str) -> bool {
    bool::from(candidate.as_bytes().ct_eq(expected.as_bytes()))
}

/// Ensure the inbound request carries the service key.
/// Accepts either:
/// - Header: `x-ops-key: ...`
/// - Header: `Authorization: Bearer ...`
/// - Query string: `?key=...`
pub fn ensure_authorized(
    headers: &HeaderMap,
    query: Option<&str>,
    expected: &str,
) -> Result<(), OpsError> {
    if expected.is_empty() {
        return Err(OpsError::Unauthorized("service key is not configured".into()));
    }

    if let Some(hv) = headers.get(OPS_KEY_HEADER).and_then(|v| v.to_str().ok())
        && key_matches(hv.trim(), expected)
    {
        return Ok(());
    }

    if let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>()
        && key_matches(bearer.token(), expected)
    {
        return Ok(());
    }

    if let Some(qs) = query {
        for (k, v) in url::form_urlencoded::parse(qs.as_bytes()) {
            if k == "key" && key_matches(&v, expected) {
                return Ok(());
            }
        }
    }

    Err(OpsError::Unauthorized("invalid or missing key".into()))
}

/// Route layer guarding everything under `/api`.
pub async fn require_ops_key(
    State(state): State<OpsState>,
    req: Request,
    next: Next,
) -> Result<Response, OpsError> {
    ensure_authorized(req.headers(), req.uri().query(), &state.ops_key)?;
    Ok(next.run(req).await)
}

/// Who is acting on a request.
///
/// Requests without `x-profile-id` act as the service itself (cron jobs,
/// bootstrap) and are allowed everything.
#[derive(Debug, Clone)]
pub enum Caller {
    Service,
    Profile {
        profile: Profile,
        roles: HashMap<i64, Role>,
    },
}

impl Caller {
    pub fn profile(&self) -> Option<&Profile> {
        match self {
            Caller::Service => None,
            Caller::Profile { profile, .. } => Some(profile),
        }
    }

    pub fn profile_id(&self) -> Option<i64> {
        self.profile().map(|p| p.id)
    }

    pub fn role_in(&self, kitchen_id: i64) -> Option<Role> {
        match self {
            Caller::Service => Some(Role::Admin),
            Caller::Profile { roles, .. } => roles.get(&kitchen_id).copied(),
        }
    }

    pub fn can(&self, kitchen_id: i64, cap: Capability) -> bool {
        self.role_in(kitchen_id).is_some_and(|role| role.allows(cap))
    }

    pub fn require(&self, kitchen_id: i64, cap: Capability) -> Result<(), OpsError> {
        match self.role_in(kitchen_id) {
            Some(role) if role.allows(cap) => Ok(()),
            Some(role) => Err(OpsError::Forbidden(format!(
                "role {role} cannot perform this action"
            ))),
            None => Err(OpsError::Forbidden(format!(
                "not a member of kitchen {kitchen_id}"
            ))),
        }
    }

    /// Service, or an ADMIN of at least one kitchen.
    pub fn require_admin_somewhere(&self) -> Result<(), OpsError> {
        match self {
            Caller::Service => Ok(()),
            Caller::Profile { roles, .. } if roles.values().any(|r| *r == Role::Admin) => Ok(()),
            Caller::Profile { .. } => Err(OpsError::Forbidden("admin role required".into())),
        }
    }

    /// Kitchens visible to the caller; `None` means all of them.
    pub fn kitchen_ids(&self) -> Option<Vec<i64>> {
        match self {
            Caller::Service => None,
            Caller::Profile { roles, .. } => {
                let mut ids: Vec<i64> = roles.keys().copied().collect();
                ids.sort_unstable();
                Some(ids)
            }
        }
    }
}

impl FromRequestParts<OpsState> for Caller {
    type Rejection = OpsError;

    async fn from_request_parts(parts: &mut Parts, state: &OpsState) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(PROFILE_HEADER) else {
            return Ok(Caller::Service);
        };
        let profile_id: i64 = raw
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| OpsError::Unauthorized(format!("malformed {PROFILE_HEADER} header")))?;

        let profile = match state.storage.get_profile(profile_id).await {
            Ok(p) if p.is_active => p,
            Ok(_) | Err(OpsError::NotFound(_)) => {
                return Err(OpsError::Unauthorized(format!(
                    "profile {profile_id} is unknown or inactive"
                )));
            }
            Err(e) => return Err(e),
        };

        let roles = state
            .storage
            .memberships_of(profile_id)
            .await?
            .into_iter()
            .map(|m| (m.kitchen_id, m.role))
            .collect();
        debug!(profile_id, "request acting as profile");
        Ok(Caller::Profile { profile, roles })
    }
}
