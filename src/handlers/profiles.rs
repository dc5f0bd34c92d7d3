use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;

use crate::db::models::{CreateProfile, NewAuditLog, Profile, UpdateProfile};
use crate::error::OpsError;
use crate::middleware::{Caller, ValidJson, ValidQuery};
use crate::router::OpsState;
use crate::types::{ApiResponse, Capability};
use crate::validation::{self, MAX_NAME_LEN};

pub fn router() -> Router<OpsState> {
    Router::new()
        .route("/profiles", get(list_profiles).post(create_profile))
        .route(
            "/profiles/{id}",
            get(get_profile).patch(update_profile).delete(delete_profile),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfilesQuery {
    pub kitchen_id: Option<i64>,
}

async fn list_profiles(
    State(state): State<OpsState>,
    caller: Caller,
    ValidQuery(query): ValidQuery<ProfilesQuery>,
) -> Result<Json<ApiResponse<Vec<Profile>>>, OpsError> {
    let visible = match query.kitchen_id {
        Some(kitchen_id) => {
            caller.require(kitchen_id, Capability::Read)?;
            Some(vec![kitchen_id])
        }
        None => caller.kitchen_ids(),
    };
    Ok(Json(ApiResponse::success(
        state.storage.list_profiles(visible.as_deref()).await?,
    )))
}

/// Shared validation for phone and work hours.
fn contact_fields(
    state: &OpsState,
    phone: Option<&str>,
    work_start: Option<&str>,
    work_end: Option<&str>,
) -> Result<(Option<String>, Option<String>, Option<String>), OpsError> {
    let phone = phone
        .filter(|p| !p.trim().is_empty())
        .map(|p| validation::phone(p, state.notifier.whatsapp().country_code()))
        .transpose()?;
    let (start, end) = validation::work_hours(work_start, work_end)?;
    Ok((phone, start, end))
}

async fn create_profile(
    State(state): State<OpsState>,
    caller: Caller,
    ValidJson(body): ValidJson<CreateProfile>,
) -> Result<Json<ApiResponse<Profile>>, OpsError> {
    match body.kitchen_id {
        Some(kitchen_id) => caller.require(kitchen_id, Capability::ManageKitchen)?,
        None => caller.require_admin_somewhere()?,
    }
    if body.kitchen_id.is_some() != body.role.is_some() {
        return Err(OpsError::Validation(
            "kitchen_id and role must be given together".into(),
        ));
    }

    let (phone, work_start, work_end) = contact_fields(
        &state,
        body.phone.as_deref(),
        body.work_start.as_deref(),
        body.work_end.as_deref(),
    )?;
    let data = CreateProfile {
        email: validation::email(&body.email)?,
        full_name: validation::required_text("full_name", &body.full_name, MAX_NAME_LEN)?,
        phone,
        work_start,
        work_end,
        whatsapp_enabled: body.whatsapp_enabled,
        kitchen_id: body.kitchen_id,
        role: body.role,
    };
    if let Some(kitchen_id) = data.kitchen_id {
        state.storage.get_kitchen(kitchen_id).await?;
    }

    let profile = state.storage.create_profile(&data).await.map_err(|e| match e {
        OpsError::DatabaseError(sqlx::Error::Database(ref db)) if db.is_unique_violation() => {
            OpsError::Conflict(format!("email {} is already registered", data.email))
        }
        other => other,
    })?;

    if let (Some(kitchen_id), Some(role)) = (data.kitchen_id, data.role) {
        state
            .storage
            .upsert_membership(profile.id, kitchen_id, role)
            .await?;
    }

    let mut entry = NewAuditLog::new("profile.created", "profile")
        .by(caller.profile_id())
        .entity(profile.id)
        .details(json!({ "email": profile.email, "role": data.role }));
    if let Some(kitchen_id) = data.kitchen_id {
        entry = entry.kitchen(kitchen_id);
    }
    state.storage.audit(entry).await;
    Ok(Json(ApiResponse::success(profile)))
}

/// True when `caller` holds `cap` in some kitchen the target profile belongs to.
async fn holds_in_shared_kitchen(
    state: &OpsState,
    caller: &Caller,
    id: i64,
    cap: Capability,
) -> Result<bool, OpsError> {
    if caller.kitchen_ids().is_none() {
        return Ok(true);
    }
    Ok(state
        .storage
        .memberships_of(id)
        .await?
        .iter()
        .any(|m| caller.can(m.kitchen_id, cap)))
}

/// The profile itself, or anyone sharing a kitchen with it.
async fn ensure_can_view(state: &OpsState, caller: &Caller, id: i64) -> Result<(), OpsError> {
    if caller.profile_id() == Some(id)
        || holds_in_shared_kitchen(state, caller, id, Capability::Read).await?
    {
        Ok(())
    } else {
        Err(OpsError::Forbidden("profile is outside your kitchens".into()))
    }
}

/// An admin of one of the target's kitchens.
async fn ensure_can_manage(state: &OpsState, caller: &Caller, id: i64) -> Result<(), OpsError> {
    if holds_in_shared_kitchen(state, caller, id, Capability::ManageKitchen).await? {
        Ok(())
    } else {
        Err(OpsError::Forbidden(
            "profile is not managed by any of your kitchens".into(),
        ))
    }
}

async fn get_profile(
    State(state): State<OpsState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Profile>>, OpsError> {
    ensure_can_view(&state, &caller, id).await?;
    Ok(Json(ApiResponse::success(state.storage.get_profile(id).await?)))
}

async fn update_profile(
    State(state): State<OpsState>,
    caller: Caller,
    Path(id): Path<i64>,
    ValidJson(body): ValidJson<UpdateProfile>,
) -> Result<Json<ApiResponse<Profile>>, OpsError> {
    let is_self = caller.profile_id() == Some(id);
    if !is_self {
        ensure_can_manage(&state, &caller, id).await?;
    } else if body.is_active.is_some() {
        return Err(OpsError::Forbidden(
            "profiles cannot change their own activation".into(),
        ));
    }

    let current = state.storage.get_profile(id).await?;
    let phone = match body.phone {
        Some(Some(ref p)) if !p.trim().is_empty() => Some(Some(validation::phone(
            p,
            state.notifier.whatsapp().country_code(),
        )?)),
        Some(_) => Some(None),
        None => None,
    };

    // Validate the pair that will be stored, not just the fields sent.
    let start = body.work_start.clone().unwrap_or(current.work_start);
    let end = body.work_end.clone().unwrap_or(current.work_end);
    let (start, end) = validation::work_hours(start.as_deref(), end.as_deref())?;

    let patch = UpdateProfile {
        full_name: body
            .full_name
            .as_deref()
            .map(|n| validation::required_text("full_name", n, MAX_NAME_LEN))
            .transpose()?,
        phone,
        work_start: body.work_start.as_ref().map(|_| start),
        work_end: body.work_end.as_ref().map(|_| end),
        whatsapp_enabled: body.whatsapp_enabled,
        is_active: body.is_active,
    };
    let profile = state.storage.update_profile(id, &patch).await?;
    state
        .storage
        .audit(
            NewAuditLog::new("profile.updated", "profile")
                .by(caller.profile_id())
                .entity(id),
        )
        .await;
    Ok(Json(ApiResponse::success(profile)))
}

async fn delete_profile(
    State(state): State<OpsState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, OpsError> {
    if caller.profile_id() == Some(id) {
        return Err(OpsError::Validation("profiles cannot deactivate themselves".into()));
    }
    ensure_can_manage(&state, &caller, id).await?;
    state.storage.deactivate_profile(id).await?;
    state
        .storage
        .audit(
            NewAuditLog::new("profile.deactivated", "profile")
                .by(caller.profile_id())
                .entity(id),
        )
        .await;
    Ok(Json(ApiResponse::success(json!({ "id": id, "is_active": false }))))
}
