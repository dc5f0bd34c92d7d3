use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, put},
};
use serde::Deserialize;
use serde_json::json;

use crate::db::models::{
    AuditLog, CreateKitchen, Kitchen, MemberWithProfile, Membership, NewAuditLog, UpdateKitchen,
};
use crate::error::OpsError;
use crate::middleware::{Caller, ValidJson, ValidQuery};
use crate::router::OpsState;
use crate::types::{ApiResponse, Capability, Role};
use crate::validation::{self, MAX_NAME_LEN};

pub const DEFAULT_AUDIT_LIMIT: u32 = 100;
pub const MAX_AUDIT_LIMIT: u32 = 500;

pub fn router() -> Router<OpsState> {
    Router::new()
        .route("/kitchens", get(list_kitchens).post(create_kitchen))
        .route(
            "/kitchens/{id}",
            get(get_kitchen).patch(update_kitchen).delete(delete_kitchen),
        )
        .route("/kitchens/{id}/members", get(list_members))
        .route(
            "/kitchens/{id}/members/{profile_id}",
            put(set_member).delete(remove_member),
        )
        .route("/kitchens/{id}/audit-logs", get(list_audit_logs))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListKitchensQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

async fn list_kitchens(
    State(state): State<OpsState>,
    caller: Caller,
    ValidQuery(query): ValidQuery<ListKitchensQuery>,
) -> Result<Json<ApiResponse<Vec<Kitchen>>>, OpsError> {
    let visible = caller.kitchen_ids();
    let kitchens = state
        .storage
        .list_kitchens(query.include_inactive, visible.as_deref())
        .await?;
    Ok(Json(ApiResponse::success(kitchens)))
}

async fn create_kitchen(
    State(state): State<OpsState>,
    caller: Caller,
    ValidJson(body): ValidJson<CreateKitchen>,
) -> Result<Json<ApiResponse<Kitchen>>, OpsError> {
    caller.require_admin_somewhere()?;
    let data = CreateKitchen {
        code: validation::kitchen_code(&body.code)?,
        name: validation::required_text("name", &body.name, MAX_NAME_LEN)?,
        city: validation::optional_text("city", body.city.as_deref(), MAX_NAME_LEN)?,
        assistant_id: validation::optional_text("assistant_id", body.assistant_id.as_deref(), MAX_NAME_LEN)?,
    };
    let kitchen = state.storage.create_kitchen(&data).await.map_err(|e| match e {
        OpsError::DatabaseError(sqlx::Error::Database(ref db)) if db.is_unique_violation() => {
            OpsError::Conflict(format!("kitchen code {} already exists", data.code))
        }
        other => other,
    })?;

    // A profile creating a kitchen becomes its first admin.
    if let Some(profile_id) = caller.profile_id() {
        state
            .storage
            .upsert_membership(profile_id, kitchen.id, Role::Admin)
            .await?;
    }

    state
        .storage
        .audit(
            NewAuditLog::new("kitchen.created", "kitchen")
                .kitchen(kitchen.id)
                .by(caller.profile_id())
                .entity(kitchen.id)
                .details(json!({ "code": kitchen.code, "name": kitchen.name })),
        )
        .await;
    Ok(Json(ApiResponse::success(kitchen)))
}

async fn get_kitchen(
    State(state): State<OpsState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Kitchen>>, OpsError> {
    caller.require(id, Capability::Read)?;
    Ok(Json(ApiResponse::success(state.storage.get_kitchen(id).await?)))
}

async fn update_kitchen(
    State(state): State<OpsState>,
    caller: Caller,
    Path(id): Path<i64>,
    ValidJson(body): ValidJson<UpdateKitchen>,
) -> Result<Json<ApiResponse<Kitchen>>, OpsError> {
    caller.require(id, Capability::ManageKitchen)?;
    let patch = UpdateKitchen {
        name: body
            .name
            .as_deref()
            .map(|n| validation::required_text("name", n, MAX_NAME_LEN))
            .transpose()?,
        city: body
            .city
            .map(|c| validation::optional_text("city", c.as_deref(), MAX_NAME_LEN))
            .transpose()?,
        assistant_id: body
            .assistant_id
            .map(|a| validation::optional_text("assistant_id", a.as_deref(), MAX_NAME_LEN))
            .transpose()?,
        is_active: body.is_active,
    };
    let kitchen = state.storage.update_kitchen(id, &patch).await?;
    state
        .storage
        .audit(
            NewAuditLog::new("kitchen.updated", "kitchen")
                .kitchen(id)
                .by(caller.profile_id())
                .entity(id),
        )
        .await;
    Ok(Json(ApiResponse::success(kitchen)))
}

async fn delete_kitchen(
    State(state): State<OpsState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, OpsError> {
    caller.require(id, Capability::ManageKitchen)?;
    state.storage.deactivate_kitchen(id).await?;
    state
        .storage
        .audit(
            NewAuditLog::new("kitchen.deactivated", "kitchen")
                .kitchen(id)
                .by(caller.profile_id())
                .entity(id),
        )
        .await;
    Ok(Json(ApiResponse::success(json!({ "id": id, "is_active": false }))))
}

async fn list_members(
    State(state): State<OpsState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<MemberWithProfile>>>, OpsError> {
    caller.require(id, Capability::Read)?;
    Ok(Json(ApiResponse::success(state.storage.list_members(id).await?)))
}

#[derive(Debug, Deserialize)]
pub struct SetMemberBody {
    pub role: Role,
}

async fn set_member(
    State(state): State<OpsState>,
    caller: Caller,
    Path((id, profile_id)): Path<(i64, i64)>,
    ValidJson(body): ValidJson<SetMemberBody>,
) -> Result<Json<ApiResponse<Membership>>, OpsError> {
    caller.require(id, Capability::ManageKitchen)?;
    // Both rows must exist; FK errors would otherwise surface as 400.
    state.storage.get_kitchen(id).await?;
    state.storage.get_profile(profile_id).await?;

    let membership = state
        .storage
        .upsert_membership(profile_id, id, body.role)
        .await?;
    state
        .storage
        .audit(
            NewAuditLog::new("member.role_set", "membership")
                .kitchen(id)
                .by(caller.profile_id())
                .entity(membership.id)
                .details(json!({ "profile_id": profile_id, "role": body.role })),
        )
        .await;
    Ok(Json(ApiResponse::success(membership)))
}

async fn remove_member(
    State(state): State<OpsState>,
    caller: Caller,
    Path((id, profile_id)): Path<(i64, i64)>,
) -> Result<Json<ApiResponse<serde_json::Value>>, OpsError> {
    caller.require(id, Capability::ManageKitchen)?;
    if caller.profile_id() == Some(profile_id) {
        return Err(OpsError::Validation(
            "admins cannot remove their own membership".into(),
        ));
    }
    state.storage.remove_membership(profile_id, id).await?;
    state
        .storage
        .audit(
            NewAuditLog::new("member.removed", "membership")
                .kitchen(id)
                .by(caller.profile_id())
                .details(json!({ "profile_id": profile_id })),
        )
        .await;
    Ok(Json(ApiResponse::success(
        json!({ "kitchen_id": id, "profile_id": profile_id }),
    )))
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<u32>,
}

async fn list_audit_logs(
    State(state): State<OpsState>,
    caller: Caller,
    Path(id): Path<i64>,
    ValidQuery(query): ValidQuery<AuditQuery>,
) -> Result<Json<ApiResponse<Vec<AuditLog>>>, OpsError> {
    caller.require(id, Capability::ManageKitchen)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);
    Ok(Json(ApiResponse::success(
        state.storage.list_audit(id, limit).await?,
    )))
}
