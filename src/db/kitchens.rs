use chrono::Utc;

use crate::db::models::{CreateKitchen, Kitchen, MemberWithProfile, Membership, UpdateKitchen};
use crate::db::sqlite::{OpsStorage, expect_affected};
use crate::error::OpsError;
use crate::types::Role;

const KITCHEN_COLUMNS: &str = "id, code, name, city, assistant_id, is_active, created_at";

impl OpsStorage {
    pub async fn create_kitchen(&self, data: &CreateKitchen) -> Result<Kitchen, OpsError> {
        let kitchen = sqlx::query_as::<_, Kitchen>(&format!(
            "INSERT INTO kitchens (code, name, city, assistant_id, is_active, created_at)
             VALUES (?, ?, ?, ?, 1, ?)
             RETURNING {KITCHEN_COLUMNS}"
        ))
        .bind(&data.code)
        .bind(&data.name)
        .bind(&data.city)
        .bind(&data.assistant_id)
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await?;
        Ok(kitchen)
    }

    pub async fn get_kitchen(&self, id: i64) -> Result<Kitchen, OpsError> {
        sqlx::query_as::<_, Kitchen>(&format!(
            "SELECT {KITCHEN_COLUMNS} FROM kitchens WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(OpsError::NotFound("kitchen"))
    }

    /// Lists kitchens, optionally restricted to the given ids.
    pub async fn list_kitchens(
        &self,
        include_inactive: bool,
        only: Option<&[i64]>,
    ) -> Result<Vec<Kitchen>, OpsError> {
        let rows = sqlx::query_as::<_, Kitchen>(&format!(
            "SELECT {KITCHEN_COLUMNS} FROM kitchens
             WHERE (? OR is_active = 1) ORDER BY name"
        ))
        .bind(include_inactive)
        .fetch_all(self.pool())
        .await?;
        Ok(match only {
            Some(ids) => rows.into_iter().filter(|k| ids.contains(&k.id)).collect(),
            None => rows,
        })
    }

    pub async fn update_kitchen(&self, id: i64, patch: &UpdateKitchen) -> Result<Kitchen, OpsError> {
        let current = self.get_kitchen(id).await?;
        let name = patch.name.clone().unwrap_or(current.name);
        let city = patch.city.clone().unwrap_or(current.city);
        let assistant_id = patch.assistant_id.clone().unwrap_or(current.assistant_id);
        let is_active = patch.is_active.unwrap_or(current.is_active);

        let kitchen = sqlx::query_as::<_, Kitchen>(&format!(
            "UPDATE kitchens SET name = ?, city = ?, assistant_id = ?, is_active = ?
             WHERE id = ? RETURNING {KITCHEN_COLUMNS}"
        ))
        .bind(name)
        .bind(city)
        .bind(assistant_id)
        .bind(is_active)
        .bind(id)
        .fetch_one(self.pool())
        .await?;
        Ok(kitchen)
    }

    /// Soft delete.
    pub async fn deactivate_kitchen(&self, id: i64) -> Result<(), OpsError> {
        let res = sqlx::query("UPDATE kitchens SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        expect_affected(res, "kitchen")
    }

    /// Insert or change a profile's role in a kitchen.
    pub async fn upsert_membership(
        &self,
        profile_id: i64,
        kitchen_id: i64,
        role: Role,
    ) -> Result<Membership, OpsError> {
        let membership = sqlx::query_as::<_, Membership>(
            r#"
            INSERT INTO user_roles (profile_id, kitchen_id, role, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(profile_id, kitchen_id) DO UPDATE SET role = excluded.role
            RETURNING id, profile_id, kitchen_id, role, created_at
            "#,
        )
        .bind(profile_id)
        .bind(kitchen_id)
        .bind(role)
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await?;
        Ok(membership)
    }

    pub async fn remove_membership(&self, profile_id: i64, kitchen_id: i64) -> Result<(), OpsError> {
        let res = sqlx::query("DELETE FROM user_roles WHERE profile_id = ? AND kitchen_id = ?")
            .bind(profile_id)
            .bind(kitchen_id)
            .execute(self.pool())
            .await?;
        expect_affected(res, "membership")
    }

    pub async fn memberships_of(&self, profile_id: i64) -> Result<Vec<Membership>, OpsError> {
        let rows = sqlx::query_as::<_, Membership>(
            "SELECT id, profile_id, kitchen_id, role, created_at
             FROM user_roles WHERE profile_id = ? ORDER BY kitchen_id",
        )
        .bind(profile_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn list_members(&self, kitchen_id: i64) -> Result<Vec<MemberWithProfile>, OpsError> {
        let rows = sqlx::query_as::<_, MemberWithProfile>(
            r#"
            SELECT r.profile_id, r.kitchen_id, r.role, p.email, p.full_name, p.phone, p.is_active
            FROM user_roles r
            JOIN profiles p ON p.id = r.profile_id
            WHERE r.kitchen_id = ?
            ORDER BY p.full_name
            "#,
        )
        .bind(kitchen_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
