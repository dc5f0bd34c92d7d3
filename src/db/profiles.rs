use chrono::Utc;

use crate::db::models::{CreateProfile, Profile, UpdateProfile};
use crate::db::sqlite::{OpsStorage, expect_affected};
use crate::error::OpsError;

const PROFILE_COLUMNS: &str =
    "id, email, full_name, phone, work_start, work_end, whatsapp_enabled, is_active, created_at";

impl OpsStorage {
    /// Inserts a profile. Fields are expected to be validated already.
    pub async fn create_profile(&self, data: &CreateProfile) -> Result<Profile, OpsError> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "INSERT INTO profiles
                (email, full_name, phone, work_start, work_end, whatsapp_enabled, is_active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 1, ?)
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(&data.email)
        .bind(&data.full_name)
        .bind(&data.phone)
        .bind(&data.work_start)
        .bind(&data.work_end)
        .bind(data.whatsapp_enabled.unwrap_or(true))
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await?;
        Ok(profile)
    }

    pub async fn get_profile(&self, id: i64) -> Result<Profile, OpsError> {
        sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(OpsError::NotFound("profile"))
    }

    /// All profiles, or only the members of the given kitchens.
    pub async fn list_profiles(&self, kitchens: Option<&[i64]>) -> Result<Vec<Profile>, OpsError> {
        let rows = match kitchens {
            Some(ids) => {
                sqlx::query_as::<_, Profile>(
                    "SELECT DISTINCT p.id, p.email, p.full_name, p.phone, p.work_start, p.work_end,
                            p.whatsapp_enabled, p.is_active, p.created_at
                     FROM profiles p
                     JOIN user_roles r ON r.profile_id = p.id
                     WHERE r.kitchen_id IN (SELECT value FROM json_each(?))
                     ORDER BY p.full_name",
                )
                .bind(serde_json::to_string(ids)?)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, Profile>(&format!(
                    "SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY full_name"
                ))
                .fetch_all(self.pool())
                .await?
            }
        };
        Ok(rows)
    }

    pub async fn update_profile(&self, id: i64, patch: &UpdateProfile) -> Result<Profile, OpsError> {
        let current = self.get_profile(id).await?;
        let full_name = patch.full_name.clone().unwrap_or(current.full_name);
        let phone = patch.phone.clone().unwrap_or(current.phone);
        let work_start = patch.work_start.clone().unwrap_or(current.work_start);
        let work_end = patch.work_end.clone().unwrap_or(current.work_end);
        let whatsapp_enabled = patch.whatsapp_enabled.unwrap_or(current.whatsapp_enabled);
        let is_active = patch.is_active.unwrap_or(current.is_active);

        let profile = sqlx::query_as::<_, Profile>(&format!(
            "UPDATE profiles SET full_name = ?, phone = ?, work_start = ?, work_end = ?,
                whatsapp_enabled = ?, is_active = ?
             WHERE id = ? RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(full_name)
        .bind(phone)
        .bind(work_start)
        .bind(work_end)
        .bind(whatsapp_enabled)
        .bind(is_active)
        .bind(id)
        .fetch_one(self.pool())
        .await?;
        Ok(profile)
    }

    /// Soft delete.
    pub async fn deactivate_profile(&self, id: i64) -> Result<(), OpsError> {
        let res = sqlx::query("UPDATE profiles SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        expect_affected(res, "profile")
    }
}
