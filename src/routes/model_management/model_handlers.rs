use actix_web::{web, HttpRequest, HttpResponse};
use log::{info, warn};
use sqlx::MySqlPool;
use uuid::Uuid;

use super::model_models::{PageQuery, UpdateModelRequest};
use crate::auth::authenticate;
use crate::error::ApiError;
use crate::helpers::{client_ip, page_offset, Page};
use crate::models::audit::{self, AuditEntry};
use crate::models::user::User;
use crate::models::voice_model::{
    Tag, VoiceModel, MODEL_STATUS_ACTIVE, MODEL_STATUS_PENDING_REVIEW, MODEL_TYPE_OFFICIAL,
    REVIEW_APPROVED, REVIEW_PENDING,
};
use crate::routes::respond;
use crate::validators::{validate_model_name, validate_pagination};

pub async fn my_models(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    let (page, per_page) = validate_pagination(query.page, query.per_page)?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM voice_models WHERE owner_id = ?")
        .bind(&user.id)
        .fetch_one(pool.get_ref())
        .await?;

    let models = sqlx::query_as::<_, VoiceModel>(
        "SELECT * FROM voice_models WHERE owner_id = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
    )
    .bind(&user.id)
    .bind(per_page as i64)
    .bind(page_offset(page, per_page))
    .fetch_all(pool.get_ref())
    .await?;

    Ok(respond::ok_with(
        "Models retrieved successfully",
        Page::new(models, total, page, per_page),
    ))
}

pub async fn list_tags(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    authenticate(pool.get_ref(), &http).await?;
    let tags = sqlx::query_as::<_, Tag>("SELECT * FROM tags ORDER BY name")
        .fetch_all(pool.get_ref())
        .await?;
    Ok(respond::ok_with("Tags retrieved successfully", tags))
}

pub async fn model_detail(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    let model = sqlx::query_as::<_, VoiceModel>("SELECT * FROM voice_models WHERE id = ?")
        .bind(path.as_str())
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or(ApiError::NotFound("Voice model"))?;

    let is_owner = model.owner_id.as_deref() == Some(user.id.as_str());
    if !is_owner && !user.is_auditor() && !(model.is_public && model.is_usable()) {
        return Err(ApiError::NotFound("Voice model"));
    }

    let tags = sqlx::query_as::<_, Tag>(
        "SELECT t.* FROM tags t JOIN model_tags mt ON mt.tag_id = t.id WHERE mt.model_id = ?",
    )
    .bind(&model.id)
    .fetch_all(pool.get_ref())
    .await?;

    let owner = match &model.owner_id {
        Some(owner_id) => sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(owner_id)
            .fetch_optional(pool.get_ref())
            .await?
            .map(|u| u.to_public()),
        None => None,
    };

    let data = if is_owner || user.is_auditor() {
        serde_json::json!({ "model": model, "tags": tags, "owner": owner })
    } else {
        serde_json::json!({ "model": model.to_public(), "tags": tags, "owner": owner })
    };
    Ok(respond::ok_with("Model retrieved successfully", data))
}

pub async fn update_model(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    path: web::Path<String>,
    req: web::Json<UpdateModelRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    let model = owned_model(pool.get_ref(), path.as_str(), &user.id).await?;

    if let Some(name) = &req.name {
        let name = name.trim();
        validate_model_name(name)?;
        if name != model.name {
            let taken: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM voice_models WHERE owner_id = ? AND name = ? AND id != ?",
            )
            .bind(&user.id)
            .bind(name)
            .bind(&model.id)
            .fetch_one(pool.get_ref())
            .await?;
            if taken > 0 {
                return Err(ApiError::Conflict(
                    "You already have a model with this name".into(),
                ));
            }
        }
        sqlx::query("UPDATE voice_models SET name = ? WHERE id = ?")
            .bind(name)
            .bind(&model.id)
            .execute(pool.get_ref())
            .await?;
    }

    if let Some(description) = &req.description {
        sqlx::query("UPDATE voice_models SET description = ? WHERE id = ?")
            .bind(description.trim())
            .bind(&model.id)
            .execute(pool.get_ref())
            .await?;
    }

    if let Some(tag_ids) = &req.tag_ids {
        sqlx::query("DELETE FROM model_tags WHERE model_id = ?")
            .bind(&model.id)
            .execute(pool.get_ref())
            .await?;
        for tag_id in tag_ids {
            let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tags WHERE id = ?")
                .bind(tag_id)
                .fetch_one(pool.get_ref())
                .await?;
            if exists == 0 {
                return Err(ApiError::Validation(format!("Unknown tag: {}", tag_id)));
            }
            sqlx::query("INSERT INTO model_tags (id, model_id, tag_id) VALUES (?, ?, ?)")
                .bind(Uuid::new_v4().to_string())
                .bind(&model.id)
                .bind(tag_id)
                .execute(pool.get_ref())
                .await?;
        }
    }

    let ip = client_ip(&http);
    audit::record(
        pool.get_ref(),
        AuditEntry::new("update_model", "voice_model")
            .resource_id(&model.id)
            .user_id(&user.id)
            .ip(ip.as_deref()),
    )
    .await;

    Ok(respond::ok("Model updated successfully"))
}

pub async fn delete_model(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    let model = if user.is_admin() {
        sqlx::query_as::<_, VoiceModel>("SELECT * FROM voice_models WHERE id = ?")
            .bind(path.as_str())
            .fetch_optional(pool.get_ref())
            .await?
            .ok_or(ApiError::NotFound("Voice model"))?
    } else {
        owned_model(pool.get_ref(), path.as_str(), &user.id).await?
    };

    let in_use: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM tts_tasks WHERE model_id = ? AND status IN ('pending', 'processing')",
    )
    .bind(&model.id)
    .fetch_one(pool.get_ref())
    .await?;
    if in_use > 0 {
        return Err(ApiError::Conflict(
            "Model is in use by an active synthesis task".into(),
        ));
    }

    sqlx::query("DELETE FROM model_tags WHERE model_id = ?")
        .bind(&model.id)
        .execute(pool.get_ref())
        .await?;
    sqlx::query("DELETE FROM voice_models WHERE id = ?")
        .bind(&model.id)
        .execute(pool.get_ref())
        .await?;

    if let Err(e) = tokio::fs::remove_file(&model.model_path).await {
        warn!("could not remove model file {}: {}", model.model_path, e);
    }

    info!("user {} deleted model {}", user.username, model.id);
    let ip = client_ip(&http);
    audit::record(
        pool.get_ref(),
        AuditEntry::new("delete_model", "voice_model")
            .resource_id(&model.id)
            .user_id(&user.id)
            .ip(ip.as_deref()),
    )
    .await;

    Ok(respond::ok("Model deleted successfully"))
}

pub async fn toggle_public(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    let model = owned_model(pool.get_ref(), path.as_str(), &user.id).await?;

    let now_public = !model.is_public;
    if now_public {
        // Sharing a model publicly requires a fresh review pass. The previous
        // reviewed_by/reviewed_at stay in place as the record of the last pass.
        sqlx::query(
            "UPDATE voice_models SET is_public = TRUE, review_status = ?, status = ?, \
             review_message = NULL WHERE id = ?",
        )
        .bind(REVIEW_PENDING)
        .bind(MODEL_STATUS_PENDING_REVIEW)
        .bind(&model.id)
        .execute(pool.get_ref())
        .await?;
    } else if model.review_status == REVIEW_PENDING && model.reviewed_at.is_some() {
        // Withdrawing an unreviewed public request: the model had been
        // approved before, so private use comes back immediately.
        sqlx::query(
            "UPDATE voice_models SET is_public = FALSE, review_status = ?, status = ? WHERE id = ?",
        )
        .bind(REVIEW_APPROVED)
        .bind(MODEL_STATUS_ACTIVE)
        .bind(&model.id)
        .execute(pool.get_ref())
        .await?;
    } else {
        sqlx::query("UPDATE voice_models SET is_public = FALSE WHERE id = ?")
            .bind(&model.id)
            .execute(pool.get_ref())
            .await?;
    }

    let ip = client_ip(&http);
    audit::record(
        pool.get_ref(),
        AuditEntry::new("toggle_model_public", "voice_model")
            .resource_id(&model.id)
            .user_id(&user.id)
            .ip(ip.as_deref())
            .detail(if now_public { "public" } else { "private" }),
    )
    .await;

    Ok(respond::ok_with(
        "Model visibility updated",
        serde_json::json!({ "is_public": now_public }),
    ))
}

async fn owned_model(
    pool: &MySqlPool,
    model_id: &str,
    user_id: &str,
) -> Result<VoiceModel, ApiError> {
    let model = sqlx::query_as::<_, VoiceModel>("SELECT * FROM voice_models WHERE id = ?")
        .bind(model_id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("Voice model"))?;
    if model.model_type == MODEL_TYPE_OFFICIAL {
        return Err(ApiError::Forbidden(
            "Official models are managed by administrators".into(),
        ));
    }
    if model.owner_id.as_deref() != Some(user_id) {
        return Err(ApiError::Forbidden(
            "You do not own this model".into(),
        ));
    }
    Ok(model)
}
