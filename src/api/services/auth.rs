//! 认证与用户管理端点

use actix_web::{HttpResponse, Responder, Result as ActixResult, web};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::api::jwt::get_jwt_service;
use crate::api::response::{api_created, api_result, error_from_nestogy, success_response};
use crate::errors::{FieldErrorsBuilder, NestogyError};
use crate::services::tenancy::{CreateUserRequest, UpdateUserRequest};
use crate::services::{AppServices, TenantContext};
use migration::entities::{company, user};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub user: user::Model,
    pub company: company::Model,
}

/// POST /auth/login
pub async fn login(
    body: web::Json<LoginRequest>,
    services: web::Data<AppServices>,
) -> ActixResult<impl Responder> {
    let mut errors = FieldErrorsBuilder::new();
    if body.email.trim().is_empty() {
        errors.add("email", "is required");
    }
    if body.password.is_empty() {
        errors.add("password", "is required");
    }
    if let Err(e) = errors.finish() {
        return Ok(error_from_nestogy(&e));
    }

    let authenticated = match services.auth.authenticate(&body.email, &body.password).await {
        Ok(found) => found,
        Err(e) => return Ok(error_from_nestogy(&e)),
    };

    let issued = match get_jwt_service().generate_access_token(&authenticated.context()) {
        Ok(issued) => issued,
        Err(e) => {
            error!("API: failed to generate access token: {}", e);
            return Ok(error_from_nestogy(&NestogyError::internal(
                "Failed to generate token",
            )));
        }
    };

    info!(
        "API: user {} logged in (company {})",
        authenticated.user.id, authenticated.company.id
    );
    Ok(success_response(LoginResponse {
        token: issued.token,
        token_type: "Bearer",
        expires_at: issued.expires_at,
        user: authenticated.user,
        company: authenticated.company,
    }))
}

/// GET /auth/me
pub async fn me(ctx: TenantContext, services: web::Data<AppServices>) -> ActixResult<impl Responder> {
    Ok(api_result(services.auth.current_user(&ctx).await))
}

/// GET /users
pub async fn list_users(
    ctx: TenantContext,
    services: web::Data<AppServices>,
) -> ActixResult<impl Responder> {
    Ok(api_result(services.auth.list_users(&ctx).await))
}

/// POST /users
pub async fn create_user(
    ctx: TenantContext,
    body: web::Json<CreateUserRequest>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_created(
        services.auth.create_user(&ctx, body.into_inner()).await,
    ))
}

/// PUT /users/{id}
pub async fn update_user(
    ctx: TenantContext,
    path: web::Path<i32>,
    body: web::Json<UpdateUserRequest>,
    services: web::Data<AppServices>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        services
            .auth
            .update_user(&ctx, path.into_inner(), body.into_inner())
            .await,
    ))
}
