use actix_service::{Service, Transform};
use actix_web::{
    Error, FromRequest, HttpMessage, HttpRequest,
    body::EitherBody,
    dev::{Payload, ServiceRequest, ServiceResponse},
    http::Method,
    web,
};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use std::rc::Rc;
use tracing::{debug, info, trace};

use crate::api::jwt::get_jwt_service;
use crate::api::response::{ApiError, error_from_nestogy};
use crate::errors::NestogyError;
use crate::services::{AppServices, TenantContext};

/// API 租户认证中间件
///
/// 校验 `Authorization: Bearer <jwt>`，成功后把 [`TenantContext`] 放进
/// request extensions；handler 通过 `TenantContext` 提取器读取。
#[derive(Clone)]
pub struct TenantAuth {
    public_paths: Rc<Vec<String>>,
}

impl TenantAuth {
    /// `public_paths` 中的路径无需认证（如登录）
    pub fn new<I, P>(public_paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            public_paths: Rc::new(public_paths.into_iter().map(Into::into).collect()),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for TenantAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = TenantAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TenantAuthMiddleware {
            service: Rc::new(service),
            public_paths: self.public_paths.clone(),
        }))
    }
}

pub struct TenantAuthMiddleware<S> {
    service: Rc<S>,
    public_paths: Rc<Vec<String>>,
}

/// 从 Authorization header 提取 Bearer token
fn extract_bearer_token(req: &ServiceRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// 校验 JWT 签名与有效期，得到 token 中声明的租户上下文
fn verify_token(req: &ServiceRequest) -> Result<TenantContext, NestogyError> {
    let token = extract_bearer_token(req)
        .ok_or_else(|| NestogyError::unauthorized("Unauthenticated."))?;
    match get_jwt_service().validate_access_token(&token) {
        Ok(claims) => {
            trace!("Bearer token validation successful for user {}", claims.sub);
            Ok(claims.context())
        }
        Err(e) => {
            info!("Bearer token validation failed: {}", e);
            Err(NestogyError::unauthorized("Unauthenticated."))
        }
    }
}

/// token 有效后再按库中状态确认用户与租户仍启用，角色取库中当前值
async fn authenticate(req: &ServiceRequest) -> Result<TenantContext, NestogyError> {
    let claimed = verify_token(req)?;
    let services = req
        .app_data::<web::Data<AppServices>>()
        .cloned()
        .ok_or_else(|| NestogyError::internal("AppServices is not registered"))?;
    services.auth.refresh_context(claimed).await.inspect_err(|e| {
        if matches!(e, NestogyError::Unauthorized(_)) {
            info!("Rejected token of inactive user {}", claimed.user_id);
        }
    })
}

impl<S, B> Service<ServiceRequest> for TenantAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = self.service.clone();
        let is_public =
            req.method() == Method::OPTIONS || self.public_paths.iter().any(|p| p == req.path());

        Box::pin(async move {
            if is_public {
                trace!("Public endpoint {} - bypassing authentication", req.path());
                return Ok(srv.call(req).await?.map_into_left_body());
            }

            match authenticate(&req).await {
                Ok(ctx) => {
                    req.extensions_mut().insert(ctx);
                    Ok(srv.call(req).await?.map_into_left_body())
                }
                Err(e) => {
                    debug!("Rejected unauthenticated request to {}", req.path());
                    let response = error_from_nestogy(&e).map_into_right_body();
                    Ok(req.into_response(response))
                }
            }
        })
    }
}

impl FromRequest for TenantContext {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<TenantContext>()
                .copied()
                .ok_or_else(|| ApiError(NestogyError::unauthorized("Unauthenticated."))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::jwt::JwtService;
    use crate::models::Role;
    use actix_web::{App, HttpResponse, test, web};

    async fn whoami(ctx: TenantContext) -> HttpResponse {
        HttpResponse::Ok().body(format!("{}:{}", ctx.company_id, ctx.user_id))
    }

    #[actix_rt::test]
    async fn test_missing_token_is_401_envelope() {
        let app = test::init_service(
            App::new()
                .wrap(TenantAuth::new(["/login"]))
                .route("/me", web::get().to(whoami))
                .route("/login", web::post().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/me").to_request()).await;
        assert_eq!(resp.status().as_u16(), 401);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);

        let resp =
            test::call_service(&app, test::TestRequest::post().uri("/login").to_request()).await;
        assert_eq!(resp.status().as_u16(), 200);
    }

    #[actix_rt::test]
    async fn test_foreign_signature_rejected() {
        crate::config::init_config();
        let app = test::init_service(
            App::new()
                .wrap(TenantAuth::new(Vec::<String>::new()))
                .route("/me", web::get().to(whoami)),
        )
        .await;

        let forged = JwtService::new("someone-elses-secret-key-000000", 15)
            .generate_access_token(&TenantContext::new(1, 1, Role::Admin))
            .unwrap();
        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header(("Authorization", format!("Bearer {}", forged.token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 401);
    }
}
