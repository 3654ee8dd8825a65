use std::sync::Arc;
use actix_web::{error::InternalError, web, HttpRequest, HttpResponse, ResponseError};

use crate::error::{ApiErrorBody, AuthError};
use crate::models::*;
use crate::service::AuthService;
use crate::session::Auth;
use crate::validate::ValidationError;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config()).service(
        web::scope("/api/v1/auth")
            .service(web::resource("/register").route(web::post().to(register)))
            .service(web::resource("/request-otp").route(web::post().to(request_otp)))
            .service(web::resource("/verify-otp").route(web::post().to(verify_otp)))
            .service(web::resource("/me").route(web::get().to(auth_me))),
    );
}

/// Unparseable bodies get the same JSON error shape as every other failure.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(4096)
        .error_handler(|err, _req: &HttpRequest| {
            let resp = AuthError::Validation(ValidationError::MalformedBody(err.to_string())).error_response();
            InternalError::from_response(err, resp).into()
        })
}

#[derive(Clone)]
pub struct AppState { pub auth: Arc<AuthService> }

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = EmailRequest,
    responses(
        (status = 201, description = "User registered", body = MessageResponse),
        (status = 400, description = "AlreadyRegistered or InvalidEmail", body = ApiErrorBody)
    )
)]
pub async fn register(data: web::Data<AppState>, payload: web::Json<EmailRequest>) -> Result<HttpResponse, AuthError> {
    data.auth.register(&payload.email).await?;
    Ok(HttpResponse::Created().json(MessageResponse {
        message: "Registration successful. Please request a passcode to log in.".into(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/request-otp",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Passcode issued and sent", body = MessageResponse),
        (status = 400, description = "InvalidEmail", body = ApiErrorBody),
        (status = 404, description = "UserNotFound", body = ApiErrorBody),
        (status = 429, description = "RateLimited, see Retry-After", body = ApiErrorBody)
    )
)]
pub async fn request_otp(data: web::Data<AppState>, payload: web::Json<EmailRequest>) -> Result<HttpResponse, AuthError> {
    data.auth.request_code(&payload.email).await?;
    Ok(HttpResponse::Ok().json(MessageResponse { message: "Passcode sent to your email.".into() }))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 400, description = "InvalidOrExpired", body = ApiErrorBody)
    )
)]
pub async fn verify_otp(data: web::Data<AppState>, payload: web::Json<VerifyOtpRequest>) -> Result<HttpResponse, AuthError> {
    let session = data.auth.verify_code(&payload.email, &payload.otp).await?;
    Ok(HttpResponse::Ok()
        .insert_header((actix_web::http::header::CACHE_CONTROL, "no-store"))
        .json(TokenResponse {
            message: "Login successful.".into(),
            token: session.token.token,
            expires_at: session.token.expires_at,
        }))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Claims of the presented session token", body = MeResponse),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn auth_me(auth: Auth) -> HttpResponse {
    let expires_at = chrono::DateTime::from_timestamp(auth.0.exp, 0).unwrap_or_default();
    HttpResponse::Ok().json(MeResponse { id: auth.0.sub, email: auth.0.email, expires_at })
}
