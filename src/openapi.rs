use crate::error::ApiErrorBody;
use crate::models::{EmailRequest, MeResponse, MessageResponse, TokenResponse, VerifyOtpRequest};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::register,
        crate::routes::request_otp,
        crate::routes::verify_otp,
        crate::routes::auth_me,
    ),
    components(schemas(
        EmailRequest, VerifyOtpRequest, MessageResponse, TokenResponse, MeResponse, ApiErrorBody
    )),
    tags(
        (name = "auth", description = "Passwordless login with one-time passcodes"),
    )
)]
pub struct ApiDoc;
