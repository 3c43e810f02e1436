use axum::response::Json;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use super::{
    error::ErrorBody,
    handlers::{auth, health, me, MessageBody},
};
use crate::{accounts::AccountProfile, session::TokenPair};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::register,
        auth::login,
        auth::refresh,
        auth::logout,
        me::me,
        me::update,
        me::delete,
    ),
    components(schemas(
        health::Health,
        auth::RegisterRequest,
        auth::LoginRequest,
        auth::RefreshRequest,
        me::UpdateProfileRequest,
        AccountProfile,
        TokenPair,
        MessageBody,
        ErrorBody,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Liveness"),
        (name = "auth", description = "Registration and session lifecycle"),
        (name = "users", description = "Authenticated account")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi())
}
