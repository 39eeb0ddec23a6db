//! Registration and login endpoints.

use actix_web::{web, HttpResponse, Responder};

use crate::auth::password;
use crate::error::ServiceError;
use crate::models::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use crate::AppState;

/// Register a new user
async fn register(data: web::Data<AppState>, body: web::Json<RegisterRequest>) -> impl Responder {
    if body.username.trim().is_empty() || body.password.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Username and password must not be empty"
        }));
    }

    let password_hash = match password::hash_password(&body.password) {
        Ok(hash) => hash,
        Err(e) => {
            log::error!("Failed to hash password: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Internal server error"
            }));
        }
    };

    match data.db.insert_user(&body.username, &password_hash) {
        Ok(user) => HttpResponse::Ok().json(RegisterResponse {
            id: user.id,
            username: user.username,
            created_at: user.created_at,
            message: "User created".to_string(),
        }),
        Err(ServiceError::DuplicateUsername) => HttpResponse::BadRequest().json(
            serde_json::json!({
                "error": "Username already exists"
            }),
        ),
        Err(e) => {
            log::error!("Failed to register user: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Internal server error"
            }))
        }
    }
}

/// Check credentials and issue a token. Unknown username and wrong password
/// both come back as `InvalidCredentials` — one error kind, one shape, so
/// the response never reveals whether the username exists.
fn try_login(data: &web::Data<AppState>, body: &LoginRequest) -> Result<LoginResponse, ServiceError> {
    let user = data.db.find_user_by_username(&body.username)?;

    let verified = match &user {
        Some(u) => password::verify_password(&body.password, &u.password_hash)?,
        None => false,
    };

    match (user, verified) {
        (Some(u), true) => Ok(LoginResponse {
            access_token: data.authenticator.issue(u.id),
            token_type: "bearer".to_string(),
        }),
        _ => Err(ServiceError::InvalidCredentials),
    }
}

/// Log in and receive a bearer token
async fn login(data: web::Data<AppState>, body: web::Json<LoginRequest>) -> impl Responder {
    match try_login(&data, &body) {
        Ok(resp) => HttpResponse::Ok().json(resp),
        Err(ServiceError::InvalidCredentials) => HttpResponse::Unauthorized().json(
            serde_json::json!({
                "error": "Invalid credentials"
            }),
        ),
        Err(e) => {
            log::error!("Login failed: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Internal server error"
            }))
        }
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/auth")
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login)),
    );
}
