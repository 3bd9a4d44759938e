use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(commands::auth::register))
        .route("/api/auth/login", post(commands::auth::login))
        .route("/api/auth/logout", post(commands::auth::logout))
        .route("/api/auth/session", get(commands::auth::session_status))
        .route(
            "/api/auth/confirm",
            get(commands::auth::confirm_email_link).post(commands::auth::confirm_email),
        )
        .route(
            "/api/auth/resend-confirmation",
            post(commands::auth::resend_confirmation),
        )
        .route("/api/auth/google", post(commands::auth::google_start))
        .route(
            "/api/auth/google/callback",
            post(commands::auth::google_callback),
        )
        .route("/api/auth/oauth/tokens", post(commands::auth::oauth_tokens))
        .route(
            "/api/auth/change-password",
            post(commands::auth::change_password),
        )
        .route(
            "/api/auth/forgot-password",
            post(commands::auth::forgot_password),
        )
        .route(
            "/api/auth/reset-password",
            post(commands::auth::reset_password),
        )
}
