use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::sync::Arc;

use crate::error::MeliError;
use crate::session::{clear_cookie, extract_token, SessionState, SESSION_COOKIE};
use crate::state::AppState;
use crate::store::RecordStore;

/// Signed-in owner attached to the request by [`session_middleware`].
#[derive(Clone)]
pub struct CurrentUser {
    pub sid: String,
    pub session: SessionState,
    /// Store handle acting with the owner's access token.
    pub store: Arc<dyn RecordStore>,
}

impl CurrentUser {
    pub fn owner_id(&self) -> &str {
        &self.session.owner_id
    }
}

const PUBLIC_PREFIXES: [&str; 4] = [
    "/api/botanical-classes",
    "/api/lotes/",
    "/api/usuario-info/",
    "/api/profile/",
];

const PUBLIC_ROUTES: [&str; 12] = [
    "/api/test",
    "/api/auth/login",
    "/api/auth/register",
    "/api/auth/logout",
    "/api/auth/session",
    "/api/auth/confirm",
    "/api/auth/resend-confirmation",
    "/api/auth/google",
    "/api/auth/google/callback",
    "/api/auth/oauth/tokens",
    "/api/auth/forgot-password",
    "/api/auth/reset-password",
];

pub fn is_public(path: &str) -> bool {
    if !path.starts_with("/api/") || PUBLIC_ROUTES.contains(&path) || path == "/api/buscar" {
        return true;
    }
    if path == "/api/profile/me" || path == "/api/lotes/reordenar" {
        return false;
    }
    if let Some(rest) = path.strip_prefix("/api/usuario/") {
        // The profile itself is public, its QR code is not.
        return !rest.ends_with("/qr");
    }
    PUBLIC_PREFIXES.iter().any(|p| path.starts_with(p))
}

fn unauthorized(message: &str, clear: bool) -> Response {
    let mut res = MeliError::Auth(message.to_string()).into_response();
    if clear {
        if let Ok(value) = clear_cookie(SESSION_COOKIE).parse::<HeaderValue>() {
            res.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    res
}

/// Resolves the session, refreshing provider tokens when they are about to
/// expire. Public routes pass through and get the user only when one is
/// signed in.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let public = is_public(&path);

    let resolved = extract_token(request.headers())
        .and_then(|token| state.sessions.resolve(&token));

    let (sid, mut session) = match resolved {
        Some(found) => found,
        None if public => return next.run(request).await,
        None => return unauthorized("Autenticación requerida", true),
    };

    if session.access_expired(Utc::now().timestamp()) {
        let refreshed = match session.refresh_token.clone() {
            Some(refresh_token) => state.auth.refresh(&refresh_token).await.ok(),
            None => None,
        };
        match refreshed {
            Some(tokens) => {
                tracing::debug!("Refreshed access token for {}", session.owner_id);
                session.token_expires_at = tokens.expiry(Utc::now().timestamp());
                session.access_token = tokens.access_token;
                if tokens.refresh_token.is_some() {
                    session.refresh_token = tokens.refresh_token;
                }
                if let Err(e) = state.sessions.replace(&sid, session.clone()) {
                    tracing::error!("Failed to store refreshed session: {}", e);
                }
            }
            None => {
                tracing::info!("Session {} expired and could not be refreshed", sid);
                if let Err(e) = state.sessions.remove(&sid) {
                    tracing::error!("Failed to drop expired session {}: {}", sid, e);
                }
                if public {
                    return next.run(request).await;
                }
                return unauthorized("Sesión expirada, inicia sesión nuevamente", true);
            }
        }
    }

    let store = state.stores.scoped(Some(&session.access_token));
    request.extensions_mut().insert(CurrentUser {
        sid,
        session,
        store,
    });

    next.run(request).await
}
