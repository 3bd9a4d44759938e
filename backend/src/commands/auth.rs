use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::auth_client::{pkce_pair, AuthSession, AuthUser};
use crate::db::{ContactInfo, Table};
use crate::error::{MeliError, MeliResult};
use crate::middleware::auth::CurrentUser;
use crate::session::{
    clear_cookie, extract_token, read_cookie, set_cookie, SessionState, PKCE_COOKIE,
    SESSION_COOKIE,
};
use crate::state::AppState;
use crate::store::{decode_row, Filter, RecordStore};
use crate::validation::{validate_email, validate_username};

const MIN_PASSWORD: usize = 6;
// Link types a sign-up confirmation email can carry.
const CONFIRM_TYPES: [&str; 2] = ["email", "signup"];

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub company: Option<String>,
    pub nombre_completo: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub company: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub redirect_url: String,
    pub user: SessionUser,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackRequest {
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct OAuthTokensRequest {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    pub expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmRequest {
    pub token_hash: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResendConfirmationRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: Option<String>,
    pub password: Option<String>,
}

fn check_password(password: &str) -> MeliResult<()> {
    if password.chars().count() < MIN_PASSWORD {
        return Err(MeliError::Validation(format!(
            "La contraseña debe tener al menos {} caracteres",
            MIN_PASSWORD
        )));
    }
    Ok(())
}

fn with_cookie<T: Serialize>(cookie: String, body: T) -> Response {
    ([(header::SET_COOKIE, cookie)], Json(body)).into_response()
}

/// Username candidate from the email's local part.
pub fn username_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let mut name: String = local
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .take(70)
        .collect();
    while name.chars().count() < 3 {
        name.push('_');
    }
    name
}

fn row(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Creates the `usuarios` and `info_contacto` rows an owner is missing.
/// Returns true when the owner row was created by this call.
pub async fn ensure_owner_rows(
    store: &dyn RecordStore,
    user: &AuthUser,
    username: Option<&str>,
    full_name: Option<&str>,
    company: Option<&str>,
) -> MeliResult<bool> {
    let email = user.email.clone().unwrap_or_default();
    let mut created = false;

    if store.get(Table::Usuarios, &user.id).await?.is_none() {
        let mut candidate = username
            .map(str::to_string)
            .unwrap_or_else(|| username_from_email(&email));
        let taken = store
            .select(Table::Usuarios, &Filter::new().eq("username", candidate.as_str()).limit(1))
            .await?;
        if !taken.is_empty() {
            let suffix: String = user.id.chars().filter(|c| c.is_ascii_alphanumeric()).take(6).collect();
            candidate = format!("{}-{}", candidate, suffix);
        }
        store
            .insert(
                Table::Usuarios,
                row(json!({
                    "auth_user_id": user.id,
                    "username": candidate,
                    "tipo_usuario": "Regular",
                    "status": "activo",
                })),
            )
            .await?;
        created = true;
        tracing::info!("Owner row created for {}", user.id);
    }

    if store.get(Table::InfoContacto, &user.id).await?.is_none() {
        let full_name = full_name
            .map(str::to_string)
            .or_else(|| user.metadata_str("full_name").map(str::to_string))
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
        let company = company
            .map(str::to_string)
            .or_else(|| user.metadata_str("company").map(str::to_string));
        store
            .insert(
                Table::InfoContacto,
                row(json!({
                    "auth_user_id": user.id,
                    "nombre_completo": full_name,
                    "nombre_empresa": company,
                    "correo_principal": email,
                })),
            )
            .await?;
    }

    Ok(created)
}

/// Builds the server-side session for a provider session.
async fn open_session(state: &AppState, tokens: AuthSession) -> MeliResult<(String, SessionState)> {
    let store = state.stores.scoped(Some(&tokens.access_token));
    let contact: Option<ContactInfo> = match store.get(Table::InfoContacto, &tokens.user.id).await {
        Ok(found) => found.map(decode_row::<ContactInfo>).transpose()?,
        Err(e) => {
            tracing::warn!("Contact info unavailable for {}: {}", tokens.user.id, e);
            None
        }
    };

    let email = tokens.user.email.clone().unwrap_or_default();
    let user_name = contact
        .as_ref()
        .and_then(|c| c.nombre_completo.clone())
        .filter(|n| !n.trim().is_empty())
        .or_else(|| tokens.user.metadata_str("full_name").map(str::to_string))
        .unwrap_or_else(|| email.clone());
    let company = contact
        .and_then(|c| c.nombre_empresa)
        .or_else(|| tokens.user.metadata_str("company").map(str::to_string));

    let session = SessionState {
        owner_id: tokens.user.id.clone(),
        user_name,
        email,
        company,
        token_expires_at: tokens.expiry(Utc::now().timestamp()),
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    };
    let token = state.sessions.create(session.clone())?;
    Ok((token, session))
}

fn session_cookie(state: &AppState, token: &str) -> String {
    set_cookie(SESSION_COOKIE, token, state.sessions.ttl_secs())
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> MeliResult<Json<Value>> {
    let email = payload.email.trim().to_lowercase();
    if payload.username.trim().is_empty() || email.is_empty() || payload.password.is_empty() {
        return Err(MeliError::Validation("Todos los campos son requeridos".to_string()));
    }
    let username = validate_username(&payload.username).map_err(MeliError::Validation)?;
    let email = validate_email(&email).map_err(MeliError::Validation)?;
    check_password(&payload.password)?;

    let public = state.public_store();
    let taken = public
        .select(Table::Usuarios, &Filter::new().eq("username", username.as_str()).limit(1))
        .await?;
    if !taken.is_empty() {
        return Err(MeliError::Conflict("Username ya está en uso".to_string()));
    }

    state.limiter.check_and_record(public.as_ref(), &email).await?;

    let company = payload
        .company
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    let full_name = payload
        .nombre_completo
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(username.as_str())
        .to_string();

    let outcome = state
        .auth
        .sign_up(
            &email,
            &payload.password,
            json!({ "full_name": full_name, "company": company, "username": username }),
        )
        .await?;

    let store = match &outcome.session {
        Some(session) => state.stores.scoped(Some(&session.access_token)),
        None => public,
    };
    // Rows the store refuses now are created on the first login.
    if let Err(e) = ensure_owner_rows(
        store.as_ref(),
        &outcome.user,
        Some(username.as_str()),
        Some(full_name.as_str()),
        company,
    )
    .await
    {
        tracing::warn!("Profile rows for {} deferred: {}", outcome.user.id, e);
    }

    tracing::info!("Registered {} as {}", email, outcome.user.id);
    Ok(Json(json!({
        "success": true,
        "message": "Usuario creado exitosamente",
        "redirect_url": "/login",
        "requires_confirmation": outcome.session.is_none(),
    })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> MeliResult<Response> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || payload.password.is_empty() {
        return Err(MeliError::Validation(
            "Email y contraseña son requeridos".to_string(),
        ));
    }

    let tokens = state.auth.sign_in_password(&email, &payload.password).await?;
    let store = state.stores.scoped(Some(&tokens.access_token));
    if let Err(e) = ensure_owner_rows(store.as_ref(), &tokens.user, None, None, None).await {
        tracing::warn!("Could not complete profile rows for {}: {}", tokens.user.id, e);
    }

    let (token, session) = open_session(&state, tokens).await?;
    tracing::info!("Login for {}", session.owner_id);

    Ok(with_cookie(
        session_cookie(&state, &token),
        LoginResponse {
            success: true,
            message: "Login exitoso".to_string(),
            redirect_url: "/".to_string(),
            user: SessionUser {
                id: session.owner_id,
                email: session.email,
                name: session.user_name,
                company: session.company,
            },
        },
    ))
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> MeliResult<Response> {
    if let Some(token) = extract_token(&headers) {
        if let Some(session) = state.sessions.revoke(&token)? {
            if let Err(e) = state.auth.sign_out(&session.access_token).await {
                tracing::warn!("Provider sign-out failed for {}: {}", session.owner_id, e);
            }
        }
    }
    Ok(with_cookie(
        clear_cookie(SESSION_COOKIE),
        json!({ "success": true, "message": "Sesión cerrada correctamente" }),
    ))
}

pub async fn session_status(user: Option<Extension<CurrentUser>>) -> MeliResult<Json<Value>> {
    let Some(Extension(user)) = user else {
        return Ok(Json(json!({ "success": true, "logged_in": false })));
    };

    let username = user
        .store
        .get(Table::Usuarios, user.owner_id())
        .await?
        .and_then(|row| row.get("username").and_then(|v| v.as_str()).map(str::to_string));

    Ok(Json(json!({
        "success": true,
        "logged_in": true,
        "user": {
            "id": user.session.owner_id,
            "username": username,
            "email": user.session.email,
            "name": user.session.user_name,
            "company": user.session.company,
        }
    })))
}

pub async fn google_start(State(state): State<AppState>) -> MeliResult<Response> {
    let (verifier, challenge) = pkce_pair();
    let key = state.sessions.stash_verifier(verifier)?;
    let redirect_to = format!(
        "{}/auth/callback",
        state.config.public_base_url.trim_end_matches('/')
    );
    let url = state.auth.authorize_url("google", &redirect_to, &challenge);

    Ok(with_cookie(
        set_cookie(PKCE_COOKIE, &key, 600),
        json!({ "success": true, "url": url }),
    ))
}

async fn finish_oauth(state: &AppState, tokens: AuthSession) -> MeliResult<Response> {
    if tokens.user.email_confirmed_at.is_none() {
        return Err(MeliError::Forbidden(
            "Email no ha sido verificado por el proveedor".to_string(),
        ));
    }

    let store = state.stores.scoped(Some(&tokens.access_token));
    let first_login = ensure_owner_rows(store.as_ref(), &tokens.user, None, None, None)
        .await
        .map_err(|e| {
            tracing::error!("Profile initialisation failed for {}: {}", tokens.user.id, e);
            MeliError::Internal("Error al crear el perfil de usuario".to_string())
        })?;

    let (token, session) = open_session(state, tokens).await?;
    tracing::info!("OAuth login for {} (first: {})", session.owner_id, first_login);

    let redirect_url = if first_login { "/edit-profile" } else { "/" };
    Ok(with_cookie(
        session_cookie(state, &token),
        json!({
            "success": true,
            "message": "Autenticación exitosa",
            "redirect_url": redirect_url,
        }),
    ))
}

pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<OAuthCallbackRequest>,
) -> MeliResult<Response> {
    if payload.code.trim().is_empty() {
        return Err(MeliError::Validation("Código de autorización requerido".to_string()));
    }
    let verifier = match read_cookie(&headers, PKCE_COOKIE) {
        Some(key) => state.sessions.take_verifier(&key)?,
        None => None,
    }
    .ok_or_else(|| {
        MeliError::Auth("La autenticación con Google expiró, intenta nuevamente".to_string())
    })?;

    let tokens = state.auth.exchange_code(payload.code.trim(), &verifier).await?;
    let mut res = finish_oauth(&state, tokens).await?;
    if let Ok(value) = clear_cookie(PKCE_COOKIE).parse::<HeaderValue>() {
        res.headers_mut().append(header::SET_COOKIE, value);
    }
    Ok(res)
}

pub async fn oauth_tokens(
    State(state): State<AppState>,
    Json(payload): Json<OAuthTokensRequest>,
) -> MeliResult<Response> {
    let access_token = payload
        .access_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| MeliError::Validation("Access token requerido".to_string()))?;

    let user = state
        .auth
        .get_user(&access_token)
        .await
        .map_err(|_| MeliError::Auth("Token inválido".to_string()))?;

    let tokens = AuthSession {
        access_token,
        refresh_token: payload.refresh_token.filter(|t| !t.is_empty()),
        expires_in: payload.expires_in,
        expires_at: payload.expires_at,
        user,
    };
    finish_oauth(&state, tokens).await
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<ChangePasswordRequest>,
) -> MeliResult<Json<Value>> {
    let (current, new) = match (payload.current_password, payload.new_password) {
        (Some(c), Some(n)) if !c.is_empty() && !n.is_empty() => (c, n),
        _ => {
            return Err(MeliError::Validation(
                "Faltan parámetros: contraseña actual y nueva son requeridas.".to_string(),
            ))
        }
    };
    check_password(&new)?;

    state
        .auth
        .sign_in_password(&user.session.email, &current)
        .await
        .map_err(|_| MeliError::Auth("La contraseña actual es incorrecta".to_string()))?;
    state
        .auth
        .update_password(&user.session.access_token, &new)
        .await?;

    tracing::info!("Password changed for {}", user.owner_id());
    Ok(Json(json!({
        "success": true,
        "message": "Contraseña actualizada correctamente",
    })))
}

/// Always answers the same way so the response does not reveal accounts.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> MeliResult<Json<Value>> {
    let email = payload.email.trim();
    if email.is_empty() {
        return Err(MeliError::Validation("Email es requerido".to_string()));
    }
    let redirect_to = format!(
        "{}/reset-password",
        state.config.public_base_url.trim_end_matches('/')
    );
    if let Err(e) = state.auth.send_recovery(email, &redirect_to).await {
        tracing::warn!("Recovery email for {} failed: {}", email, e);
    }
    Ok(Json(json!({
        "success": true,
        "message": "Si el correo está registrado, recibirás un enlace para recuperar tu contraseña.",
    })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> MeliResult<Json<Value>> {
    let (token, password) = match (payload.token, payload.password) {
        (Some(t), Some(p)) if !t.is_empty() && !p.is_empty() => (t, p),
        _ => {
            return Err(MeliError::Validation(
                "Token y contraseña son requeridos".to_string(),
            ))
        }
    };
    check_password(&password)?;

    state
        .auth
        .update_password(&token, &password)
        .await
        .map_err(|e| {
            tracing::warn!("Password reset rejected: {}", e);
            MeliError::Validation(
                "Token inválido o expirado. Solicita un nuevo enlace de recuperación.".to_string(),
            )
        })?;

    Ok(Json(json!({
        "success": true,
        "message": "Contraseña actualizada correctamente",
    })))
}

/// Redeems the confirmation link and creates the owner rows that sign-up
/// could not write without a session.
async fn confirm(state: &AppState, payload: ConfirmRequest) -> MeliResult<Json<Value>> {
    let token_hash = payload
        .token_hash
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| MeliError::Validation("Token de confirmación es requerido".to_string()))?;
    let kind = payload
        .kind
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .unwrap_or("email")
        .to_lowercase();
    if !CONFIRM_TYPES.contains(&kind.as_str()) {
        return Err(MeliError::Validation(format!(
            "Tipo de confirmación '{}' no soportado",
            kind
        )));
    }

    let tokens = state
        .auth
        .verify_email(token_hash, &kind)
        .await
        .map_err(|e| {
            tracing::warn!("Email confirmation rejected: {}", e);
            MeliError::Validation("El enlace de confirmación es inválido o expiró".to_string())
        })?;

    let user = &tokens.user;
    let store = state.stores.scoped(Some(&tokens.access_token));
    ensure_owner_rows(
        store.as_ref(),
        user,
        user.metadata_str("username"),
        user.metadata_str("full_name"),
        user.metadata_str("company"),
    )
    .await
    .map_err(|e| {
        tracing::error!("Profile initialisation failed for {}: {}", user.id, e);
        MeliError::Internal("Error al crear el perfil de usuario".to_string())
    })?;

    tracing::info!("Email confirmed for {}", user.id);
    Ok(Json(json!({
        "success": true,
        "message": "Email confirmado exitosamente. Ya puedes iniciar sesión.",
        "user_data": {
            "user_id": user.id,
            "email": user.email,
            "user_metadata": user.user_metadata,
        },
    })))
}

/// `GET /api/auth/confirm?token_hash=..&type=..`, the link in the email.
pub async fn confirm_email_link(
    State(state): State<AppState>,
    Query(payload): Query<ConfirmRequest>,
) -> MeliResult<Json<Value>> {
    confirm(&state, payload).await
}

pub async fn confirm_email(
    State(state): State<AppState>,
    body: Result<Json<ConfirmRequest>, JsonRejection>,
) -> MeliResult<Json<Value>> {
    let Json(payload) = body?;
    confirm(&state, payload).await
}

pub async fn resend_confirmation(
    State(state): State<AppState>,
    Json(payload): Json<ResendConfirmationRequest>,
) -> MeliResult<Json<Value>> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(MeliError::Validation("Email es requerido".to_string()));
    }
    let email = validate_email(&email).map_err(MeliError::Validation)?;

    state
        .auth
        .resend_confirmation(&email)
        .await
        .map_err(|e| match e {
            MeliError::RateLimited(_) => MeliError::RateLimited(
                "Demasiados intentos, espera unos minutos antes de reenviar".to_string(),
            ),
            other => {
                tracing::warn!("Confirmation resend for {} failed: {}", email, other);
                MeliError::Validation("No se pudo reenviar el email de confirmación".to_string())
            }
        })?;

    Ok(Json(json!({
        "success": true,
        "message": "Email de confirmación reenviado. Revisa tu bandeja de entrada.",
    })))
}
