//! Identity provider client (Supabase GoTrue).

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::error::{MeliError, MeliResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_confirmed_at: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
}

impl AuthUser {
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.user_metadata
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl AuthSession {
    /// Absolute expiry in unix seconds.
    pub fn expiry(&self, now: i64) -> Option<i64> {
        self.expires_at.or(self.expires_in.map(|secs| now + secs))
    }
}

/// Sign-up yields a session right away only when email confirmation is off.
#[derive(Debug, Clone, PartialEq)]
pub struct SignUpOutcome {
    pub user: AuthUser,
    pub session: Option<AuthSession>,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str, metadata: Value)
        -> MeliResult<SignUpOutcome>;

    async fn sign_in_password(&self, email: &str, password: &str) -> MeliResult<AuthSession>;

    async fn refresh(&self, refresh_token: &str) -> MeliResult<AuthSession>;

    async fn exchange_code(&self, code: &str, verifier: &str) -> MeliResult<AuthSession>;

    async fn get_user(&self, access_token: &str) -> MeliResult<AuthUser>;

    async fn update_password(&self, access_token: &str, password: &str) -> MeliResult<()>;

    async fn send_recovery(&self, email: &str, redirect_to: &str) -> MeliResult<()>;

    /// Redeems the `token_hash` of a confirmation link.
    async fn verify_email(&self, token_hash: &str, kind: &str) -> MeliResult<AuthSession>;

    async fn resend_confirmation(&self, email: &str) -> MeliResult<()>;

    async fn sign_out(&self, access_token: &str) -> MeliResult<()>;

    fn authorize_url(&self, provider: &str, redirect_to: &str, challenge: &str) -> String;
}

/// PKCE verifier and its S256 challenge.
pub fn pkce_pair() -> (String, String) {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    let verifier = URL_SAFE_NO_PAD.encode(bytes);
    let challenge = pkce_challenge(&verifier);
    (verifier, challenge)
}

pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[derive(Clone)]
pub struct SupabaseAuth {
    http: Client,
    base_url: String,
    api_key: String,
}

impl SupabaseAuth {
    pub fn new(http: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> MeliResult<Value> {
        let res = req.header("apikey", &self.api_key).send().await?;
        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            tracing::warn!("GoTrue answered {}: {}", status, body);
            return Err(auth_failure(status, &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn token_grant(&self, grant: &str, body: Value) -> MeliResult<AuthSession> {
        let value = self
            .send(
                self.http
                    .post(self.url("token"))
                    .query(&[("grant_type", grant)])
                    .json(&body),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// GoTrue reports errors under several keys depending on the endpoint.
fn auth_failure(status: StatusCode, body: &str) -> MeliError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let message = ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|k| parsed.get(*k).and_then(|v| v.as_str()))
        .unwrap_or(body)
        .to_string();

    if message.contains("Invalid login credentials") {
        return MeliError::Auth("Credenciales inválidas".to_string());
    }
    if message.contains("Email not confirmed") {
        return MeliError::Forbidden(
            "Debes confirmar tu email antes de iniciar sesión".to_string(),
        );
    }
    if message.contains("already registered") {
        return MeliError::Conflict("El correo ya está registrado".to_string());
    }
    match status {
        StatusCode::TOO_MANY_REQUESTS => MeliError::RateLimited(message),
        StatusCode::FORBIDDEN => MeliError::Forbidden(message),
        s if s.is_server_error() => MeliError::Internal(format!("auth provider: {}", message)),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => MeliError::Validation(message),
        _ => MeliError::Auth(message),
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> MeliResult<SignUpOutcome> {
        let value = self
            .send(self.http.post(self.url("signup")).json(&json!({
                "email": email,
                "password": password,
                "data": metadata,
            })))
            .await?;

        if value.get("access_token").is_some() {
            let session: AuthSession = serde_json::from_value(value)?;
            return Ok(SignUpOutcome {
                user: session.user.clone(),
                session: Some(session),
            });
        }
        let user = value.get("user").cloned().unwrap_or(value);
        Ok(SignUpOutcome {
            user: serde_json::from_value(user)?,
            session: None,
        })
    }

    async fn sign_in_password(&self, email: &str, password: &str) -> MeliResult<AuthSession> {
        self.token_grant("password", json!({ "email": email, "password": password }))
            .await
    }

    async fn refresh(&self, refresh_token: &str) -> MeliResult<AuthSession> {
        self.token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn exchange_code(&self, code: &str, verifier: &str) -> MeliResult<AuthSession> {
        self.token_grant(
            "pkce",
            json!({ "auth_code": code, "code_verifier": verifier }),
        )
        .await
    }

    async fn get_user(&self, access_token: &str) -> MeliResult<AuthUser> {
        let value = self
            .send(self.http.get(self.url("user")).bearer_auth(access_token))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn update_password(&self, access_token: &str, password: &str) -> MeliResult<()> {
        self.send(
            self.http
                .put(self.url("user"))
                .bearer_auth(access_token)
                .json(&json!({ "password": password })),
        )
        .await
        .map(|_| ())
    }

    async fn send_recovery(&self, email: &str, redirect_to: &str) -> MeliResult<()> {
        self.send(
            self.http
                .post(self.url("recover"))
                .query(&[("redirect_to", redirect_to)])
                .json(&json!({ "email": email })),
        )
        .await
        .map(|_| ())
    }

    async fn verify_email(&self, token_hash: &str, kind: &str) -> MeliResult<AuthSession> {
        let value = self
            .send(
                self.http
                    .post(self.url("verify"))
                    .json(&json!({ "type": kind, "token_hash": token_hash })),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn resend_confirmation(&self, email: &str) -> MeliResult<()> {
        self.send(
            self.http
                .post(self.url("resend"))
                .json(&json!({ "type": "signup", "email": email })),
        )
        .await
        .map(|_| ())
    }

    async fn sign_out(&self, access_token: &str) -> MeliResult<()> {
        self.send(self.http.post(self.url("logout")).bearer_auth(access_token))
            .await
            .map(|_| ())
    }

    fn authorize_url(&self, provider: &str, redirect_to: &str, challenge: &str) -> String {
        let query = [
            ("provider", provider),
            ("redirect_to", redirect_to),
            ("code_challenge", challenge),
            ("code_challenge_method", "s256"),
        ]
        .iter()
        .map(|(k, v)| format!("{}={}", k, encode_component(v)))
        .collect::<Vec<_>>()
        .join("&");
        format!("{}?{}", self.url("authorize"), query)
    }
}

fn encode_component(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            other => format!("%{:02X}", other),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkce_challenge_matches_rfc7636_example() {
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
        let (verifier, challenge) = pkce_pair();
        assert_eq!(verifier.len(), 43);
        assert_eq!(pkce_challenge(&verifier), challenge);
    }

    #[test]
    fn test_authorize_url_encodes_redirect() {
        let auth = SupabaseAuth::new(Client::new(), "https://x.supabase.co/", "anon");
        let url = auth.authorize_url("google", "http://localhost:3000/auth/callback", "abc");
        assert_eq!(
            url,
            "https://x.supabase.co/auth/v1/authorize?provider=google\
             &redirect_to=http%3A%2F%2Flocalhost%3A3000%2Fauth%2Fcallback\
             &code_challenge=abc&code_challenge_method=s256"
        );
    }

    #[test]
    fn test_auth_failure_mapping() {
        let bad_login = auth_failure(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        );
        assert!(matches!(bad_login, MeliError::Auth(ref m) if m == "Credenciales inválidas"));

        let taken = auth_failure(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"code":422,"msg":"User already registered"}"#,
        );
        assert!(matches!(taken, MeliError::Conflict(_)));

        let unconfirmed = auth_failure(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Email not confirmed"}"#,
        );
        assert!(matches!(unconfirmed, MeliError::Forbidden(_)));

        let expired = auth_failure(StatusCode::UNAUTHORIZED, r#"{"message":"JWT expired"}"#);
        assert!(matches!(expired, MeliError::Auth(ref m) if m == "JWT expired"));
    }

    #[test]
    fn test_session_expiry_prefers_absolute() {
        let user = AuthUser {
            id: "u".into(),
            email: None,
            email_confirmed_at: None,
            user_metadata: Value::Null,
        };
        let mut session = AuthSession {
            access_token: "a".into(),
            refresh_token: None,
            expires_in: Some(3600),
            expires_at: None,
            user,
        };
        assert_eq!(session.expiry(100), Some(3700));
        session.expires_at = Some(50);
        assert_eq!(session.expiry(100), Some(50));
    }
}
