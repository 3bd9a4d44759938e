use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};

/// Normalises `/api` responses into `{success, data}` / `{success:false, error}`.
/// Bodies that already carry `success` and binary payloads pass untouched.
pub async fn wrap_response_middleware(req: Request, next: Next) -> Result<Response, StatusCode> {
    let path = req.uri().path().to_string();
    let res = next.run(req).await;

    let content_type = res
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("")
        .to_string();

    if !path.starts_with("/api")
        || content_type.starts_with("image/")
        || content_type.contains("application/octet-stream")
    {
        return Ok(res);
    }

    let status = res.status();
    let is_json = content_type.contains("application/json");
    let (mut parts, body) = res.into_parts();

    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let data: Value = if is_json {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    } else if bytes.is_empty() {
        Value::Null
    } else {
        Value::String(String::from_utf8_lossy(&bytes).to_string())
    };

    if data.get("success").is_some() {
        return Ok(Response::from_parts(parts, Body::from(bytes)));
    }

    let wrapped = if status.is_success() {
        json!({ "success": true, "data": data })
    } else {
        let fallback = status
            .canonical_reason()
            .unwrap_or("Error")
            .to_string();
        let message = data
            .as_str()
            .or_else(|| data.get("error").and_then(|v| v.as_str()))
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or(fallback);
        json!({ "success": false, "error": message })
    };

    let new_bytes = serde_json::to_vec(&wrapped).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    parts.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(new_bytes.len()));

    Ok(Response::from_parts(parts, Body::from(new_bytes)))
}
