//! Field validators shared by the lot and profile commands.
//!
//! Every check is a pure function returning the normalised value or the
//! user-facing message describing the failure.

use serde_json::Value;
use std::collections::BTreeMap;

pub type Check<T> = Result<T, String>;

/// Trimmed length (in characters) must fall within `min..=max`.
pub fn validate_length(field: &str, value: &str, min: usize, max: usize) -> Check<String> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len < min {
        return Err(format!("{} debe tener al menos {} caracteres", field, min));
    }
    if len > max {
        return Err(format!("{} no puede exceder {} caracteres", field, max));
    }
    Ok(trimmed.to_string())
}

/// Case-insensitive membership; returns the canonical spelling from `allowed`.
pub fn validate_enum<'a>(field: &str, value: &str, allowed: &[&'a str]) -> Check<&'a str> {
    let needle = value.trim().to_lowercase();
    allowed
        .iter()
        .find(|candidate| candidate.to_lowercase() == needle)
        .copied()
        .ok_or_else(|| format!("{} debe ser uno de: {}", field, allowed.join(", ")))
}

/// Accepts JSON numbers and numeric strings.
pub fn parse_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

pub fn validate_numeric_range(field: &str, value: &Value, min: f64, max: f64) -> Check<f64> {
    let n = parse_number(value).ok_or_else(|| format!("{} debe ser un número válido", field))?;
    if n < min || n > max {
        return Err(format!("{} debe estar entre {} y {}", field, min, max));
    }
    Ok(n)
}

/// Positive whole number no greater than `max`.
pub fn validate_positive_integer(field: &str, value: &Value, max: i64) -> Check<i64> {
    let n = parse_number(value).ok_or_else(|| format!("{} debe ser un número entero", field))?;
    if n.fract() != 0.0 {
        return Err(format!("{} debe ser un número entero", field));
    }
    if n < 1.0 || n > max as f64 {
        return Err(format!("{} debe estar entre 1 y {}", field, max));
    }
    Ok(n as i64)
}

/// Pollen composition: species -> percentage.
///
/// Accepts an object or its JSON-encoded string form; `null` is an empty
/// composition. Each percentage must parse as a number in `[0, 100]` and the
/// total must not exceed 100.
pub fn validate_composition(value: &Value) -> Check<BTreeMap<String, f64>> {
    let decoded;
    let value = match value {
        Value::Null => return Ok(BTreeMap::new()),
        Value::String(s) if s.trim().is_empty() => return Ok(BTreeMap::new()),
        Value::String(s) => {
            decoded = serde_json::from_str::<Value>(s)
                .map_err(|_| "La composición polínica no tiene un formato válido".to_string())?;
            &decoded
        }
        other => other,
    };
    let map = value
        .as_object()
        .ok_or_else(|| "La composición polínica debe ser un objeto especie: porcentaje".to_string())?;

    let mut out = BTreeMap::new();
    let mut total = 0.0;
    for (species, raw) in map {
        let name = species.trim();
        if name.is_empty() {
            return Err("La composición polínica contiene una especie sin nombre".to_string());
        }
        let pct = parse_number(raw)
            .ok_or_else(|| format!("El porcentaje de {} debe ser un número válido", name))?;
        if !(0.0..=100.0).contains(&pct) {
            return Err(format!("El porcentaje de {} debe estar entre 0 y 100", name));
        }
        total += pct;
        out.insert(name.to_string(), pct);
    }

    // Tolerate float noise such as 33.3 + 33.3 + 33.4.
    if total > 100.0 + 1e-9 {
        return Err(format!(
            "La suma de porcentajes de polen no puede exceder 100% (actual: {}%)",
            (total * 100.0).round() / 100.0
        ));
    }
    Ok(out)
}

pub fn validate_email(value: &str) -> Check<String> {
    let email = value.trim();
    let invalid = || "Formato de email inválido".to_string();

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    let local_ok = !local.is_empty()
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._%+-".contains(c));
    let (host, tld) = domain.rsplit_once('.').ok_or_else(invalid)?;
    let host_ok = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || ".-".contains(c));
    let tld_ok = tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic());

    if local_ok && host_ok && tld_ok && email.len() <= 255 {
        Ok(email.to_string())
    } else {
        Err(invalid())
    }
}

pub fn validate_username(value: &str) -> Check<String> {
    let username = value.trim();
    let len = username.chars().count();
    if !(3..=80).contains(&len) {
        return Err("Username debe tener entre 3 y 80 caracteres".to_string());
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(
            "Username solo puede contener letras, números, guiones y underscores".to_string(),
        );
    }
    Ok(username.to_string())
}
