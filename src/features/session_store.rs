//! Session cookies: normalization of operator-supplied cookie exports and
//! injection into a live CDP page.
//!
//! Cookie exports from browser extensions carry bookkeeping fields the CDP
//! `Network.setCookies` schema does not know (`hostOnly`, `storeId`, …), use
//! `expirationDate` instead of `expires`, and spell `sameSite` in several
//! ways (`no_restriction`, `lax`, `unspecified`). Everything is normalized
//! once, before injection.

use crate::core::error::{HarvestError, HarvestResult};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetCookiesParams};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// Canonical `sameSite` values accepted by the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// A cookie in the browser's injection schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<SameSite>,
    /// Unix seconds. Absent for session cookies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
}

/// Map an exported `sameSite` spelling onto the canonical three.
///
/// * `""` → `None` (attribute left absent)
/// * `unspecified` / `no_restriction` → `Lax`
/// * any casing of `strict` / `lax` / `none` → canonical capitalization
/// * anything else → `None` with a warning, so one odd cookie cannot sink injection
pub fn normalize_same_site(raw: &str) -> Option<SameSite> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "unspecified" | "no_restriction" => Some(SameSite::Lax),
        "strict" => Some(SameSite::Strict),
        "lax" => Some(SameSite::Lax),
        "none" => Some(SameSite::None),
        other => {
            warn!(
                "session_store: unknown sameSite value '{}'; leaving attribute unset",
                other
            );
            None
        }
    }
}

fn required_str(obj: &serde_json::Map<String, Value>, key: &str, index: usize) -> HarvestResult<String> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| HarvestError::Session(format!("cookie #{index} is missing string field `{key}`")))
}

/// Normalize one exported cookie record.
///
/// `expirationDate` (extension export) wins over `expires` when both exist.
/// Session cookies (`"session": true`) and non-positive expiries carry no
/// expiry.
pub fn normalize_cookie(raw: &Value, index: usize) -> HarvestResult<Cookie> {
    let obj = raw
        .as_object()
        .ok_or_else(|| HarvestError::Session(format!("cookie #{index} is not a JSON object")))?;

    let name = required_str(obj, "name", index)?;
    let value = required_str(obj, "value", index)?;
    let domain = required_str(obj, "domain", index)?;

    let same_site = obj
        .get("sameSite")
        .and_then(|v| v.as_str())
        .and_then(normalize_same_site);

    let is_session = obj.get("session").and_then(|v| v.as_bool()).unwrap_or(false);
    let expires = obj
        .get("expirationDate")
        .or_else(|| obj.get("expires"))
        .and_then(|v| v.as_f64())
        .filter(|exp| !is_session && *exp > 0.0);

    Ok(Cookie {
        name,
        value,
        domain,
        path: obj.get("path").and_then(|v| v.as_str()).map(str::to_string),
        secure: obj.get("secure").and_then(|v| v.as_bool()),
        http_only: obj.get("httpOnly").and_then(|v| v.as_bool()),
        same_site,
        expires,
    })
}

/// Normalize a full cookie export. Must be a JSON array of cookie objects.
pub fn normalize_cookies(raw: &[Value]) -> HarvestResult<Vec<Cookie>> {
    raw.iter()
        .enumerate()
        .map(|(index, cookie)| normalize_cookie(cookie, index))
        .collect()
}

/// Parse the text of a cookie export (file contents or a pasted blob).
pub fn parse_cookie_export(text: &str) -> HarvestResult<Vec<Value>> {
    let parsed: Value = serde_json::from_str(text)
        .map_err(|e| HarvestError::Session(format!("cookie export is not valid JSON: {e}")))?;
    match parsed {
        Value::Array(items) => Ok(items),
        _ => Err(HarvestError::Session(
            "cookie export must be a JSON array".to_string(),
        )),
    }
}

/// Convert normalized cookies into CDP [`CookieParam`]s.
pub fn to_cookie_params(cookies: &[Cookie]) -> HarvestResult<Vec<CookieParam>> {
    cookies
        .iter()
        .map(|cookie| {
            serde_json::to_value(cookie)
                .and_then(serde_json::from_value::<CookieParam>)
                .map_err(|e| {
                    HarvestError::Session(format!(
                        "cookie '{}' for {} does not fit the browser schema: {}",
                        cookie.name, cookie.domain, e
                    ))
                })
        })
        .collect()
}

/// Inject normalized cookies into a live CDP page **before** navigation.
///
/// A rejection by the browser is a [`HarvestError::Session`]; it is
/// propagated, never retried.
pub async fn inject_into_page(page: &chromiumoxide::Page, cookies: &[Cookie]) -> HarvestResult<()> {
    if cookies.is_empty() {
        return Err(HarvestError::Session("no cookies to inject".to_string()));
    }
    let params = to_cookie_params(cookies)?;
    let count = params.len();
    page.execute(SetCookiesParams::new(params))
        .await
        .map_err(|e| HarvestError::Session(format!("browser rejected cookies: {e}")))?;
    info!("session_store: injected {} session cookies into CDP page", count);
    Ok(())
}
