//! Scope parsing, negotiation and enforcement.
//!
//! A granted scope covers a requested one when they are equal, when the grant
//! is the universal `*`, or when the grant is a prefix wildcard `x.*` and the
//! requested scope starts with `x.`.

use crate::error::{AppError, AppResult};

/// Scopes that satisfy every requirement.
pub const ADMIN_OVERRIDE_SCOPES: &[&str] = &["*", "admin"];

const MAX_SCOPE_LEN: usize = 128;

/// Does `granted` cover `requested`?
pub fn grant_covers(granted: &str, requested: &str) -> bool {
    if granted == requested || granted == "*" {
        return true;
    }
    match granted.strip_suffix('*') {
        Some(prefix) if prefix.ends_with('.') => requested.starts_with(prefix),
        _ => false,
    }
}

/// Is a route requirement met by one granted scope?
///
/// Wildcards work in both directions here: a `billing.*` requirement is met
/// by any `billing.` scope.
pub fn requirement_met(required: &str, granted: &str) -> bool {
    if grant_covers(granted, required) {
        return true;
    }
    match required.strip_suffix('*') {
        Some(prefix) if prefix.ends_with('.') => granted.starts_with(prefix),
        _ => false,
    }
}

fn valid_scope(scope: &str) -> bool {
    !scope.is_empty()
        && scope.len() <= MAX_SCOPE_LEN
        && scope
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '*' | '-'))
}

/// Parse a space or comma separated scope string.
///
/// Returns `None` when no scope was requested (absent or blank). Duplicates
/// are dropped, first occurrence wins.
pub fn parse_scope_param(raw: Option<&str>) -> AppResult<Option<Vec<String>>> {
    let Some(raw) = raw else {
        return Ok(None);
    };

    let mut scopes: Vec<String> = Vec::new();
    for scope in raw.split([' ', ',']).filter(|s| !s.is_empty()) {
        if !valid_scope(scope) {
            return Err(AppError::InvalidInput(format!("Invalid scope: {}", scope)));
        }
        if !scopes.iter().any(|s| s == scope) {
            scopes.push(scope.to_string());
        }
    }

    Ok(if scopes.is_empty() { None } else { Some(scopes) })
}

/// Validate a scope list supplied as JSON (credential management).
pub fn validate_scopes(scopes: &[String]) -> AppResult<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(scopes.len());
    for scope in scopes {
        if !valid_scope(scope) {
            return Err(AppError::InvalidInput(format!("Invalid scope: {}", scope)));
        }
        if !out.contains(scope) {
            out.push(scope.clone());
        }
    }
    Ok(out)
}

/// Space-separated form used in token responses.
pub fn format_scopes(scopes: &[String]) -> String {
    scopes.join(" ")
}

/// Scopes granted at exchange time.
///
/// With no request the credential's full scope set is granted. Otherwise the
/// requested scopes that the credential covers are kept; if none are, the
/// request fails with `INVALID_SCOPE`.
pub fn negotiate(requested: Option<Vec<String>>, allowed: &[String]) -> AppResult<Vec<String>> {
    let Some(requested) = requested else {
        return Ok(allowed.to_vec());
    };

    let granted: Vec<String> = requested
        .iter()
        .filter(|r| allowed.iter().any(|a| grant_covers(a, r)))
        .cloned()
        .collect();

    if granted.is_empty() {
        return Err(AppError::InvalidScope {
            requested,
            allowed: allowed.to_vec(),
        });
    }

    Ok(granted)
}

/// Scopes granted when a refresh token is spent.
///
/// Never wider than the previous grant: any requested scope the previous
/// token did not cover is rejected outright. Scopes the credential no longer
/// covers are dropped.
pub fn narrow_for_refresh(
    requested: Option<Vec<String>>,
    previous: &[String],
    credential: &[String],
) -> AppResult<Vec<String>> {
    let candidate = match requested {
        Some(requested) => {
            if requested
                .iter()
                .any(|r| !previous.iter().any(|p| grant_covers(p, r)))
            {
                return Err(AppError::InvalidScope {
                    requested,
                    allowed: previous.to_vec(),
                });
            }
            requested
        }
        None => previous.to_vec(),
    };

    let granted: Vec<String> = candidate
        .iter()
        .filter(|c| credential.iter().any(|a| grant_covers(a, c)))
        .cloned()
        .collect();

    if granted.is_empty() && !candidate.is_empty() {
        return Err(AppError::InvalidScope {
            requested: candidate,
            allowed: credential.to_vec(),
        });
    }

    Ok(granted)
}

/// Post-authentication scope check with an explicit override set.
#[derive(Debug, Clone, Copy)]
pub struct ScopeGuard<'a> {
    overrides: &'a [&'a str],
}

impl<'a> ScopeGuard<'a> {
    pub const fn new(overrides: &'a [&'a str]) -> Self {
        Self { overrides }
    }

    fn has_override(&self, granted: &[String]) -> bool {
        granted
            .iter()
            .any(|g| self.overrides.iter().any(|o| o == g))
    }

    fn met(required: &str, granted: &[String]) -> bool {
        granted.iter().any(|g| requirement_met(required, g))
    }

    /// Pass when at least one required scope is granted.
    pub fn require_any(&self, granted: &[String], required: &[&str]) -> AppResult<()> {
        if required.is_empty()
            || self.has_override(granted)
            || required.iter().any(|r| Self::met(r, granted))
        {
            return Ok(());
        }
        Err(AppError::InsufficientScope {
            required: required.iter().map(|s| s.to_string()).collect(),
            granted: granted.to_vec(),
        })
    }

    /// Pass only when every required scope is granted.
    pub fn require_all(&self, granted: &[String], required: &[&str]) -> AppResult<()> {
        if self.has_override(granted) {
            return Ok(());
        }
        let missing: Vec<String> = required
            .iter()
            .filter(|r| !Self::met(r, granted))
            .map(|s| s.to_string())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(AppError::MissingScope {
            required: missing,
            granted: granted.to_vec(),
        })
    }
}

impl Default for ScopeGuard<'static> {
    fn default() -> Self {
        Self::new(ADMIN_OVERRIDE_SCOPES)
    }
}
