use chrono::{DateTime, Utc};

use crate::errors::AppError;
use crate::models::language;
use crate::models::team::DEFAULT_PROJECT_SLUG;

const MAX_SLUG_LENGTH: usize = 64;

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

/// Lowercase ASCII letters, digits, `-` and `_`.
pub fn validate_slug(slug: &str) -> Result<(), AppError> {
    if slug.is_empty() || slug.len() > MAX_SLUG_LENGTH {
        return Err(AppError::bad_request(format!(
            "slug must be between 1 and {MAX_SLUG_LENGTH} characters"
        )));
    }

    let valid = slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if !valid {
        return Err(AppError::bad_request(format!("invalid slug '{slug}'")));
    }

    Ok(())
}

/// Slugs users may give to new projects. The default project's slug is taken.
pub fn validate_project_slug(slug: &str) -> Result<(), AppError> {
    if slug == DEFAULT_PROJECT_SLUG {
        return Err(AppError::bad_request(format!("'{DEFAULT_PROJECT_SLUG}' is reserved")));
    }
    validate_slug(slug)
}

pub fn validate_language(code: &str) -> Result<(), AppError> {
    if language::is_supported(code) {
        Ok(())
    } else {
        Err(AppError::bad_request(format!("unsupported language '{code}'")))
    }
}
