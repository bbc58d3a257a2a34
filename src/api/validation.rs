use super::ApiError;
use crate::constants::limits::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

pub fn validate_id(id: i32) -> Result<i32, ApiError> {
    if id <= 0 {
        return Err(ApiError::validation(format!(
            "Invalid ID: {}. ID must be a positive integer",
            id
        )));
    }
    Ok(id)
}

pub fn validate_key_name(name: &str) -> Result<&str, ApiError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("Key name cannot be empty"));
    }
    if trimmed.len() > 100 {
        return Err(ApiError::validation(
            "Key name must be 100 characters or less",
        ));
    }
    Ok(trimmed)
}

pub fn validate_status(status: &str) -> Result<&str, ApiError> {
    match status {
        "active" | "inactive" | "expired" => Ok(status),
        _ => Err(ApiError::validation(
            "Status must be one of: active, inactive, expired",
        )),
    }
}

pub fn validate_role(role: &str) -> Result<&str, ApiError> {
    match role {
        "admin" | "user" => Ok(role),
        _ => Err(ApiError::validation("Role must be 'admin' or 'user'")),
    }
}

pub fn validate_tier(tier: &str) -> Result<&str, ApiError> {
    match tier {
        "free" | "basic" | "pro" => Ok(tier),
        _ => Err(ApiError::validation(
            "Tier must be one of: free, basic, pro",
        )),
    }
}

/// Clamp pagination inputs to sane bounds.
#[must_use]
pub fn normalize_paging(page: Option<u64>, limit: Option<u64>) -> (u64, u64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    (page, limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert!(validate_id(1).is_ok());
        assert!(validate_id(12345).is_ok());
        assert!(validate_id(0).is_err());
        assert!(validate_id(-1).is_err());
    }

    #[test]
    fn test_validate_key_name() {
        assert!(validate_key_name("My OpenAI Key").is_ok());
        assert_eq!(validate_key_name("  padded  ").unwrap(), "padded");
        assert!(validate_key_name("").is_err());
        assert!(validate_key_name(&"a".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_status() {
        assert!(validate_status("active").is_ok());
        assert!(validate_status("inactive").is_ok());
        assert!(validate_status("expired").is_ok());
        assert!(validate_status("deleted").is_err());
    }

    #[test]
    fn test_normalize_paging() {
        assert_eq!(normalize_paging(None, None), (1, DEFAULT_PAGE_SIZE));
        assert_eq!(normalize_paging(Some(0), Some(0)), (1, 1));
        assert_eq!(normalize_paging(Some(3), Some(500)), (3, MAX_PAGE_SIZE));
    }
}
