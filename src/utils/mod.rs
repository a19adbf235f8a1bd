use axum::Json;
use serde::Serialize;

use crate::result::ApiResponse;

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(data))
}

pub fn error_to_api_response<T>(code: i32, msg: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse::error(code, msg))
}

/// 粗略的邮箱格式检查：`local@domain.tld`，不含空白
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }

    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const NOT_FOUND: i32 = 1004;
    pub const RATE_LIMIT: i32 = 1005;
    pub const INTERNAL_ERROR: i32 = 5000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("it@university.com"));
        assert!(is_valid_email("a.b@dept.example.edu"));
        assert!(!is_valid_email("university.com"));
        assert!(!is_valid_email("@university.com"));
        assert!(!is_valid_email("it@university"));
        assert!(!is_valid_email("it@.com"));
        assert!(!is_valid_email("it@uni@versity.com"));
        assert!(!is_valid_email("i t@university.com"));
    }
}
