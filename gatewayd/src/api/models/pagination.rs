//! Shared pagination types for admin API list endpoints.
//!
//! All admin list endpoints use offset-based pagination with `skip`/`limit`
//! query parameters, clamped so a caller can't request zero or unbounded
//! result sets.

use serde::Deserialize;
use utoipa::IntoParams;

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 200;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct Pagination {
    #[param(minimum = 0)]
    pub skip: Option<i64>,
    #[param(minimum = 1, maximum = 200)]
    pub limit: Option<i64>,
}

impl Pagination {
    pub fn skip(&self) -> i64 {
        self.skip.unwrap_or(0).max(0)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let p = Pagination::default();
        assert_eq!(p.skip(), 0);
        assert_eq!(p.limit(), DEFAULT_LIMIT);
    }

    #[test]
    fn limit_is_clamped_to_range() {
        assert_eq!(Pagination { skip: None, limit: Some(0) }.limit(), 1);
        assert_eq!(Pagination { skip: None, limit: Some(10_000) }.limit(), MAX_LIMIT);
    }

    #[test]
    fn skip_cannot_go_negative() {
        assert_eq!(Pagination { skip: Some(-5), limit: None }.skip(), 0);
    }
}
