//! Shared DTO types used across multiple v1 API endpoints.

use serde::Deserialize;

pub const DEFAULT_PAGE_LIMIT: u64 = 20;
pub const MAX_PAGE_LIMIT: u64 = 100;

/// `limit`/`offset` paging accepted by list endpoints.
#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    /// Maximum items per page (default 20, max 100).
    pub limit: Option<u64>,
    /// Items to skip.
    pub offset: Option<u64>,
}

impl PageQuery {
    pub fn limit(&self) -> u64 {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
    }

    pub fn offset(&self) -> u64 {
        self.offset.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_limit_is_clamped() {
        assert_eq!(PageQuery::default().limit(), DEFAULT_PAGE_LIMIT);
        let huge = PageQuery {
            limit: Some(999),
            offset: None,
        };
        assert_eq!(huge.limit(), MAX_PAGE_LIMIT);
        let zero = PageQuery {
            limit: Some(0),
            offset: Some(5),
        };
        assert_eq!(zero.limit(), 1);
        assert_eq!(zero.offset(), 5);
    }
}
