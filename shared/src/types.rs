//! Common types used across the commerce core

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Owner of a cart or order: a registered user XOR an anonymous guest token.
///
/// Exactly one side is ever present; the database enforces the same rule with
/// a CHECK constraint on the carts table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OwnerRef {
    User { user_id: Uuid },
    Guest { guest_token: String },
}

impl OwnerRef {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            OwnerRef::User { user_id } => Some(*user_id),
            OwnerRef::Guest { .. } => None,
        }
    }

    pub fn guest_token(&self) -> Option<&str> {
        match self {
            OwnerRef::User { .. } => None,
            OwnerRef::Guest { guest_token } => Some(guest_token.as_str()),
        }
    }
}

/// Reference to the entity that caused a stock movement (order, adjustment,
/// reservation, ...). Stored denormalized on the movement log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityRef {
    pub ref_type: String,
    pub ref_id: Uuid,
}

impl EntityRef {
    pub fn new(ref_type: impl Into<String>, ref_id: Uuid) -> Self {
        Self {
            ref_type: ref_type.into(),
            ref_id,
        }
    }
}

/// Pagination parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

impl Pagination {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) as i64 - 1) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl PaginationMeta {
    pub fn new(pagination: &Pagination, total_items: u64) -> Self {
        let per_page = pagination.per_page.max(1);
        let total_pages = total_items.div_ceil(per_page as u64) as u32;
        Self {
            page: pagination.page.max(1),
            per_page,
            total_items,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_ref_xor() {
        let user = OwnerRef::User {
            user_id: Uuid::new_v4(),
        };
        assert!(user.user_id().is_some());
        assert!(user.guest_token().is_none());

        let guest = OwnerRef::Guest {
            guest_token: "g-123".to_string(),
        };
        assert!(guest.user_id().is_none());
        assert_eq!(guest.guest_token(), Some("g-123"));
    }

    #[test]
    fn test_pagination_offset() {
        let p = Pagination {
            page: 3,
            per_page: 20,
        };
        assert_eq!(p.offset(), 40);
        assert_eq!(p.limit(), 20);

        // Page 0 is treated as page 1
        let first = Pagination {
            page: 0,
            per_page: 10,
        };
        assert_eq!(first.offset(), 0);
    }
}
