//! Database row models for the `users` table.

use chrono::{DateTime, Utc};

use crate::domain::{User, UserId};

/// A row from the `users` table.
///
/// `phone`, `age` and `status` are nullable columns.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    /// `BIGSERIAL` primary key.
    pub user_id: i64,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Unique email.
    pub email: String,
    /// Nullable phone number.
    pub phone: Option<String>,
    /// Nullable age.
    pub age: Option<i32>,
    /// Nullable status.
    pub status: Option<String>,
    /// Row creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Row update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::new(row.user_id),
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            age: row.age,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_maps_to_domain_user() {
        let now = Utc::now();
        let row = UserRow {
            user_id: 5,
            first_name: "Ann".into(),
            last_name: "Lee".into(),
            email: "ann@x.com".into(),
            phone: None,
            age: Some(30),
            status: Some("Active".into()),
            created_at: now,
            updated_at: now,
        };
        let user = User::from(row);
        assert_eq!(user.id, UserId::new(5));
        assert_eq!(user.phone, None);
        assert_eq!(user.age, Some(30));
    }
}
