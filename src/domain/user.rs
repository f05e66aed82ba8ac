//! User records, identifiers, and the creation/update payloads.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

/// Storage-assigned identifier of a user.
///
/// Wraps the `BIGSERIAL` primary key. Serializes as a plain JSON integer.
/// Deserialization is lenient about the numeric encoding: an integer, an
/// integral float (`7.0`) or a decimal string (`"7"`) are all accepted, so
/// clients that only have floating-point numbers can still address users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, ToSchema)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

struct UserIdVisitor;

impl Visitor<'_> for UserIdVisitor {
    type Value = UserId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an integer user id")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<UserId, E> {
        Ok(UserId(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<UserId, E> {
        i64::try_from(v)
            .map(UserId)
            .map_err(|_| E::custom(format!("user id {v} out of range")))
    }

    #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<UserId, E> {
        // i64::MAX is not representable as f64; 2^63 is the first excluded value.
        const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
        if v.is_finite() && v.fract() == 0.0 && (-TWO_POW_63..TWO_POW_63).contains(&v) {
            Ok(UserId(v as i64))
        } else {
            Err(E::custom(format!("user id {v} is not an integer")))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<UserId, E> {
        v.trim()
            .parse::<i64>()
            .map(UserId)
            .map_err(|_| E::custom(format!("user id {v:?} is not an integer")))
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(UserIdVisitor)
    }
}

/// A stored user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct User {
    /// Storage-assigned identifier, `user_id` on the wire.
    #[serde(rename = "user_id")]
    pub id: UserId,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Contact email, unique across users.
    pub email: String,
    /// Optional phone number.
    pub phone: Option<String>,
    /// Optional age in years.
    pub age: Option<i32>,
    /// Optional free-form account status (e.g. `"Active"`).
    pub status: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Applies every present field of `patch` and bumps `updated_at`.
    pub fn apply_patch(&mut self, patch: UserPatch, now: DateTime<Utc>) {
        if let Some(first_name) = patch.first_name {
            self.first_name = first_name;
        }
        if let Some(last_name) = patch.last_name {
            self.last_name = last_name;
        }
        if let Some(email) = patch.email {
            self.email = email;
        }
        if patch.phone.is_some() {
            self.phone = patch.phone;
        }
        if patch.age.is_some() {
            self.age = patch.age;
        }
        if patch.status.is_some() {
            self.status = patch.status;
        }
        self.updated_at = now;
    }
}

/// Fields required to create a user.
///
/// Missing strings decode as empty so that the validator, not the decoder,
/// reports which field is wrong.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NewUser {
    /// Given name.
    #[serde(default)]
    pub first_name: String,
    /// Family name.
    #[serde(default)]
    pub last_name: String,
    /// Contact email.
    #[serde(default)]
    pub email: String,
    /// Optional phone number.
    #[serde(default)]
    pub phone: Option<String>,
    /// Optional age in years.
    #[serde(default)]
    pub age: Option<i32>,
    /// Optional account status.
    #[serde(default)]
    pub status: Option<String>,
}

impl NewUser {
    /// Treats empty optional strings and an age of `0` as absent.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            phone: self.phone.filter(|p| !p.is_empty()),
            age: self.age.filter(|a| *a != 0),
            status: self.status.filter(|s| !s.is_empty()),
            ..self
        }
    }
}

/// Partial update: `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserPatch {
    /// New given name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// New family name.
    #[serde(default)]
    pub last_name: Option<String>,
    /// New email.
    #[serde(default)]
    pub email: Option<String>,
    /// New phone number.
    #[serde(default)]
    pub phone: Option<String>,
    /// New age.
    #[serde(default)]
    pub age: Option<i32>,
    /// New status.
    #[serde(default)]
    pub status: Option<String>,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn user_id_accepts_integer_float_and_string() {
        for raw in ["7", "7.0", "\"7\""] {
            let Ok(id) = serde_json::from_str::<UserId>(raw) else {
                panic!("{raw} should decode");
            };
            assert_eq!(id, UserId::new(7));
        }
    }

    #[test]
    fn user_id_rejects_fractions_and_garbage() {
        assert!(serde_json::from_str::<UserId>("7.5").is_err());
        assert!(serde_json::from_str::<UserId>("\"seven\"").is_err());
        assert!(serde_json::from_str::<UserId>("true").is_err());
        assert!(serde_json::from_str::<UserId>("18446744073709551615").is_err());
    }

    #[test]
    fn user_id_serializes_as_number() {
        let json = serde_json::to_string(&UserId::new(12)).unwrap_or_default();
        assert_eq!(json, "12");
    }

    #[test]
    fn new_user_normalizes_empty_optionals() {
        let user = NewUser {
            first_name: "Ann".into(),
            last_name: "Lee".into(),
            email: "ann@x.com".into(),
            phone: Some(String::new()),
            age: Some(0),
            status: Some("Active".into()),
        }
        .normalized();
        assert_eq!(user.phone, None);
        assert_eq!(user.age, None);
        assert_eq!(user.status.as_deref(), Some("Active"));
    }

    #[test]
    fn apply_patch_only_touches_present_fields() {
        let created = Utc::now();
        let mut user = User {
            id: UserId::new(1),
            first_name: "Ann".into(),
            last_name: "Lee".into(),
            email: "ann@x.com".into(),
            phone: Some("5550100".into()),
            age: Some(30),
            status: None,
            created_at: created,
            updated_at: created,
        };
        let later = created + chrono::Duration::seconds(5);
        user.apply_patch(
            UserPatch {
                last_name: Some("Park".into()),
                age: Some(31),
                ..UserPatch::default()
            },
            later,
        );
        assert_eq!(user.first_name, "Ann");
        assert_eq!(user.last_name, "Park");
        assert_eq!(user.phone.as_deref(), Some("5550100"));
        assert_eq!(user.age, Some(31));
        assert_eq!(user.updated_at, later);
    }
}
