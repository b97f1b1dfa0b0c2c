//! Row types and small enums shared across the data layer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Account role. Stored as lowercase text in `users.role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub password_hash: String,
    pub nickname: String,
    pub role: String,
    pub profile_image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> UserRole {
        UserRole::parse(&self.role).unwrap_or(UserRole::User)
    }

    pub fn is_admin(&self) -> bool {
        self.role() == UserRole::Admin
    }
}

/// Public view of a user account; never carries the password hash.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserResponse {
    pub id: i32,
    pub email: String,
    pub nickname: String,
    pub role: UserRole,
    pub profile_image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            nickname: user.nickname.clone(),
            role: user.role(),
            profile_image_url: user.profile_image_url.clone(),
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

/// Tag family. `Food` tags form a tree; `Tag` tags are flat labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum TagType {
    Food,
    Tag,
}

impl TagType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Food => "food",
            Self::Tag => "tag",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "food" => Some(Self::Food),
            "tag" => Some(Self::Tag),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Tag {
    pub id: i32,
    #[sqlx(rename = "type")]
    pub tag_type: String,
    pub name: String,
    pub parent_id: Option<i32>,
    pub path: String,
    pub depth: i16,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Region {
    pub id: i32,
    pub name: String,
    pub parent_id: Option<i32>,
    pub depth: i16,
}

/// Inquiry lifecycle. Stored as lowercase text in `inquiries.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum InquiryStatus {
    Pending,
    Answered,
    Closed,
}

impl InquiryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Answered => "answered",
            Self::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "answered" => Some(Self::Answered),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// A stored photo (restaurant or review) as exposed to clients.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Photo {
    pub id: i32,
    pub url: String,
    #[serde(skip)]
    #[ts(skip)]
    pub file_path: String,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Broadcast {
    pub id: i32,
    pub code: String,
    pub name: String,
    pub channel: Option<String>,
    #[serde(skip)]
    #[ts(skip)]
    pub episode_url_template: String,
    #[serde(skip)]
    #[ts(skip)]
    pub list_url: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BroadcastEpisode {
    pub id: i32,
    pub broadcast_id: i32,
    pub episode_no: i32,
    pub title: Option<String>,
    pub air_date: Option<NaiveDate>,
    pub source_url: String,
    pub parser_ver: i16,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_text_roundtrip() {
        for role in [UserRole::User, UserRole::Admin] {
            assert_eq!(UserRole::parse(role.as_str()), Some(role));
        }
        for status in [
            InquiryStatus::Pending,
            InquiryStatus::Answered,
            InquiryStatus::Closed,
        ] {
            assert_eq!(InquiryStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TagType::parse("food"), Some(TagType::Food));
        assert_eq!(TagType::parse("FOOD"), None);
        assert_eq!(UserRole::parse("root"), None);
    }

    #[test]
    fn test_unknown_role_falls_back_to_user() {
        let now = Utc::now();
        let user = User {
            id: 1,
            email: "a@b.c".into(),
            password_hash: String::new(),
            nickname: "a".into(),
            role: "superuser".into(),
            profile_image_url: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        assert!(!user.is_admin());
        assert_eq!(UserResponse::from(&user).role, UserRole::User);
    }
}
