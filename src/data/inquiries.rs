//! User inquiries and their admin answers.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use ts_rs::TS;

use super::models::InquiryStatus;
use crate::utils::paginate;

pub const CATEGORIES: &[&str] = &["general", "restaurant", "review", "account", "bug"];

#[derive(Debug, Clone, Serialize, sqlx::FromRow, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Inquiry {
    pub id: i32,
    pub user_id: i32,
    pub user_nickname: String,
    pub category: String,
    pub title: String,
    pub content: String,
    pub status: String,
    pub answer: Option<String>,
    pub answered_by: Option<i32>,
    pub answered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Inquiry {
    pub fn status(&self) -> InquiryStatus {
        InquiryStatus::parse(&self.status).unwrap_or(InquiryStatus::Pending)
    }
}

#[derive(Debug, Clone, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NewInquiry {
    #[serde(default)]
    pub category: Option<String>,
    pub title: String,
    pub content: String,
}

impl NewInquiry {
    /// Trim and validate; unknown or missing categories fall back to `general`.
    pub fn normalize(mut self) -> Result<Self, String> {
        self.title = self.title.trim().to_string();
        self.content = self.content.trim().to_string();
        if self.title.is_empty() || self.title.chars().count() > 200 {
            return Err("title must be 1 to 200 characters".into());
        }
        if self.content.is_empty() || self.content.chars().count() > 5000 {
            return Err("content must be 1 to 5000 characters".into());
        }
        let category = self
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| CATEGORIES.contains(c))
            .unwrap_or("general");
        self.category = Some(category.to_string());
        Ok(self)
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct InquiryListResponse {
    pub inquiries: Vec<Inquiry>,
    #[ts(type = "number")]
    pub total: i64,
    #[ts(type = "number")]
    pub page: i64,
    #[ts(type = "number")]
    pub per_page: i64,
}

/// Result of an admin state transition.
#[derive(Debug)]
pub enum TransitionOutcome {
    Done(Inquiry),
    NotFound,
    /// Closed inquiries accept no further changes.
    AlreadyClosed,
}

const INQUIRY_SELECT: &str = "SELECT i.id, i.user_id, u.nickname AS user_nickname, i.category, \
    i.title, i.content, i.status, i.answer, i.answered_by, i.answered_at, i.created_at \
    FROM inquiries i JOIN users u ON u.id = i.user_id";

pub async fn create_inquiry(pool: &PgPool, user_id: i32, input: &NewInquiry) -> Result<Inquiry> {
    let (id,): (i32,) = sqlx::query_as(
        "INSERT INTO inquiries (user_id, category, title, content) VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(user_id)
    .bind(input.category.as_deref().unwrap_or("general"))
    .bind(&input.title)
    .bind(&input.content)
    .fetch_one(pool)
    .await
    .context("failed to insert inquiry")?;

    get_inquiry(pool, id)
        .await?
        .context("inquiry vanished after insert")
}

pub async fn get_inquiry(pool: &PgPool, id: i32) -> Result<Option<Inquiry>> {
    sqlx::query_as::<_, Inquiry>(&format!("{INQUIRY_SELECT} WHERE i.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch inquiry")
}

/// Inquiries filtered by owner and/or status, newest first.
pub async fn list_inquiries(
    pool: &PgPool,
    user_id: Option<i32>,
    status: Option<InquiryStatus>,
    page: Option<i64>,
    per_page: Option<i64>,
) -> Result<InquiryListResponse> {
    let (page, per_page, offset) = paginate(page, per_page, 20, 100);

    let push_where = |qb: &mut QueryBuilder<'static, Postgres>| {
        qb.push(" WHERE TRUE");
        if let Some(user_id) = user_id {
            qb.push(" AND i.user_id = ").push_bind(user_id);
        }
        if let Some(status) = status {
            qb.push(" AND i.status = ").push_bind(status.as_str());
        }
    };

    let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM inquiries i");
    push_where(&mut count_qb);
    let (total,): (i64,) = count_qb
        .build_query_as()
        .fetch_one(pool)
        .await
        .context("failed to count inquiries")?;

    let mut list_qb = QueryBuilder::new(INQUIRY_SELECT);
    push_where(&mut list_qb);
    list_qb
        .push(" ORDER BY i.created_at DESC, i.id DESC LIMIT ")
        .push_bind(per_page)
        .push(" OFFSET ")
        .push_bind(offset);
    let inquiries = list_qb
        .build_query_as::<Inquiry>()
        .fetch_all(pool)
        .await
        .context("failed to list inquiries")?;

    Ok(InquiryListResponse {
        inquiries,
        total,
        page,
        per_page,
    })
}

/// Record (or replace) an admin answer and mark the inquiry answered.
pub async fn answer_inquiry(pool: &PgPool, id: i32, admin_id: i32, answer: &str) -> Result<TransitionOutcome> {
    transition(pool, id, InquiryStatus::Answered, Some((admin_id, answer))).await
}

pub async fn close_inquiry(pool: &PgPool, id: i32) -> Result<TransitionOutcome> {
    transition(pool, id, InquiryStatus::Closed, None).await
}

async fn transition(
    pool: &PgPool,
    id: i32,
    to: InquiryStatus,
    answer: Option<(i32, &str)>,
) -> Result<TransitionOutcome> {
    let mut tx = pool.begin().await?;
    let current: Option<(String,)> = sqlx::query_as("SELECT status FROM inquiries WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to lock inquiry")?;
    let Some((status,)) = current else {
        return Ok(TransitionOutcome::NotFound);
    };
    if InquiryStatus::parse(&status) == Some(InquiryStatus::Closed) {
        return Ok(TransitionOutcome::AlreadyClosed);
    }

    match answer {
        Some((admin_id, text)) => {
            sqlx::query(
                "UPDATE inquiries SET status = $2, answer = $3, answered_by = $4, answered_at = now() \
                 WHERE id = $1",
            )
            .bind(id)
            .bind(to.as_str())
            .bind(text)
            .bind(admin_id)
            .execute(&mut *tx)
            .await
            .context("failed to answer inquiry")?;
        }
        None => {
            sqlx::query("UPDATE inquiries SET status = $2 WHERE id = $1")
                .bind(id)
                .bind(to.as_str())
                .execute(&mut *tx)
                .await
                .context("failed to update inquiry status")?;
        }
    }
    tx.commit().await?;

    tracing::info!(inquiry_id = id, status = to.as_str(), "inquiry updated");
    Ok(match get_inquiry(pool, id).await? {
        Some(inquiry) => TransitionOutcome::Done(inquiry),
        None => TransitionOutcome::NotFound,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(category: Option<&str>, title: &str, content: &str) -> NewInquiry {
        NewInquiry {
            category: category.map(String::from),
            title: title.into(),
            content: content.into(),
        }
    }

    #[test]
    fn test_normalize_defaults_category() {
        let n = input(None, " 문의 ", " 내용 ").normalize().unwrap();
        assert_eq!(n.category.as_deref(), Some("general"));
        assert_eq!(n.title, "문의");
        assert_eq!(n.content, "내용");

        let n = input(Some("nonsense"), "t", "c").normalize().unwrap();
        assert_eq!(n.category.as_deref(), Some("general"));

        let n = input(Some("bug"), "t", "c").normalize().unwrap();
        assert_eq!(n.category.as_deref(), Some("bug"));
    }

    #[test]
    fn test_normalize_rejects_blank() {
        assert!(input(None, "  ", "c").normalize().is_err());
        assert!(input(None, "t", "").normalize().is_err());
        assert!(input(None, &"x".repeat(201), "c").normalize().is_err());
    }
}
