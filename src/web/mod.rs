//! HTTP API for the Born2Eat backend.

pub mod admin;
pub mod auth;
pub mod catalog;
pub mod crawler;
pub mod error;
pub mod inquiries;
pub mod me;
pub mod middleware;
pub mod restaurants;
pub mod reviews;
pub mod routes;
pub mod status;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

pub use routes::*;

/// `?page=&perPage=` for endpoints without other filters.
#[derive(Debug, Default, Deserialize, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PageParams {
    #[serde(default)]
    #[ts(type = "number | null")]
    pub page: Option<i64>,
    #[serde(default)]
    #[ts(type = "number | null")]
    pub per_page: Option<i64>,
}
