//! Database models and queries.

pub mod aggregates;
pub mod broadcasts;
pub mod dashboard;
pub mod inquiries;
pub mod models;
pub mod ranking;
pub mod regions;
pub mod restaurant_query;
pub mod restaurants;
pub mod reviews;
pub mod sessions;
pub mod tags;
pub mod users;
