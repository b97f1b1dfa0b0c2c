//! Born2Eat backend: restaurants featured on Korean food broadcasts.

pub mod app;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod data;
pub mod kakao;
pub mod logging;
pub mod state;
pub mod uploads;
pub mod utils;
pub mod web;
