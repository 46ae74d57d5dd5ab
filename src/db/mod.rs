//! PostgreSQL schema, row models and repositories behind [`crate::store::PgStore`].

pub mod migrations;
pub mod models;
pub mod repositories;
