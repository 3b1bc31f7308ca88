use anyhow::{Context, Result};
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;

use crate::config::DatabaseConfig;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

pub fn create_conn(config: &DatabaseConfig) -> Result<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(&config.url);
    Pool::builder()
        .max_size(config.max_connections)
        .build(manager)
        .context("Failed to create database pool")
}
