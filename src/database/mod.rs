// Copyright 2023 Remi Bernotavicius

use diesel::connection::SimpleConnection as _;
use diesel::prelude::Connection as _;
use diesel::r2d2::{ConnectionManager, CustomizeConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::path::Path;
use std::time::Duration;

pub mod models;
pub mod schema;

pub type Connection = diesel::sqlite::SqliteConnection;
pub type Pool = diesel::r2d2::Pool<ConnectionManager<Connection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

const CONNECTION_PRAGMAS: &str = "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;";

fn database_url(path: &Path) -> crate::Result<&str> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    path.to_str()
        .ok_or_else(|| format!("database path {path:?} is not valid UTF-8").into())
}

pub fn establish_connection(path: impl AsRef<Path>) -> crate::Result<Connection> {
    let mut connection = Connection::establish(database_url(path.as_ref())?)?;
    connection.batch_execute(CONNECTION_PRAGMAS)?;
    connection.run_pending_migrations(MIGRATIONS)?;
    Ok(connection)
}

#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<Connection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(CONNECTION_PRAGMAS)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

pub fn establish_pool(path: impl AsRef<Path>, max_size: u32) -> crate::Result<Pool> {
    let manager = ConnectionManager::<Connection>::new(database_url(path.as_ref())?);
    let pool = Pool::builder()
        .max_size(max_size)
        .connection_timeout(Duration::from_secs(10))
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)?;

    let mut conn = pool.get()?;
    let applied = conn.run_pending_migrations(MIGRATIONS)?;
    for migration in applied {
        log::info!("applied migration {migration}");
    }
    Ok(pool)
}

#[cfg(test)]
pub fn test_connection() -> Connection {
    establish_connection(":memory:").unwrap()
}

#[test]
fn migrations_redo() {
    let mut conn = test_connection();
    conn.revert_all_migrations(MIGRATIONS).unwrap();
    conn.run_pending_migrations(MIGRATIONS).unwrap();
}

#[test]
fn foreign_keys_enforced() {
    use diesel::ExpressionMethods as _;
    use diesel::RunQueryDsl as _;
    use schema::ingredients::dsl::*;

    let mut conn = test_connection();
    let result = diesel::insert_into(ingredients)
        .values((name.eq("玉ねぎ"), ingredient_category_id.eq(42)))
        .execute(&mut conn);
    assert!(result.is_err());
}
