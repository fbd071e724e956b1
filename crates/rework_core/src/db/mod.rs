use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use crate::error::AppError;

/// Named schema steps, applied in order and recorded in `_migrations`.
const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_init.sql",
    include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../migrations/0001_init.sql"
    )),
)];

/// Columns the sources and the importer read and write.
pub const SERVICE_ORDER_COLUMNS: &[&str] = &[
    "order_id",
    "vehicle_id",
    "service_code",
    "order_type",
    "opened_at",
    "closed_at",
    "workshop",
    "section",
    "model",
    "mechanic",
    "cost",
    "symptom",
    "solution",
];

/// How long a reader waits on an import's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn db_err(code: &'static str, message: String) -> impl FnOnce(rusqlite::Error) -> AppError {
    move |e| AppError::new(code, message).with_details(e.to_string())
}

/// Open a service-order store on disk in WAL mode.
pub fn open(path: &Path) -> Result<Connection, AppError> {
    let conn = Connection::open(path).map_err(db_err(
        "DB_OPEN_FAILED",
        format!("Failed to open SQLite database at {}", path.display()),
    ))?;
    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .map_err(db_err("DB_PRAGMA_FAILED", "Failed to enable WAL journal".to_string()))?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(db_err("DB_PRAGMA_FAILED", "Failed to set busy timeout".to_string()))?;
    tracing::debug!(path = %path.display(), journal_mode = %mode, "opened service-order store");
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection, AppError> {
    Connection::open_in_memory().map_err(db_err(
        "DB_OPEN_FAILED",
        "Failed to open in-memory SQLite database".to_string(),
    ))
}

/// Open a database file and bring its schema up to date.
pub fn open_and_migrate(path: &Path) -> Result<Connection, AppError> {
    let mut conn = open(path)?;
    migrate(&mut conn)?;
    Ok(conn)
}

fn applied_migrations(conn: &Connection) -> Result<BTreeSet<String>, AppError> {
    let read_err = || {
        db_err(
            "DB_MIGRATIONS_QUERY_FAILED",
            "Failed to read applied migrations".to_string(),
        )
    };
    let mut stmt = conn
        .prepare("SELECT name FROM _migrations")
        .map_err(read_err())?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(read_err())?
        .collect::<Result<BTreeSet<_>, _>>()
        .map_err(read_err())?;
    Ok(names)
}

/// Apply pending migrations, each in its own transaction, then check that
/// `service_orders` carries every column the crate relies on.
pub fn migrate(conn: &mut Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
           name TEXT PRIMARY KEY NOT NULL,
           applied_at TEXT NOT NULL
         );",
    )
    .map_err(db_err(
        "DB_MIGRATIONS_TABLE_FAILED",
        "Failed to ensure migrations table exists".to_string(),
    ))?;

    let applied = applied_migrations(conn)?;
    for (name, sql) in MIGRATIONS.iter().filter(|(name, _)| !applied.contains(*name)) {
        let tx = conn.transaction().map_err(db_err(
            "DB_TX_FAILED",
            "Failed to start migration transaction".to_string(),
        ))?;
        tx.execute_batch(sql)
            .map_err(db_err("DB_MIGRATION_FAILED", format!("Migration {name} failed")))?;
        tx.execute(
            "INSERT INTO _migrations(name, applied_at) VALUES (?1, strftime('%Y-%m-%dT%H:%M:%fZ','now'))",
            [name],
        )
        .map_err(db_err(
            "DB_MIGRATION_FAILED",
            format!("Failed to record migration {name}"),
        ))?;
        tx.commit().map_err(db_err(
            "DB_TX_FAILED",
            "Failed to commit migration transaction".to_string(),
        ))?;
        tracing::debug!(migration = name, "applied migration");
    }

    verify_service_orders_schema(conn)
}

/// Fail with `DB_SCHEMA_MISMATCH` when `service_orders` lacks a column the crate uses.
pub fn verify_service_orders_schema(conn: &Connection) -> Result<(), AppError> {
    let read_err = || {
        db_err(
            "DB_SCHEMA_QUERY_FAILED",
            "Failed to read service_orders columns".to_string(),
        )
    };
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info('service_orders')")
        .map_err(read_err())?;
    let present = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(read_err())?
        .collect::<Result<BTreeSet<_>, _>>()
        .map_err(read_err())?;

    let missing = SERVICE_ORDER_COLUMNS
        .iter()
        .filter(|c| !present.contains(**c))
        .copied()
        .collect::<Vec<_>>();
    if missing.is_empty() {
        return Ok(());
    }
    Err(AppError::new(
        "DB_SCHEMA_MISMATCH",
        "service_orders is missing required columns",
    )
    .with_details(format!("missing={}", missing.join(","))))
}
