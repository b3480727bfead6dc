//! libSQL backend — async `UserRepository` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::profile::{UserField, UserId, UserRecord};
use crate::store::migrations;
use crate::store::traits::UserRepository;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Run all pending schema migrations.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(&self.conn).await
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse a stored timestamp.
///
/// Accepts RFC 3339 (our write format), SQLite `datetime()` output, and the
/// naive ISO-8601 strings written by the earlier bot (interpreted as UTC).
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| chrono::NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|ndt| ndt.and_utc())
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

const USER_COLUMNS: &str =
    "id, name, username, phone_number, email, skills, preferences, portfolio, about_user, vip_until";

/// Map a libsql Row to a UserRecord.
///
/// Column order matches USER_COLUMNS. NULL text columns come back as `None`.
fn row_to_user(row: &libsql::Row) -> Result<UserRecord, DatabaseError> {
    // NULL is an unset field; any other non-text value is corrupt data.
    let text = |idx: i32| -> Result<Option<String>, DatabaseError> {
        match row
            .get_value(idx)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?
        {
            libsql::Value::Null => Ok(None),
            libsql::Value::Text(s) => Ok(Some(s)),
            other => Err(DatabaseError::Serialization(format!(
                "column {idx}: expected text, got {other:?}"
            ))),
        }
    };

    let vip_until = match text(9)? {
        Some(raw) => Some(parse_datetime(&raw).ok_or_else(|| {
            DatabaseError::Serialization(format!("unparseable vip_until: {raw}"))
        })?),
        None => None,
    };

    Ok(UserRecord {
        id: row
            .get::<i64>(0)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
        name: text(1)?,
        username: text(2)?,
        phone: text(3)?,
        email: text(4)?,
        skills: text(5)?,
        preferences: text(6)?,
        portfolio: text(7)?,
        about_user: text(8)?,
        vip_until,
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl UserRepository for LibSqlBackend {
    async fn get(&self, id: UserId) -> Result<UserRecord, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get user: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_user(&row),
            Ok(None) => Err(DatabaseError::NotFound(id)),
            Err(e) => Err(DatabaseError::Query(format!("get user: {e}"))),
        }
    }

    async fn create(
        &self,
        id: UserId,
        name: Option<&str>,
        username: Option<&str>,
    ) -> Result<UserRecord, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let inserted = self
            .conn()
            .execute(
                "INSERT INTO users (id, name, username, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT (id) DO NOTHING",
                params![id, opt_text(name), opt_text(username), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create user: {e}")))?;

        if inserted == 0 {
            return Err(DatabaseError::AlreadyExists(id));
        }

        debug!(user_id = id, "User created");
        Ok(UserRecord::new(id, name, username))
    }

    async fn update_field(
        &self,
        id: UserId,
        field: UserField,
        value: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let sql = format!(
            "UPDATE users SET {} = ?1, updated_at = ?2 WHERE id = ?3",
            field.column()
        );
        let updated = self
            .conn()
            .execute(&sql, params![opt_text(value), now, id])
            .await
            .map_err(|e| DatabaseError::Query(format!("update {field}: {e}")))?;

        if updated == 0 {
            return Err(DatabaseError::NotFound(id));
        }
        debug!(user_id = id, %field, "User field updated");
        Ok(())
    }

    async fn update_fields(
        &self,
        id: UserId,
        fields: &[(UserField, &str)],
    ) -> Result<(), DatabaseError> {
        if fields.is_empty() {
            return Ok(());
        }

        // A single UPDATE statement is atomic, so no explicit transaction is needed.
        let mut assignments = Vec::with_capacity(fields.len() + 1);
        let mut values = Vec::with_capacity(fields.len() + 2);
        for (idx, (field, value)) in fields.iter().enumerate() {
            assignments.push(format!("{} = ?{}", field.column(), idx + 1));
            values.push(libsql::Value::Text(value.to_string()));
        }
        let n = fields.len();
        assignments.push(format!("updated_at = ?{}", n + 1));
        values.push(libsql::Value::Text(Utc::now().to_rfc3339()));
        values.push(libsql::Value::Integer(id));

        let sql = format!(
            "UPDATE users SET {} WHERE id = ?{}",
            assignments.join(", "),
            n + 2
        );
        let updated = self
            .conn()
            .execute(&sql, libsql::params::Params::Positional(values))
            .await
            .map_err(|e| DatabaseError::Query(format!("update fields: {e}")))?;

        if updated == 0 {
            return Err(DatabaseError::NotFound(id));
        }
        debug!(user_id = id, count = n, "User fields updated");
        Ok(())
    }

    async fn list_others(&self, excluding: UserId) -> Result<Vec<UserRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id != ?1 ORDER BY id"),
                params![excluding],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list users: {e}")))?;

        let mut users = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list users: {e}")))?
        {
            users.push(row_to_user(&row)?);
        }
        Ok(users)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
