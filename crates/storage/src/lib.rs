use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use parking_lot::RwLock;
use safarai_core::{Gender, Role, Session, Trip, User};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("a user with this email already exists")]
    DuplicateEmail,
    #[error("record not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("document encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("corrupt column `{column}`: {value}")]
    Corrupt { column: &'static str, value: String },
}

pub type StorageResult<T> = Result<T, StorageError>;

pub trait UserRepository: Send + Sync {
    async fn insert_user(&self, user: &User) -> StorageResult<()>;
    async fn update_user(&self, user: &User) -> StorageResult<()>;
    async fn find_user_by_id(&self, user_id: &str) -> StorageResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<User>>;
    async fn find_user_by_reset_token(&self, token_hash: &str) -> StorageResult<Option<User>>;
}

pub trait SessionRepository: Send + Sync {
    async fn insert_session(&self, session: &Session) -> StorageResult<()>;
    async fn load_session(&self, token: &str) -> StorageResult<Option<Session>>;
    async fn delete_session(&self, token: &str) -> StorageResult<()>;
    async fn delete_sessions_for_user(&self, user_id: &str) -> StorageResult<u64>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> StorageResult<u64>;
}

pub trait TripRepository: Send + Sync {
    async fn insert_trip(&self, trip: &Trip) -> StorageResult<()>;
    async fn list_trips_for_user(&self, user_id: &str) -> StorageResult<Vec<Trip>>;
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    users: Arc<RwLock<HashMap<String, User>>>,
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    trips: Arc<RwLock<Vec<Trip>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserRepository for MemoryStore {
    async fn insert_user(&self, user: &User) -> StorageResult<()> {
        let mut users = self.users.write();
        if users.values().any(|existing| existing.email == user.email) {
            return Err(StorageError::DuplicateEmail);
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> StorageResult<()> {
        let mut users = self.users.write();
        if users
            .values()
            .any(|existing| existing.email == user.email && existing.id != user.id)
        {
            return Err(StorageError::DuplicateEmail);
        }
        match users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound),
        }
    }

    async fn find_user_by_id(&self, user_id: &str) -> StorageResult<Option<User>> {
        Ok(self.users.read().get(user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        Ok(self
            .users
            .read()
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn find_user_by_reset_token(&self, token_hash: &str) -> StorageResult<Option<User>> {
        Ok(self
            .users
            .read()
            .values()
            .find(|user| user.reset_password_token.as_deref() == Some(token_hash))
            .cloned())
    }
}

impl SessionRepository for MemoryStore {
    async fn insert_session(&self, session: &Session) -> StorageResult<()> {
        self.sessions
            .write()
            .insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn load_session(&self, token: &str) -> StorageResult<Option<Session>> {
        Ok(self.sessions.read().get(token).cloned())
    }

    async fn delete_session(&self, token: &str) -> StorageResult<()> {
        self.sessions.write().remove(token);
        Ok(())
    }

    async fn delete_sessions_for_user(&self, user_id: &str) -> StorageResult<u64> {
        let mut removed = 0_u64;
        self.sessions.write().retain(|_, session| {
            let keep = session.user_id != user_id;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let mut removed = 0_u64;
        self.sessions.write().retain(|_, session| {
            let keep = !session.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}

impl TripRepository for MemoryStore {
    async fn insert_trip(&self, trip: &Trip) -> StorageResult<()> {
        self.trips.write().push(trip.clone());
        Ok(())
    }

    async fn list_trips_for_user(&self, user_id: &str) -> StorageResult<Vec<Trip>> {
        let mut trips = self
            .trips
            .read()
            .iter()
            .filter(|trip| trip.user_id == user_id)
            .cloned()
            .collect::<Vec<_>>();
        trips.sort_by_key(|trip| trip.created_at);
        Ok(trips)
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        // every connection to `:memory:` opens its own database, so that one
        // connection must never be closed or recycled
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = options.connect(database_url).await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
              user_id TEXT PRIMARY KEY,
              username TEXT NOT NULL,
              email TEXT NOT NULL UNIQUE,
              password_hash TEXT NOT NULL,
              gender TEXT,
              dob TEXT,
              role TEXT NOT NULL,
              is_verified INTEGER NOT NULL,
              verification_code TEXT,
              verification_code_expiry TEXT,
              reset_password_token TEXT,
              reset_password_expiry TEXT,
              created_at TEXT NOT NULL,
              updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
              token TEXT PRIMARY KEY,
              user_id TEXT NOT NULL,
              created_at TEXT NOT NULL,
              expires_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trips (
              trip_id TEXT PRIMARY KEY,
              user_id TEXT NOT NULL,
              created_at TEXT NOT NULL,
              data_json TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS trips_by_user ON trips (user_id, created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find_user_where(&self, column: &str, value: &str) -> StorageResult<Option<User>> {
        let query = format!(
            r#"
            SELECT user_id, username, email, password_hash, gender, dob, role, is_verified,
                   verification_code, verification_code_expiry, reset_password_token,
                   reset_password_expiry, created_at, updated_at
            FROM users
            WHERE {column} = ?1
            LIMIT 1
            "#
        );
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| user_from_row(&row)).transpose()
    }
}

impl UserRepository for SqliteStore {
    async fn insert_user(&self, user: &User) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (user_id, username, email, password_hash, gender, dob, role, is_verified,
                               verification_code, verification_code_expiry, reset_password_token,
                               reset_password_expiry, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(user.id.as_str())
        .bind(user.username.as_str())
        .bind(user.email.as_str())
        .bind(user.password_hash.as_str())
        .bind(user.gender.map(Gender::as_code))
        .bind(user.dob.map(|value| value.to_string()))
        .bind(user.role.as_code())
        .bind(if user.is_verified { 1_i64 } else { 0_i64 })
        .bind(user.verification_code.as_deref())
        .bind(user.verification_code_expiry.map(timestamp))
        .bind(user.reset_password_token.as_deref())
        .bind(user.reset_password_expiry.map(timestamp))
        .bind(timestamp(user.created_at))
        .bind(timestamp(user.updated_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => Err(StorageError::DuplicateEmail),
            Err(error) => Err(error.into()),
        }
    }

    async fn update_user(&self, user: &User) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
              username = ?2,
              email = ?3,
              password_hash = ?4,
              gender = ?5,
              dob = ?6,
              role = ?7,
              is_verified = ?8,
              verification_code = ?9,
              verification_code_expiry = ?10,
              reset_password_token = ?11,
              reset_password_expiry = ?12,
              updated_at = ?13
            WHERE user_id = ?1
            "#,
        )
        .bind(user.id.as_str())
        .bind(user.username.as_str())
        .bind(user.email.as_str())
        .bind(user.password_hash.as_str())
        .bind(user.gender.map(Gender::as_code))
        .bind(user.dob.map(|value| value.to_string()))
        .bind(user.role.as_code())
        .bind(if user.is_verified { 1_i64 } else { 0_i64 })
        .bind(user.verification_code.as_deref())
        .bind(user.verification_code_expiry.map(timestamp))
        .bind(user.reset_password_token.as_deref())
        .bind(user.reset_password_expiry.map(timestamp))
        .bind(timestamp(user.updated_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(StorageError::NotFound),
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => Err(StorageError::DuplicateEmail),
            Err(error) => Err(error.into()),
        }
    }

    async fn find_user_by_id(&self, user_id: &str) -> StorageResult<Option<User>> {
        self.find_user_where("user_id", user_id).await
    }

    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        self.find_user_where("email", email).await
    }

    async fn find_user_by_reset_token(&self, token_hash: &str) -> StorageResult<Option<User>> {
        self.find_user_where("reset_password_token", token_hash)
            .await
    }
}

impl SessionRepository for SqliteStore {
    async fn insert_session(&self, session: &Session) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token, user_id, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(token) DO UPDATE SET
              user_id=excluded.user_id,
              expires_at=excluded.expires_at
            "#,
        )
        .bind(session.token.as_str())
        .bind(session.user_id.as_str())
        .bind(timestamp(session.created_at))
        .bind(timestamp(session.expires_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_session(&self, token: &str) -> StorageResult<Option<Session>> {
        let row = sqlx::query(
            "SELECT token, user_id, created_at, expires_at FROM sessions WHERE token = ?1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Session {
            token: row.get("token"),
            user_id: row.get("user_id"),
            created_at: parse_timestamp("created_at", row.get("created_at"))?,
            expires_at: parse_timestamp("expires_at", row.get("expires_at"))?,
        }))
    }

    async fn delete_session(&self, token: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM sessions WHERE token = ?1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_sessions_for_user(&self, user_id: &str) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        // rfc3339 strings in UTC compare lexicographically
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?1")
            .bind(timestamp(now))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

impl TripRepository for SqliteStore {
    async fn insert_trip(&self, trip: &Trip) -> StorageResult<()> {
        let data_json = serde_json::to_string(trip)?;
        sqlx::query(
            r#"
            INSERT INTO trips (trip_id, user_id, created_at, data_json)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(trip.id.as_str())
        .bind(trip.user_id.as_str())
        .bind(timestamp(trip.created_at))
        .bind(data_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_trips_for_user(&self, user_id: &str) -> StorageResult<Vec<Trip>> {
        let rows = sqlx::query(
            r#"
            SELECT data_json
            FROM trips
            WHERE user_id = ?1
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let data_json: String = row.get("data_json");
                serde_json::from_str::<Trip>(&data_json).map_err(StorageError::from)
            })
            .collect()
    }
}

fn user_from_row(row: &SqliteRow) -> StorageResult<User> {
    let gender = row
        .get::<Option<String>, _>("gender")
        .map(|value| {
            Gender::parse(&value).ok_or(StorageError::Corrupt {
                column: "gender",
                value,
            })
        })
        .transpose()?;
    let dob = row
        .get::<Option<String>, _>("dob")
        .map(|value| {
            NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                .map_err(|_| StorageError::Corrupt { column: "dob", value })
        })
        .transpose()?;
    let role_code: String = row.get("role");
    let role = Role::parse(&role_code).ok_or(StorageError::Corrupt {
        column: "role",
        value: role_code,
    })?;

    Ok(User {
        id: row.get("user_id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        gender,
        dob,
        role,
        is_verified: row.get::<i64, _>("is_verified") != 0,
        verification_code: row.get("verification_code"),
        verification_code_expiry: parse_optional_timestamp(
            "verification_code_expiry",
            row.get("verification_code_expiry"),
        )?,
        reset_password_token: row.get("reset_password_token"),
        reset_password_expiry: parse_optional_timestamp(
            "reset_password_expiry",
            row.get("reset_password_expiry"),
        )?,
        created_at: parse_timestamp("created_at", row.get("created_at"))?,
        updated_at: parse_timestamp("updated_at", row.get("updated_at"))?,
    })
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &'static str, value: String) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| StorageError::Corrupt { column, value })
}

fn parse_optional_timestamp(
    column: &'static str,
    value: Option<String>,
) -> StorageResult<Option<DateTime<Utc>>> {
    value.map(|value| parse_timestamp(column, value)).transpose()
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .is_some_and(|db_error| db_error.is_unique_violation())
}

#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub async fn sqlite(database_url: &str) -> StorageResult<Self> {
        let sqlite = SqliteStore::connect(database_url).await?;
        Ok(Self::Sqlite(sqlite))
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Sqlite(_) => "sqlite",
        }
    }
}

impl UserRepository for Store {
    async fn insert_user(&self, user: &User) -> StorageResult<()> {
        match self {
            Store::Memory(store) => store.insert_user(user).await,
            Store::Sqlite(store) => store.insert_user(user).await,
        }
    }

    async fn update_user(&self, user: &User) -> StorageResult<()> {
        match self {
            Store::Memory(store) => store.update_user(user).await,
            Store::Sqlite(store) => store.update_user(user).await,
        }
    }

    async fn find_user_by_id(&self, user_id: &str) -> StorageResult<Option<User>> {
        match self {
            Store::Memory(store) => store.find_user_by_id(user_id).await,
            Store::Sqlite(store) => store.find_user_by_id(user_id).await,
        }
    }

    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        match self {
            Store::Memory(store) => store.find_user_by_email(email).await,
            Store::Sqlite(store) => store.find_user_by_email(email).await,
        }
    }

    async fn find_user_by_reset_token(&self, token_hash: &str) -> StorageResult<Option<User>> {
        match self {
            Store::Memory(store) => store.find_user_by_reset_token(token_hash).await,
            Store::Sqlite(store) => store.find_user_by_reset_token(token_hash).await,
        }
    }
}

impl SessionRepository for Store {
    async fn insert_session(&self, session: &Session) -> StorageResult<()> {
        match self {
            Store::Memory(store) => store.insert_session(session).await,
            Store::Sqlite(store) => store.insert_session(session).await,
        }
    }

    async fn load_session(&self, token: &str) -> StorageResult<Option<Session>> {
        match self {
            Store::Memory(store) => store.load_session(token).await,
            Store::Sqlite(store) => store.load_session(token).await,
        }
    }

    async fn delete_session(&self, token: &str) -> StorageResult<()> {
        match self {
            Store::Memory(store) => store.delete_session(token).await,
            Store::Sqlite(store) => store.delete_session(token).await,
        }
    }

    async fn delete_sessions_for_user(&self, user_id: &str) -> StorageResult<u64> {
        match self {
            Store::Memory(store) => store.delete_sessions_for_user(user_id).await,
            Store::Sqlite(store) => store.delete_sessions_for_user(user_id).await,
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        match self {
            Store::Memory(store) => store.purge_expired(now).await,
            Store::Sqlite(store) => store.purge_expired(now).await,
        }
    }
}

impl TripRepository for Store {
    async fn insert_trip(&self, trip: &Trip) -> StorageResult<()> {
        match self {
            Store::Memory(store) => store.insert_trip(trip).await,
            Store::Sqlite(store) => store.insert_trip(trip).await,
        }
    }

    async fn list_trips_for_user(&self, user_id: &str) -> StorageResult<Vec<Trip>> {
        match self {
            Store::Memory(store) => store.list_trips_for_user(user_id).await,
            Store::Sqlite(store) => store.list_trips_for_user(user_id).await,
        }
    }
}
