//! PostgreSQL membership store for production use.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)
//! - `DB_MAX_LIFETIME_SECS`: Max connection lifetime (default: 1800)

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;

use crate::types::{Group, MembershipEdge, NodeKind, NodeRef, ProfilePicture, User};
use super::{EdgeStore, EntityStore, MembershipStore};

/// Schema statements, applied idempotently by [`PostgresMembershipStore::ensure_schema`].
pub const MEMBERSHIP_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS mg_users (
        seq BIGSERIAL UNIQUE,
        username TEXT PRIMARY KEY,
        email TEXT[] NOT NULL,
        profile_picture_kind TEXT,
        profile_picture_uri TEXT,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS mg_groups (
        seq BIGSERIAL UNIQUE,
        group_name TEXT PRIMARY KEY,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS mg_memberships (
        member_kind TEXT NOT NULL CHECK (member_kind IN ('user', 'group')),
        member_id TEXT NOT NULL,
        group_name TEXT NOT NULL,
        PRIMARY KEY (member_kind, member_id, group_name)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS mg_memberships_group_idx ON mg_memberships (group_name)",
];

/// Configuration for PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 10).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 2).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800 = 30 min).
    pub max_lifetime_secs: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl PostgresConfig {
    /// Load configuration from environment variables with production defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/membership".to_string()),
            max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            min_connections: env_or("DB_MIN_CONNECTIONS", 2),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", 10),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: env_or("DB_MAX_LIFETIME_SECS", 1800),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// PostgreSQL membership store.
///
/// Edges live in one table keyed by (member_kind, member_id, group_name);
/// the primary key serves forward lookups and a secondary index on
/// group_name serves reverse lookups.
pub struct PostgresMembershipStore {
    pool: PgPool,
}

impl PostgresMembershipStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, sqlx::Error> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            max_lifetime_secs = config.max_lifetime_secs,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        for statement in MEMBERSHIP_SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Membership schema ensured");
        Ok(())
    }

    fn parse_user_row(row: &sqlx::postgres::PgRow) -> Result<User, sqlx::Error> {
        let kind: Option<String> = row.try_get("profile_picture_kind")?;
        let uri: Option<String> = row.try_get("profile_picture_uri")?;
        let profile_picture = match (kind, uri) {
            (Some(kind), Some(uri)) => ProfilePicture::from_storage(&kind, uri),
            _ => None,
        };

        Ok(User {
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            profile_picture,
            created_at: row.try_get("created_at")?,
        })
    }

    fn parse_group_row(row: &sqlx::postgres::PgRow) -> Result<Group, sqlx::Error> {
        Ok(Group {
            group_name: row.try_get("group_name")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Error type for PostgreSQL store.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Stored member kind is neither user nor group.
    #[error("Corrupt member kind in storage: {0}")]
    CorruptKind(String),
}

#[async_trait]
impl EntityStore for PostgresMembershipStore {
    type Error = PostgresError;

    async fn insert_user(&self, user: User) -> Result<bool, Self::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO mg_users (username, email, profile_picture_kind, profile_picture_uri, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (username) DO NOTHING
            "#
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.profile_picture.as_ref().map(ProfilePicture::storage_kind))
        .bind(user.profile_picture_uri())
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_group(&self, group: Group) -> Result<bool, Self::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO mg_groups (group_name, created_at)
            VALUES ($1, $2)
            ON CONFLICT (group_name) DO NOTHING
            "#
        )
        .bind(&group.group_name)
        .bind(group.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_user(&self, username: &str) -> Result<Option<User>, Self::Error> {
        let row = sqlx::query(
            r#"
            SELECT username, email, profile_picture_kind, profile_picture_uri, created_at
            FROM mg_users
            WHERE username = $1
            "#
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(Self::parse_user_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_group(&self, group_name: &str) -> Result<Option<Group>, Self::Error> {
        let row = sqlx::query("SELECT group_name, created_at FROM mg_groups WHERE group_name = $1")
            .bind(group_name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(Self::parse_group_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_groups(&self, names: &[String]) -> Result<Vec<Group>, Self::Error> {
        // Preserve the caller's order via the array position
        let rows = sqlx::query(
            r#"
            SELECT g.group_name, g.created_at
            FROM unnest($1::text[]) WITH ORDINALITY AS wanted(name, pos)
            JOIN mg_groups g ON g.group_name = wanted.name
            ORDER BY wanted.pos
            "#
        )
        .bind(names)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(Self::parse_group_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(PostgresError::from)
    }

    async fn list_users(&self) -> Result<Vec<User>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT username, email, profile_picture_kind, profile_picture_uri, created_at
            FROM mg_users
            ORDER BY seq
            "#
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(Self::parse_user_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(PostgresError::from)
    }

    async fn list_groups(&self) -> Result<Vec<Group>, Self::Error> {
        let rows = sqlx::query("SELECT group_name, created_at FROM mg_groups ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(Self::parse_group_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(PostgresError::from)
    }
}

#[async_trait]
impl EdgeStore for PostgresMembershipStore {
    type Error = PostgresError;

    async fn add_edge(&self, edge: &MembershipEdge) -> Result<bool, Self::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO mg_memberships (member_kind, member_id, group_name)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#
        )
        .bind(edge.member.kind.as_str())
        .bind(&edge.member.id)
        .bind(&edge.group_name)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn direct_groups_of(&self, node: &NodeRef) -> Result<Vec<String>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT group_name
            FROM mg_memberships
            WHERE member_kind = $1 AND member_id = $2
            "#
        )
        .bind(node.kind.as_str())
        .bind(&node.id)
        .fetch_all(&self.pool)
        .await?;

        let mut groups: Vec<String> = rows.iter()
            .map(|row| row.get("group_name"))
            .collect();

        // Byte order, independent of the database collation
        groups.sort();
        Ok(groups)
    }

    async fn direct_members_of(&self, group_name: &str) -> Result<Vec<NodeRef>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT member_kind, member_id
            FROM mg_memberships
            WHERE group_name = $1
            "#
        )
        .bind(group_name)
        .fetch_all(&self.pool)
        .await?;

        let mut members = rows.iter()
            .map(|row| {
                let kind: String = row.get("member_kind");
                let id: String = row.get("member_id");
                NodeKind::from_str(&kind)
                    .map(|kind| NodeRef::new(kind, id))
                    .ok_or(PostgresError::CorruptKind(kind))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Kind order is an enum order, not a text order; sort in Rust
        members.sort();
        Ok(members)
    }

    async fn edge_count(&self) -> Result<usize, Self::Error> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM mg_memberships")
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;
        Ok(count as usize)
    }
}

#[async_trait]
impl MembershipStore for PostgresMembershipStore {
    async fn clear(&self) -> Result<(), PostgresError> {
        sqlx::query("TRUNCATE mg_memberships, mg_groups, mg_users RESTART IDENTITY")
            .execute(&self.pool)
            .await?;
        tracing::warn!("Membership store cleared");
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}
