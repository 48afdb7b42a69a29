//! Access levels, caller identity, and per-root permission checks.
//!
//! Grants live in `root_permissions`. Levels are ordered
//! `read < write < admin`; every read path (search, listing, file detail)
//! needs at least `read` on the root it touches. A principal with no
//! grant is treated exactly like one below `read`.
//!
//! The lookup sits behind [`PermissionLookup`] so an embedding application
//! can answer from its own identity store instead of the local table.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::filter::Predicate;
use crate::roots;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Write,
    Admin,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
            AccessLevel::Admin => "admin",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "read" | "reader" => Ok(AccessLevel::Read),
            "write" | "editor" => Ok(AccessLevel::Write),
            "admin" => Ok(AccessLevel::Admin),
            other => Err(Error::Validation(format!(
                "unknown access level '{}' (expected read, write or admin)",
                other
            ))),
        }
    }
}

/// Who is asking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub principal: String,
    /// Bypasses all grant checks (operators, the CLI without `--as`).
    pub unrestricted: bool,
}

impl Caller {
    pub fn unrestricted() -> Self {
        Caller {
            principal: String::new(),
            unrestricted: true,
        }
    }

    pub fn principal(name: impl Into<String>) -> Self {
        Caller {
            principal: name.into(),
            unrestricted: false,
        }
    }
}

#[async_trait]
pub trait PermissionLookup: Send + Sync {
    /// The principal's level on a root, or `None` without a grant.
    async fn access_level(&self, principal: &str, root_id: i64) -> Result<Option<AccessLevel>>;

    /// Ids of roots on which the principal holds at least `read`, ascending.
    async fn readable_roots(&self, principal: &str) -> Result<Vec<i64>>;
}

/// Grants stored in the catalog database.
pub struct SqlitePermissions {
    pool: SqlitePool,
}

impl SqlitePermissions {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionLookup for SqlitePermissions {
    async fn access_level(&self, principal: &str, root_id: i64) -> Result<Option<AccessLevel>> {
        let level: Option<String> = sqlx::query_scalar(
            "SELECT access_level FROM root_permissions WHERE root_id = ? AND principal = ?",
        )
        .bind(root_id)
        .bind(principal)
        .fetch_optional(&self.pool)
        .await?;

        level.map(|l| l.parse()).transpose()
    }

    async fn readable_roots(&self, principal: &str) -> Result<Vec<i64>> {
        // Every stored level is at least read.
        let ids = sqlx::query_scalar(
            "SELECT root_id FROM root_permissions WHERE principal = ? ORDER BY root_id ASC",
        )
        .bind(principal)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

/// Fail with `PermissionDenied` unless the caller may read `root_id`.
pub async fn require_read(
    lookup: &dyn PermissionLookup,
    caller: &Caller,
    root_id: i64,
) -> Result<()> {
    if caller.unrestricted {
        return Ok(());
    }
    match lookup.access_level(&caller.principal, root_id).await? {
        Some(level) if level >= AccessLevel::Read => Ok(()),
        _ => Err(Error::PermissionDenied(format!(
            "'{}' has no read access to root {}",
            caller.principal, root_id
        ))),
    }
}

/// The root predicate a read query must carry for this caller.
///
/// With an explicit root the caller needs read on it. Without one, a
/// restricted caller is limited to its readable roots and an unrestricted
/// caller gets no extra predicate.
pub async fn root_scope(
    lookup: &dyn PermissionLookup,
    caller: &Caller,
    root_id: Option<i64>,
) -> Result<Option<Predicate>> {
    match root_id {
        Some(id) => {
            require_read(lookup, caller, id).await?;
            Ok(Some(Predicate::RootIs(id)))
        }
        None if caller.unrestricted => Ok(None),
        None => {
            let ids = lookup.readable_roots(&caller.principal).await?;
            Ok(Some(Predicate::RootIn(ids)))
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Grant {
    pub root_id: i64,
    pub principal: String,
    pub access_level: AccessLevel,
    pub created_at: i64,
}

/// Create or replace the grant of `principal` on `root_id`.
pub async fn grant_access(
    pool: &SqlitePool,
    root_id: i64,
    principal: &str,
    level: AccessLevel,
) -> Result<()> {
    let principal = principal.trim();
    if principal.is_empty() {
        return Err(Error::Validation("principal must not be empty".into()));
    }
    roots::get_root(pool, root_id).await?;

    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        r#"
        INSERT INTO root_permissions (root_id, principal, access_level, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(root_id, principal) DO UPDATE SET access_level = excluded.access_level
        "#,
    )
    .bind(root_id)
    .bind(principal)
    .bind(level.as_str())
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Remove a grant. Returns whether one existed.
pub async fn revoke_access(pool: &SqlitePool, root_id: i64, principal: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM root_permissions WHERE root_id = ? AND principal = ?")
        .bind(root_id)
        .bind(principal.trim())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_grants(pool: &SqlitePool, root_id: i64) -> Result<Vec<Grant>> {
    let rows = sqlx::query(
        "SELECT root_id, principal, access_level, created_at FROM root_permissions \
         WHERE root_id = ? ORDER BY principal ASC",
    )
    .bind(root_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<Grant> {
            let level: String = row.get("access_level");
            Ok(Grant {
                root_id: row.get("root_id"),
                principal: row.get("principal"),
                access_level: level.parse()?,
                created_at: row.get("created_at"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FixedGrants(HashMap<(String, i64), AccessLevel>);

    #[async_trait]
    impl PermissionLookup for FixedGrants {
        async fn access_level(&self, principal: &str, root_id: i64) -> Result<Option<AccessLevel>> {
            Ok(self.0.get(&(principal.to_string(), root_id)).copied())
        }

        async fn readable_roots(&self, principal: &str) -> Result<Vec<i64>> {
            let mut ids: Vec<i64> = self
                .0
                .keys()
                .filter(|(p, _)| p == principal)
                .map(|(_, id)| *id)
                .collect();
            ids.sort();
            Ok(ids)
        }
    }

    fn grants() -> FixedGrants {
        let mut map = HashMap::new();
        map.insert(("ana".to_string(), 1), AccessLevel::Read);
        map.insert(("ana".to_string(), 3), AccessLevel::Admin);
        FixedGrants(map)
    }

    #[test]
    fn levels_are_ordered() {
        assert!(AccessLevel::Read < AccessLevel::Write);
        assert!(AccessLevel::Write < AccessLevel::Admin);
    }

    #[test]
    fn level_names_parse() {
        assert_eq!("reader".parse::<AccessLevel>().unwrap(), AccessLevel::Read);
        assert_eq!("Editor".parse::<AccessLevel>().unwrap(), AccessLevel::Write);
        assert_eq!("admin".parse::<AccessLevel>().unwrap(), AccessLevel::Admin);
        assert!(matches!(
            "owner".parse::<AccessLevel>(),
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn restricted_caller_needs_a_grant() {
        let lookup = grants();
        let ana = Caller::principal("ana");
        assert!(require_read(&lookup, &ana, 1).await.is_ok());
        assert!(matches!(
            require_read(&lookup, &ana, 2).await,
            Err(Error::PermissionDenied(_))
        ));
        let bob = Caller::principal("bob");
        assert!(require_read(&lookup, &bob, 1).await.is_err());
    }

    #[tokio::test]
    async fn unrestricted_caller_skips_lookup() {
        let lookup = grants();
        let op = Caller::unrestricted();
        assert!(require_read(&lookup, &op, 99).await.is_ok());
        assert_eq!(root_scope(&lookup, &op, None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn scope_without_root_lists_readable_roots() {
        let lookup = grants();
        let scope = root_scope(&lookup, &Caller::principal("ana"), None)
            .await
            .unwrap();
        assert_eq!(scope, Some(Predicate::RootIn(vec![1, 3])));

        let scope = root_scope(&lookup, &Caller::principal("nobody"), None)
            .await
            .unwrap();
        assert_eq!(scope, Some(Predicate::RootIn(vec![])));
    }

    #[tokio::test]
    async fn scope_with_root_checks_it() {
        let lookup = grants();
        let ana = Caller::principal("ana");
        assert_eq!(
            root_scope(&lookup, &ana, Some(3)).await.unwrap(),
            Some(Predicate::RootIs(3))
        );
        assert!(root_scope(&lookup, &ana, Some(2)).await.is_err());
    }
}
