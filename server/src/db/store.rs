//! sqlx-backed membership store.
//!
//! A [`PgSnapshot`] owns one `REPEATABLE READ, READ ONLY` transaction and
//! runs every read of a check on it, so a closure walk and the grant lookup
//! after it see the same committed state. Dropping the snapshot rolls the
//! transaction back.

use std::collections::HashSet;

use async_trait::async_trait;
use portcullis_common::{
    Entity, EntityKind, ObjectKind, ObjectPermission, ObjectPermissionTypes, SystemPermissionType,
};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Transaction};
use tokio::sync::Mutex;

use crate::error::{AuthzError, AuthzResult};
use crate::store::{MembershipReader, MembershipStore};

/// Object permission row joined with its grantee.
#[derive(Debug, FromRow)]
struct ObjectPermissionRow {
    grantee_name: String,
    grantee_kind: String,
    object_kind: String,
    permission: String,
    object_identifier: String,
}

impl TryFrom<ObjectPermissionRow> for ObjectPermission {
    type Error = AuthzError;

    fn try_from(row: ObjectPermissionRow) -> Result<Self, Self::Error> {
        Ok(Self::new(
            Entity::new(row.grantee_name, row.grantee_kind.parse::<EntityKind>()?),
            row.object_kind.parse()?,
            row.permission.parse()?,
            row.object_identifier,
        ))
    }
}

/// Permission names to bind for a `permission = ANY(..)` clause.
fn permission_param(permissions: ObjectPermissionTypes) -> Vec<String> {
    permissions
        .types()
        .map(|permission| permission.as_str().to_string())
        .collect()
}

/// Group identifiers to bind for the inherited-grant clause.
fn group_param(effective_groups: Option<&HashSet<String>>) -> Vec<String> {
    effective_groups
        .map(|groups| groups.iter().cloned().collect())
        .unwrap_or_default()
}

/// Resolve the surrogate key of a stored entity.
async fn entity_id(conn: &mut PgConnection, entity: &Entity) -> AuthzResult<i64> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT entity_id FROM entities WHERE name = $1 AND kind = $2")
            .bind(&entity.identifier)
            .bind(entity.kind.as_str())
            .fetch_optional(conn)
            .await?;

    row.map(|(id,)| id)
        .ok_or_else(|| AuthzError::UnknownEntity(entity.clone()))
}

/// Membership store over the `PostgreSQL` schema in `migrations/`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Make `member` a direct member of `group`.
    ///
    /// Returns `false` if the edge already existed.
    #[tracing::instrument(skip(self))]
    pub async fn add_group_member(&self, group: &Entity, member: &Entity) -> AuthzResult<bool> {
        if !group.is_group() {
            return Err(AuthzError::NotAGroup(group.clone()));
        }

        let mut tx = self.pool.begin().await?;
        let group_id = entity_id(&mut tx, group).await?;
        let member_id = entity_id(&mut tx, member).await?;

        let result = sqlx::query(
            r"
            INSERT INTO group_members (group_entity_id, member_entity_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(group_id)
        .bind(member_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove a direct membership edge.
    ///
    /// Returns `true` if an edge was removed.
    #[tracing::instrument(skip(self))]
    pub async fn remove_group_member(&self, group: &Entity, member: &Entity) -> AuthzResult<bool> {
        let result = sqlx::query(
            r"
            DELETE FROM group_members m
            USING entities g, entities e
            WHERE m.group_entity_id = g.entity_id
              AND m.member_entity_id = e.entity_id
              AND g.name = $1 AND g.kind = $2
              AND e.name = $3 AND e.kind = $4
            ",
        )
        .bind(&group.identifier)
        .bind(group.kind.as_str())
        .bind(&member.identifier)
        .bind(member.kind.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Store an object permission row.
    ///
    /// Returns `false` if the identical row already existed.
    #[tracing::instrument(skip(self))]
    pub async fn grant_object_permission(&self, permission: &ObjectPermission) -> AuthzResult<bool> {
        let mut tx = self.pool.begin().await?;
        let grantee_id = entity_id(&mut tx, &permission.grantee).await?;

        let result = sqlx::query(
            r"
            INSERT INTO object_permissions (entity_id, object_kind, permission, object_identifier)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(grantee_id)
        .bind(permission.object_kind.as_str())
        .bind(permission.permission.as_str())
        .bind(&permission.object_identifier)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete an object permission row.
    ///
    /// Returns `true` if a row was deleted.
    #[tracing::instrument(skip(self))]
    pub async fn revoke_object_permission(
        &self,
        permission: &ObjectPermission,
    ) -> AuthzResult<bool> {
        let result = sqlx::query(
            r"
            DELETE FROM object_permissions p
            USING entities e
            WHERE p.entity_id = e.entity_id
              AND e.name = $1 AND e.kind = $2
              AND p.object_kind = $3
              AND p.permission = $4
              AND p.object_identifier = $5
            ",
        )
        .bind(&permission.grantee.identifier)
        .bind(permission.grantee.kind.as_str())
        .bind(permission.object_kind.as_str())
        .bind(permission.permission.as_str())
        .bind(&permission.object_identifier)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Store a system permission row.
    ///
    /// Returns `false` if the identical row already existed.
    #[tracing::instrument(skip(self))]
    pub async fn grant_system_permission(
        &self,
        entity: &Entity,
        permission: SystemPermissionType,
    ) -> AuthzResult<bool> {
        let mut tx = self.pool.begin().await?;
        let grantee_id = entity_id(&mut tx, entity).await?;

        let result = sqlx::query(
            r"
            INSERT INTO system_permissions (entity_id, permission)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(grantee_id)
        .bind(permission.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a system permission row.
    ///
    /// Returns `true` if a row was deleted.
    #[tracing::instrument(skip(self))]
    pub async fn revoke_system_permission(
        &self,
        entity: &Entity,
        permission: SystemPermissionType,
    ) -> AuthzResult<bool> {
        let result = sqlx::query(
            r"
            DELETE FROM system_permissions p
            USING entities e
            WHERE p.entity_id = e.entity_id
              AND e.name = $1 AND e.kind = $2
              AND p.permission = $3
            ",
        )
        .bind(&entity.identifier)
        .bind(entity.kind.as_str())
        .bind(permission.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl MembershipStore for PgStore {
    type Snapshot = PgSnapshot;

    #[tracing::instrument(skip(self))]
    async fn insert_entity(&self, entity: &Entity) -> AuthzResult<u64> {
        let result = sqlx::query("INSERT INTO entities (name, kind) VALUES ($1, $2)")
            .bind(&entity.identifier)
            .bind(entity.kind.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    AuthzError::EntityAlreadyExists(entity.clone())
                }
                other => AuthzError::Database(other),
            })?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self))]
    async fn snapshot(&self) -> AuthzResult<PgSnapshot> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        Ok(PgSnapshot { tx: Mutex::new(tx) })
    }
}

/// Read view over one `REPEATABLE READ` transaction.
///
/// Holds a pooled connection until dropped.
pub struct PgSnapshot {
    tx: Mutex<Transaction<'static, Postgres>>,
}

#[async_trait]
impl MembershipReader for PgSnapshot {
    #[tracing::instrument(skip(self))]
    async fn direct_group_identifiers(&self, entity: &Entity) -> AuthzResult<HashSet<String>> {
        // One row per membership, or a single NULL row for an entity with
        // none; no rows at all means the entity does not exist.
        let mut tx = self.tx.lock().await;
        let rows: Vec<(Option<String>,)> = sqlx::query_as(
            r"
            SELECT g.name
            FROM entities e
            LEFT JOIN group_members m ON m.member_entity_id = e.entity_id
            LEFT JOIN entities g ON g.entity_id = m.group_entity_id
            WHERE e.name = $1 AND e.kind = $2
            ",
        )
        .bind(&entity.identifier)
        .bind(entity.kind.as_str())
        .fetch_all(&mut **tx)
        .await?;

        if rows.is_empty() {
            return Err(AuthzError::UnknownEntity(entity.clone()));
        }

        Ok(rows.into_iter().filter_map(|(name,)| name).collect())
    }

    #[tracing::instrument(skip(self, groups), fields(groups = groups.len()))]
    async fn parent_group_identifiers(&self, groups: &[String]) -> AuthzResult<HashSet<String>> {
        if groups.is_empty() {
            return Ok(HashSet::new());
        }

        let mut tx = self.tx.lock().await;
        let rows: Vec<(String,)> = sqlx::query_as(
            r"
            SELECT DISTINCT parent.name
            FROM entities child
            INNER JOIN group_members m ON m.member_entity_id = child.entity_id
            INNER JOIN entities parent ON parent.entity_id = m.group_entity_id
            WHERE child.kind = 'USER_GROUP'
              AND child.name = ANY($1)
            ",
        )
        .bind(groups)
        .fetch_all(&mut **tx)
        .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    #[tracing::instrument(skip(self, effective_groups))]
    async fn object_permission(
        &self,
        entity: &Entity,
        object_kind: ObjectKind,
        permissions: ObjectPermissionTypes,
        object_identifier: &str,
        effective_groups: Option<&HashSet<String>>,
    ) -> AuthzResult<Option<ObjectPermission>> {
        let mut tx = self.tx.lock().await;
        let subject_id = entity_id(&mut tx, entity).await?;

        let row: Option<ObjectPermissionRow> = sqlx::query_as(
            r"
            SELECT
                e.name AS grantee_name,
                e.kind AS grantee_kind,
                p.object_kind,
                p.permission,
                p.object_identifier
            FROM object_permissions p
            INNER JOIN entities e ON e.entity_id = p.entity_id
            WHERE p.object_kind = $2
              AND p.permission = ANY($3)
              AND p.object_identifier = $4
              AND (p.entity_id = $1 OR (e.kind = 'USER_GROUP' AND e.name = ANY($5)))
            ORDER BY (p.entity_id = $1) DESC, e.name ASC, p.permission ASC
            LIMIT 1
            ",
        )
        .bind(subject_id)
        .bind(object_kind.as_str())
        .bind(permission_param(permissions))
        .bind(object_identifier)
        .bind(group_param(effective_groups))
        .fetch_optional(&mut **tx)
        .await?;

        row.map(ObjectPermission::try_from).transpose()
    }

    #[tracing::instrument(
        skip(self, effective_groups, identifiers),
        fields(candidates = identifiers.len())
    )]
    async fn accessible_identifiers(
        &self,
        entity: &Entity,
        object_kind: ObjectKind,
        effective_groups: Option<&HashSet<String>>,
        permissions: ObjectPermissionTypes,
        identifiers: &[String],
    ) -> AuthzResult<HashSet<String>> {
        let mut tx = self.tx.lock().await;
        let subject_id = entity_id(&mut tx, entity).await?;

        let rows: Vec<(String,)> = sqlx::query_as(
            r"
            SELECT DISTINCT p.object_identifier
            FROM object_permissions p
            INNER JOIN entities e ON e.entity_id = p.entity_id
            WHERE p.object_kind = $2
              AND p.permission = ANY($3)
              AND p.object_identifier = ANY($4)
              AND (p.entity_id = $1 OR (e.kind = 'USER_GROUP' AND e.name = ANY($5)))
            ",
        )
        .bind(subject_id)
        .bind(object_kind.as_str())
        .bind(permission_param(permissions))
        .bind(identifiers)
        .bind(group_param(effective_groups))
        .fetch_all(&mut **tx)
        .await?;

        Ok(rows.into_iter().map(|(identifier,)| identifier).collect())
    }

    #[tracing::instrument(skip(self, effective_groups))]
    async fn object_permissions(
        &self,
        entity: &Entity,
        effective_groups: Option<&HashSet<String>>,
    ) -> AuthzResult<Vec<ObjectPermission>> {
        let mut tx = self.tx.lock().await;
        let subject_id = entity_id(&mut tx, entity).await?;

        let rows: Vec<ObjectPermissionRow> = sqlx::query_as(
            r"
            SELECT
                e.name AS grantee_name,
                e.kind AS grantee_kind,
                p.object_kind,
                p.permission,
                p.object_identifier
            FROM object_permissions p
            INNER JOIN entities e ON e.entity_id = p.entity_id
            WHERE p.entity_id = $1 OR (e.kind = 'USER_GROUP' AND e.name = ANY($2))
            ORDER BY e.name, e.kind, p.object_kind, p.permission, p.object_identifier
            ",
        )
        .bind(subject_id)
        .bind(group_param(effective_groups))
        .fetch_all(&mut **tx)
        .await?;

        rows.into_iter().map(ObjectPermission::try_from).collect()
    }

    #[tracing::instrument(skip(self, effective_groups))]
    async fn system_permission(
        &self,
        entity: &Entity,
        permission: SystemPermissionType,
        effective_groups: Option<&HashSet<String>>,
    ) -> AuthzResult<bool> {
        let mut tx = self.tx.lock().await;
        let subject_id = entity_id(&mut tx, entity).await?;

        let (granted,): (bool,) = sqlx::query_as(
            r"
            SELECT EXISTS(
                SELECT 1
                FROM system_permissions p
                INNER JOIN entities e ON e.entity_id = p.entity_id
                WHERE p.permission = $2
                  AND (p.entity_id = $1 OR (e.kind = 'USER_GROUP' AND e.name = ANY($3)))
            )
            ",
        )
        .bind(subject_id)
        .bind(permission.as_str())
        .bind(group_param(effective_groups))
        .fetch_one(&mut **tx)
        .await?;

        Ok(granted)
    }
}
