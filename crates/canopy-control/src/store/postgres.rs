//! PostgreSQL state store implementation.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use crate::error::{ControlError, ControlResult};
use crate::types::{Deployment, DeploymentId, DeploymentStatus, Project, ProjectId};

use super::DeploymentStore;

/// PostgreSQL-backed deployment store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL and create a new store.
    ///
    /// The required tables are created if they don't exist.
    pub async fn new(url: &str, max_connections: u32) -> ControlResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create a store from an existing connection pool.
    pub async fn from_pool(pool: PgPool) -> ControlResult<Self> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> ControlResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                repo_url TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS deployments (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL REFERENCES projects(id),
                subdomain TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_deployments_project
            ON deployments (project_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_deployment(row: &sqlx::postgres::PgRow) -> ControlResult<Deployment> {
        let id: String = row.get("id");
        let project_id: String = row.get("project_id");
        let subdomain: String = row.get("subdomain");
        let status_str: String = row.get("status");
        let created_at: chrono::DateTime<chrono::Utc> = row.get("created_at");
        let updated_at: chrono::DateTime<chrono::Utc> = row.get("updated_at");

        let status: DeploymentStatus = status_str.parse().map_err(|e| {
            ControlError::Serialisation(format!("failed to parse status '{status_str}': {e}"))
        })?;

        Ok(Deployment {
            id: DeploymentId::new(id),
            project_id: ProjectId::new(project_id),
            subdomain,
            status,
            created_at,
            updated_at,
        })
    }

    fn row_to_project(row: &sqlx::postgres::PgRow) -> Project {
        Project {
            id: ProjectId::new(row.get::<String, _>("id")),
            name: row.get("name"),
            repo_url: row.get("repo_url"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl DeploymentStore for PostgresStore {
    async fn insert_project(&self, project: &Project) -> ControlResult<()> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, name, repo_url, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(project.id.as_str())
        .bind(&project.name)
        .bind(&project.repo_url)
        .bind(project.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_project(&self, id: &ProjectId) -> ControlResult<Option<Project>> {
        let row = sqlx::query("SELECT id, name, repo_url, created_at FROM projects WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(Self::row_to_project))
    }

    async fn insert(&self, deployment: &Deployment) -> ControlResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO deployments (id, project_id, subdomain, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(deployment.id.as_str())
        .bind(deployment.project_id.as_str())
        .bind(&deployment.subdomain)
        .bind(deployment.status.as_str())
        .bind(deployment.created_at)
        .bind(deployment.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(ControlError::SubdomainTaken(deployment.subdomain.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: &DeploymentId) -> ControlResult<Option<Deployment>> {
        let row = sqlx::query(
            r#"
            SELECT id, project_id, subdomain, status, created_at, updated_at
            FROM deployments WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_deployment).transpose()
    }

    async fn get_by_subdomain(&self, subdomain: &str) -> ControlResult<Option<Deployment>> {
        let row = sqlx::query(
            r#"
            SELECT id, project_id, subdomain, status, created_at, updated_at
            FROM deployments WHERE subdomain = $1
            "#,
        )
        .bind(subdomain)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_deployment).transpose()
    }

    async fn advance_status(
        &self,
        id: &DeploymentId,
        new_status: DeploymentStatus,
    ) -> ControlResult<bool> {
        // Single conditional UPDATE so that concurrent consumers rely on
        // the database's atomicity, not in-process locking. The CASE mirrors
        // DeploymentStatus::rank().
        let result = sqlx::query(
            r#"
            UPDATE deployments
            SET status = $2, updated_at = NOW()
            WHERE id = $1
              AND status NOT IN ('LIVE', 'FAILED')
              AND (CASE status
                     WHEN 'NOT_STARTED' THEN 0
                     WHEN 'QUEUED' THEN 0
                     WHEN 'BUILDING' THEN 1
                     ELSE 2
                   END) < $3
            "#,
        )
        .bind(id.as_str())
        .bind(new_status.as_str())
        .bind(i16::from(new_status.rank()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore").finish_non_exhaustive()
    }
}
