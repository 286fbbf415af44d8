//! Project records, reconciled from the vault's project directories.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::error::StoreResult;
use crate::models::Project;

#[derive(Clone)]
pub struct ProjectStore {
    pool: SqlitePool,
}

impl ProjectStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, project: &Project) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        self.upsert_tx(&mut tx, project).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_tx(&self, conn: &mut SqliteConnection, project: &Project) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO project (alias, name, description, created_at, updated_at, deleted_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(alias) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&project.alias)
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.created_at)
        .bind(project.updated_at)
        .bind(project.deleted_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn get(&self, alias: &str, include_deleted: bool) -> StoreResult<Option<Project>> {
        let row = sqlx::query(
            "SELECT alias, name, description, created_at, updated_at, deleted_at FROM project \
             WHERE alias = ? AND (? OR deleted_at IS NULL)",
        )
        .bind(alias)
        .bind(include_deleted)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(project_from_row).transpose()?)
    }

    pub async fn list(&self, include_deleted: bool) -> StoreResult<Vec<Project>> {
        let rows = sqlx::query(
            "SELECT alias, name, description, created_at, updated_at, deleted_at FROM project \
             WHERE (? OR deleted_at IS NULL) ORDER BY alias",
        )
        .bind(include_deleted)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(project_from_row).collect::<sqlx::Result<_>>()?)
    }

    /// Live document count per project alias, from the `project_doc_counts` view.
    pub async fn doc_counts(&self) -> StoreResult<Vec<(String, i64)>> {
        let rows = sqlx::query("SELECT project, doc_count FROM project_doc_counts ORDER BY project")
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push((row.try_get("project")?, row.try_get("doc_count")?));
        }
        Ok(out)
    }

    pub async fn soft_delete(&self, alias: &str) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE project SET deleted_at = ? WHERE alias = ? AND deleted_at IS NULL")
            .bind(super::now_ts())
            .bind(alias)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn project_from_row(row: &SqliteRow) -> sqlx::Result<Project> {
    Ok(Project {
        alias: row.try_get("alias")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{pool, record};
    use crate::store::DocStore;

    fn project(alias: &str, name: &str) -> Project {
        Project {
            alias: alias.to_string(),
            name: name.to_string(),
            description: None,
            created_at: 1,
            updated_at: 1,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn upsert_keeps_created_at() {
        let (_tmp, pool) = pool().await;
        let store = ProjectStore::new(pool);
        store.upsert(&project("proj", "Proj")).await.unwrap();
        let mut renamed = project("proj", "Renamed");
        renamed.created_at = 99;
        renamed.updated_at = 5;
        store.upsert(&renamed).await.unwrap();

        let got = store.get("proj", false).await.unwrap().unwrap();
        assert_eq!(got.name, "Renamed");
        assert_eq!(got.created_at, 1);
        assert_eq!(got.updated_at, 5);

        assert!(store.soft_delete("proj").await.unwrap());
        assert!(store.list(false).await.unwrap().is_empty());
        assert_eq!(store.list(true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn doc_counts_per_project() {
        let (_tmp, pool) = pool().await;
        let docs = DocStore::new(pool.clone());
        let store = ProjectStore::new(pool);
        docs.upsert(&record("projects/@proj/a.json")).await.unwrap();
        docs.upsert(&record("projects/@proj/b.json")).await.unwrap();
        docs.soft_delete("projects/@proj/b.json").await.unwrap();

        assert_eq!(store.doc_counts().await.unwrap(), vec![("proj".to_string(), 1)]);
    }
}
