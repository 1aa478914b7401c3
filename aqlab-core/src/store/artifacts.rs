//! Artifact CRUD (spec.md §3 "Artifact"). Created by the Analysis pipeline
//! or Metadata writer; lifetime bound to the owning track.

use super::{Artifact, ArtifactKind, Store};
use aqlab_common::{Error, Result};
use sqlx::Row;
use uuid::Uuid;

fn row_to_artifact(row: &sqlx::sqlite::SqliteRow) -> Result<Artifact> {
    let id: String = row.get("id");
    let track_id: String = row.get("track_id");
    let kind: String = row.get("kind");

    Ok(Artifact {
        id: Uuid::parse_str(&id).map_err(|e| Error::ParseFailure(e.to_string()))?,
        track_id: Uuid::parse_str(&track_id).map_err(|e| Error::ParseFailure(e.to_string()))?,
        kind: ArtifactKind::parse(&kind)
            .ok_or_else(|| Error::ParseFailure(format!("unknown artifact kind: {kind}")))?,
        relative_path: row.get("relative_path"),
        mime_type: row.get("mime_type"),
        width: row.get("width"),
        height: row.get("height"),
    })
}

impl Store {
    pub async fn create_artifact(
        &self,
        track_id: Uuid,
        kind: ArtifactKind,
        relative_path: &str,
        mime_type: &str,
        width: Option<i64>,
        height: Option<i64>,
    ) -> Result<Artifact> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO artifacts (id, track_id, kind, relative_path, mime_type, width, height)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(track_id.to_string())
        .bind(kind.as_str())
        .bind(relative_path)
        .bind(mime_type)
        .bind(width)
        .bind(height)
        .execute(&self.pool)
        .await?;

        self.get_artifact(id).await
    }

    pub async fn get_artifact(&self, id: Uuid) -> Result<Artifact> {
        let row = sqlx::query("SELECT * FROM artifacts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found(format!("artifact {id}")))?;
        row_to_artifact(&row)
    }

    pub async fn list_artifacts_for_track(&self, track_id: Uuid) -> Result<Vec<Artifact>> {
        let rows = sqlx::query("SELECT * FROM artifacts WHERE track_id = ?")
            .bind(track_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_artifact).collect()
    }

    pub async fn find_artifact(
        &self,
        track_id: Uuid,
        kind: ArtifactKind,
    ) -> Result<Option<Artifact>> {
        let row = sqlx::query("SELECT * FROM artifacts WHERE track_id = ? AND kind = ?")
            .bind(track_id.to_string())
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_artifact).transpose()
    }

    /// True iff at least one `artwork` Artifact exists for the track
    /// (spec.md §3 invariant for `has_artwork`).
    pub async fn track_has_artwork_artifact(&self, track_id: Uuid) -> Result<bool> {
        Ok(self
            .find_artifact(track_id, ArtifactKind::Artwork)
            .await?
            .is_some())
    }
}
