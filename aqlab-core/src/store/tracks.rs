//! Track CRUD (spec.md §3 "Track"). A Track is one-to-one with a Media
//! File, created when the Probe first succeeds and updated on re-probe.

use super::{Store, Track, TrackTags};
use aqlab_common::{Error, Result};
use sqlx::Row;
use uuid::Uuid;

pub(super) fn row_to_track(row: &sqlx::sqlite::SqliteRow) -> Result<Track> {
    let id: String = row.get("id");
    let media_file_id: String = row.get("media_file_id");

    Ok(Track {
        id: Uuid::parse_str(&id).map_err(|e| Error::ParseFailure(e.to_string()))?,
        media_file_id: Uuid::parse_str(&media_file_id)
            .map_err(|e| Error::ParseFailure(e.to_string()))?,
        duration_secs: row.get("duration_secs"),
        codec: row.get("codec"),
        sample_rate_hz: row.get("sample_rate_hz"),
        bit_depth: row.get("bit_depth"),
        channels: row.get("channels"),
        bitrate: row.get("bitrate"),
        tags: TrackTags {
            title: row.get("title"),
            artist: row.get("artist"),
            album: row.get("album"),
            album_artist: row.get("album_artist"),
            track_number: row.get("track_number"),
            disc_number: row.get("disc_number"),
            year: row.get("year"),
            genre: row.get("genre"),
        },
        has_artwork: row.get::<i64, _>("has_artwork") != 0,
        artwork_width: row.get("artwork_width"),
        artwork_height: row.get("artwork_height"),
    })
}

/// Fields a Probe (or re-probe) derives for a Track. Kept distinct from the
/// stored [`Track`] type so callers don't have to fabricate an id.
#[derive(Debug, Clone)]
pub struct TrackFields {
    pub duration_secs: f64,
    pub codec: String,
    pub sample_rate_hz: i64,
    pub bit_depth: i64,
    pub channels: i64,
    pub bitrate: Option<i64>,
    pub tags: TrackTags,
    pub has_artwork: bool,
}

impl Store {
    pub async fn upsert_track(&self, media_file_id: Uuid, fields: &TrackFields) -> Result<Track> {
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT id FROM tracks WHERE media_file_id = ?")
                .bind(media_file_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        let id = match existing {
            Some((id,)) => Uuid::parse_str(&id).map_err(|e| Error::ParseFailure(e.to_string()))?,
            None => Uuid::new_v4(),
        };

        sqlx::query(
            r#"
            INSERT INTO tracks (
                id, media_file_id, duration_secs, codec, sample_rate_hz, bit_depth, channels,
                bitrate, title, artist, album, album_artist, track_number, disc_number, year,
                genre, has_artwork
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(media_file_id) DO UPDATE SET
                duration_secs = excluded.duration_secs,
                codec = excluded.codec,
                sample_rate_hz = excluded.sample_rate_hz,
                bit_depth = excluded.bit_depth,
                channels = excluded.channels,
                bitrate = excluded.bitrate,
                title = excluded.title,
                artist = excluded.artist,
                album = excluded.album,
                album_artist = excluded.album_artist,
                track_number = excluded.track_number,
                disc_number = excluded.disc_number,
                year = excluded.year,
                genre = excluded.genre,
                has_artwork = excluded.has_artwork
            "#,
        )
        .bind(id.to_string())
        .bind(media_file_id.to_string())
        .bind(fields.duration_secs)
        .bind(&fields.codec)
        .bind(fields.sample_rate_hz)
        .bind(fields.bit_depth)
        .bind(fields.channels)
        .bind(fields.bitrate)
        .bind(&fields.tags.title)
        .bind(&fields.tags.artist)
        .bind(&fields.tags.album)
        .bind(&fields.tags.album_artist)
        .bind(fields.tags.track_number)
        .bind(fields.tags.disc_number)
        .bind(fields.tags.year)
        .bind(&fields.tags.genre)
        .bind(fields.has_artwork as i64)
        .execute(&self.pool)
        .await?;

        self.get_track(id).await
    }

    pub async fn get_track(&self, id: Uuid) -> Result<Track> {
        let row = sqlx::query("SELECT * FROM tracks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found(format!("track {id}")))?;
        row_to_track(&row)
    }

    pub async fn get_track_by_media_file(&self, media_file_id: Uuid) -> Result<Track> {
        let row = sqlx::query("SELECT * FROM tracks WHERE media_file_id = ?")
            .bind(media_file_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found(format!("track for media file {media_file_id}")))?;
        row_to_track(&row)
    }

    /// Update the artwork presence flag and dimensions for a track
    /// (spec.md §4.1 `update_track_artwork_status`).
    pub async fn update_track_artwork_status(
        &self,
        track_id: Uuid,
        has_artwork: bool,
        width: Option<i64>,
        height: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE tracks SET has_artwork = ?, artwork_width = ?, artwork_height = ? WHERE id = ?",
        )
        .bind(has_artwork as i64)
        .bind(width)
        .bind(height)
        .bind(track_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Apply a tag-field update (used by the Metadata writer after a
    /// successful atomic write, spec.md §4.7).
    pub async fn update_track_tags(&self, track_id: Uuid, tags: &TrackTags) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tracks SET
                title = ?, artist = ?, album = ?, album_artist = ?,
                track_number = ?, disc_number = ?, year = ?, genre = ?
            WHERE id = ?
            "#,
        )
        .bind(&tags.title)
        .bind(&tags.artist)
        .bind(&tags.album)
        .bind(&tags.album_artist)
        .bind(tags.track_number)
        .bind(tags.disc_number)
        .bind(tags.year)
        .bind(&tags.genre)
        .bind(track_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn seed_media_file(store: &Store) -> Uuid {
        let lib = store
            .create_library("Main", "/music", "15m", true, None, None)
            .await
            .unwrap();
        store
            .upsert_new_media_file(lib.id, "/music/a.flac", 1000, Utc::now())
            .await
            .unwrap()
            .id
    }

    fn sample_fields() -> TrackFields {
        TrackFields {
            duration_secs: 245.3,
            codec: "flac".into(),
            sample_rate_hz: 44100,
            bit_depth: 16,
            channels: 2,
            bitrate: Some(900_000),
            tags: TrackTags {
                title: Some("Old".into()),
                ..Default::default()
            },
            has_artwork: false,
        }
    }

    #[tokio::test]
    async fn create_and_reprobe_updates_in_place() {
        let store = Store::connect_in_memory().await.unwrap();
        let media_file_id = seed_media_file(&store).await;

        let track = store.upsert_track(media_file_id, &sample_fields()).await.unwrap();
        assert_eq!(track.tags.title.as_deref(), Some("Old"));

        let mut fields = sample_fields();
        fields.tags.title = Some("New".into());
        let updated = store.upsert_track(media_file_id, &fields).await.unwrap();

        assert_eq!(updated.id, track.id, "re-probe updates the same track row");
        assert_eq!(updated.tags.title.as_deref(), Some("New"));
    }

    #[tokio::test]
    async fn artwork_status_roundtrip() {
        let store = Store::connect_in_memory().await.unwrap();
        let media_file_id = seed_media_file(&store).await;
        let track = store.upsert_track(media_file_id, &sample_fields()).await.unwrap();

        store
            .update_track_artwork_status(track.id, true, Some(600), Some(600))
            .await
            .unwrap();

        let refreshed = store.get_track(track.id).await.unwrap();
        assert!(refreshed.has_artwork);
        assert_eq!(refreshed.artwork_width, Some(600));
    }
}
