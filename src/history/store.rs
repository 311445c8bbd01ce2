//! SQLite-backed grab history.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::sqlite::SqliteExecutor;
use sqlx::{FromRow, Row};
use tracing::{debug, instrument};

use super::{
    DOWNLOAD_CLIENT, HistoryError, HistoryEventType, HistoryLookup, HistoryRecord, INDEXER,
    RELEASE_SOURCE, ReleaseSource, Result,
};
use crate::db::Database;
use crate::quality::{Quality, QualityModel, Revision};
use crate::release::Candidate;
use crate::tracking::DownloadFailedEvent;

/// Insert payload for one history row.
#[derive(Debug, Clone)]
pub struct NewHistoryRecord<'a> {
    pub artist_id: i64,
    pub album_id: i64,
    pub source_title: &'a str,
    pub quality: &'a QualityModel,
    pub event_type: HistoryEventType,
    pub download_id: Option<&'a str>,
    pub data: &'a HashMap<String, String>,
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    id: i64,
    artist_id: i64,
    album_id: i64,
    source_title: String,
    quality_id: i32,
    quality_name: String,
    revision_version: i32,
    revision_real: i32,
    revision_is_repack: bool,
    event_type: String,
    download_id: Option<String>,
    data: String,
    date: String,
}

impl TryFrom<HistoryRow> for HistoryRecord {
    type Error = HistoryError;

    fn try_from(row: HistoryRow) -> Result<Self> {
        let event_type = row
            .event_type
            .parse::<HistoryEventType>()
            .map_err(|reason| HistoryError::invalid_record(row.id, reason))?;
        let data: HashMap<String, String> = serde_json::from_str(&row.data)
            .map_err(|err| HistoryError::invalid_record(row.id, format!("bad data: {err}")))?;

        Ok(Self {
            id: row.id,
            artist_id: row.artist_id,
            album_id: row.album_id,
            source_title: row.source_title,
            quality: QualityModel::with_revision(
                Quality::new(row.quality_id, row.quality_name),
                Revision {
                    version: row.revision_version,
                    real: row.revision_real,
                    is_repack: row.revision_is_repack,
                },
            ),
            event_type,
            download_id: row.download_id,
            data,
            date: row.date,
        })
    }
}

#[instrument(skip(executor, record), fields(album_id = record.album_id, event_type = %record.event_type))]
async fn insert<'e>(
    executor: impl SqliteExecutor<'e>,
    record: &NewHistoryRecord<'_>,
) -> Result<i64> {
    let data = serde_json::to_string(record.data)
        .map_err(|err| HistoryError::invalid_record(0, format!("bad data: {err}")))?;

    let row = sqlx::query(
        r"INSERT INTO history (
            artist_id,
            album_id,
            source_title,
            quality_id,
            quality_name,
            revision_version,
            revision_real,
            revision_is_repack,
            event_type,
            download_id,
            data
          )
          VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
          RETURNING id",
    )
    .bind(record.artist_id)
    .bind(record.album_id)
    .bind(record.source_title)
    .bind(record.quality.quality.id)
    .bind(&record.quality.quality.name)
    .bind(record.quality.revision.version)
    .bind(record.quality.revision.real)
    .bind(record.quality.revision.is_repack)
    .bind(record.event_type.as_str())
    .bind(record.download_id)
    .bind(data)
    .fetch_one(executor)
    .await?;

    Ok(row.get("id"))
}

/// Grab history stored in the `history` table.
#[derive(Debug, Clone)]
pub struct SqliteHistory {
    db: Database,
}

impl SqliteHistory {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts one history row and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Database`] if the insert fails.
    pub async fn record(&self, record: &NewHistoryRecord<'_>) -> Result<i64> {
        insert(self.db.pool(), record).await
    }

    /// Inserts all rows in one transaction; either every row lands or none.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Database`] if any insert or the commit fails.
    pub async fn record_all(&self, records: &[NewHistoryRecord<'_>]) -> Result<Vec<i64>> {
        let mut tx = self.db.pool().begin().await?;
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            ids.push(insert(&mut *tx, record).await?);
        }
        tx.commit().await?;
        Ok(ids)
    }

    /// Records a grab of `candidate`, one row per album.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Database`] if any insert fails; no row is kept.
    #[instrument(skip(self, candidate), fields(release = %candidate.release.title))]
    pub async fn record_grab(
        &self,
        candidate: &Candidate,
        download_id: &str,
        download_client: &str,
        source: ReleaseSource,
    ) -> Result<Vec<i64>> {
        let data = HashMap::from([
            (DOWNLOAD_CLIENT.to_string(), download_client.to_string()),
            (RELEASE_SOURCE.to_string(), source.as_str().to_string()),
            (INDEXER.to_string(), candidate.release.indexer.clone()),
        ]);

        let records: Vec<NewHistoryRecord<'_>> = candidate
            .album_ids
            .iter()
            .map(|album_id| NewHistoryRecord {
                artist_id: candidate.artist_id,
                album_id: *album_id,
                source_title: &candidate.release.title,
                quality: &candidate.quality,
                event_type: HistoryEventType::Grabbed,
                download_id: Some(download_id),
                data: &data,
            })
            .collect();
        let ids = self.record_all(&records).await?;
        debug!(rows = ids.len(), download_id, "recorded grab");
        Ok(ids)
    }

    /// Records a published failure, one `download_failed` row per album.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Database`] if any insert fails; no row is kept.
    #[instrument(skip(self, event), fields(download_id = ?event.download_id))]
    pub async fn record_failure(&self, event: &DownloadFailedEvent) -> Result<Vec<i64>> {
        let mut data = event.data.clone();
        data.insert("message".to_string(), event.message.clone());

        let records: Vec<NewHistoryRecord<'_>> = event
            .album_ids
            .iter()
            .map(|album_id| NewHistoryRecord {
                artist_id: event.artist_id,
                album_id: *album_id,
                source_title: &event.source_title,
                quality: &event.quality,
                event_type: HistoryEventType::DownloadFailed,
                download_id: event.download_id.as_deref(),
                data: &data,
            })
            .collect();
        self.record_all(&records).await
    }

    /// Returns records for a download id and event type, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Database`] if the query fails, or
    /// [`HistoryError::InvalidRecord`] if a stored row cannot be decoded.
    #[instrument(skip(self))]
    pub async fn find(
        &self,
        download_id: &str,
        event_type: HistoryEventType,
    ) -> Result<Vec<HistoryRecord>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r"SELECT * FROM history
              WHERE download_id = ? AND event_type = ?
              ORDER BY date DESC, id DESC",
        )
        .bind(download_id)
        .bind(event_type.as_str())
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter().map(HistoryRecord::try_from).collect()
    }
}

#[async_trait]
impl HistoryLookup for SqliteHistory {
    #[instrument(skip(self))]
    async fn get(&self, id: i64) -> Result<HistoryRecord> {
        let row = sqlx::query_as::<_, HistoryRow>("SELECT * FROM history WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        row.ok_or(HistoryError::RecordNotFound(id))?.try_into()
    }

    async fn find_grabbed(&self, download_id: &str) -> Result<Vec<HistoryRecord>> {
        self.find(download_id, HistoryEventType::Grabbed).await
    }
}
