use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{CuratorError, CuratorResult};
use crate::models::deletion_event::DeletionEvent;
use crate::models::deletion_rule::{Candidate, DeletionRule, ShowAggregate};
use crate::models::integration::Integration;
use crate::models::job::JobSchedule;
use crate::models::media_item::{MediaItem, MediaItemPatch, UpsertOutcome};
use crate::models::server::Server;
use crate::models::sync_event::SyncEvent;
use crate::models::webhook_event::WebhookEvent;

use super::migrations;

/// The single source of truth for catalog + engagement + quality, and the
/// query plane for scoring (spec.md §4.1). A single mutex-guarded
/// connection, the same concurrency model the teacher's `ConfigDb` uses —
/// sqlite under WAL serializes writers anyway.
pub struct MirrorStore {
    conn: Mutex<Connection>,
}

fn now_str() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

impl MirrorStore {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ── MediaItem ──

    /// Deterministic merge upsert. Quality and hierarchy fields always
    /// overwrite; engagement fields are whatever the caller put in the
    /// patch (HistorySync applies its own merge policy before calling
    /// this — the store itself just writes what it's given).
    pub fn upsert_media_item(
        &self,
        owner_id: &str,
        server_id: &str,
        external_id: &str,
        patch: &MediaItemPatch,
    ) -> CuratorResult<UpsertOutcome> {
        let conn = self.conn.lock().unwrap();
        Self::upsert_media_item_locked(&conn, owner_id, server_id, external_id, patch)
    }

    fn upsert_media_item_locked(
        conn: &Connection,
        owner_id: &str,
        server_id: &str,
        external_id: &str,
        patch: &MediaItemPatch,
    ) -> CuratorResult<UpsertOutcome> {
        if let Some(kind) = patch.kind.as_deref() {
            if kind == "episode" && !patch.has_episode_hierarchy() {
                return Err(CuratorError::Integrity(format!(
                    "episode '{}' missing grandparent_title/season_number/episode_number",
                    patch.title.as_deref().unwrap_or(external_id)
                )));
            }
        }

        let existing_id: Option<String> = conn
            .query_row(
                "SELECT id FROM media_items WHERE server_id = ?1 AND external_id = ?2",
                params![server_id, external_id],
                |r| r.get(0),
            )
            .optional()?;

        let now = now_str();

        if let Some(id) = existing_id {
            conn.execute(
                "UPDATE media_items SET
                    kind = COALESCE(?33, kind),
                    title = COALESCE(?2, title),
                    year = COALESCE(?3, year),
                    runtime_minutes = COALESCE(?4, runtime_minutes),
                    tmdb_id = COALESCE(?5, tmdb_id),
                    tvdb_id = COALESCE(?6, tvdb_id),
                    imdb_id = COALESCE(?7, imdb_id),
                    tdl_series_id = COALESCE(?8, tdl_series_id),
                    mdl_movie_id = COALESCE(?9, mdl_movie_id),
                    library_section = COALESCE(?10, library_section),
                    genres = COALESCE(?11, genres),
                    collections = COALESCE(?12, collections),
                    rating = COALESCE(?13, rating),
                    grandparent_title = COALESCE(?14, grandparent_title),
                    parent_title = COALESCE(?15, parent_title),
                    season_number = COALESCE(?16, season_number),
                    episode_number = COALESCE(?17, episode_number),
                    video_resolution = ?18,
                    video_codec = ?19,
                    audio_codec = ?20,
                    container = ?21,
                    bitrate_kbps = ?22,
                    file_path = COALESCE(?23, file_path),
                    file_size_bytes = COALESCE(?24, file_size_bytes),
                    accessible = COALESCE(?25, accessible),
                    total_play_count = COALESCE(?26, total_play_count),
                    complete_play_count = COALESCE(?27, complete_play_count),
                    partial_play_count = COALESCE(?28, partial_play_count),
                    avg_percent_complete = COALESCE(?29, avg_percent_complete),
                    last_watched_at = COALESCE(?30, last_watched_at),
                    total_watch_time_seconds = COALESCE(?31, total_watch_time_seconds),
                    updated_at = ?32,
                    history_synced_at = COALESCE(?34, history_synced_at)
                 WHERE id = ?1",
                params![
                    id,
                    patch.title,
                    patch.year,
                    patch.runtime_minutes,
                    patch.tmdb_id,
                    patch.tvdb_id,
                    patch.imdb_id,
                    patch.tdl_series_id,
                    patch.mdl_movie_id,
                    patch.library_section,
                    patch.genres,
                    patch.collections,
                    patch.rating,
                    patch.grandparent_title,
                    patch.parent_title,
                    patch.season_number,
                    patch.episode_number,
                    patch.video_resolution,
                    patch.video_codec,
                    patch.audio_codec,
                    patch.container,
                    patch.bitrate_kbps,
                    patch.file_path,
                    patch.file_size_bytes,
                    patch.accessible,
                    patch.total_play_count,
                    patch.complete_play_count,
                    patch.partial_play_count,
                    patch.avg_percent_complete,
                    patch.last_watched_at,
                    patch.total_watch_time_seconds,
                    now,
                    patch.kind,
                    patch.history_synced_at,
                ],
            )?;
            Ok(UpsertOutcome::Updated)
        } else {
            let kind = patch
                .kind
                .as_deref()
                .ok_or_else(|| CuratorError::Validation("new media item missing kind".into()))?;
            let id = uuid::Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO media_items (
                    id, owner_id, server_id, external_id, kind, title, year, runtime_minutes,
                    tmdb_id, tvdb_id, imdb_id, tdl_series_id, mdl_movie_id,
                    library_section, genres, collections, rating,
                    grandparent_title, parent_title, season_number, episode_number,
                    video_resolution, video_codec, audio_codec, container, bitrate_kbps,
                    file_path, file_size_bytes, accessible,
                    total_play_count, complete_play_count, partial_play_count,
                    avg_percent_complete, last_watched_at, total_watch_time_seconds,
                    history_synced_at, added_at, updated_at
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
                    ?9, ?10, ?11, ?12, ?13,
                    ?14, ?15, ?16, ?17,
                    ?18, ?19, ?20, ?21,
                    ?22, ?23, ?24, ?25, ?26,
                    ?27, ?28, ?29,
                    ?30, ?31, ?32,
                    ?33, ?34, ?35,
                    ?37, ?36, ?36
                )",
                params![
                    id,
                    owner_id,
                    server_id,
                    external_id,
                    kind,
                    patch.title.clone().unwrap_or_default(),
                    patch.year,
                    patch.runtime_minutes,
                    patch.tmdb_id,
                    patch.tvdb_id,
                    patch.imdb_id,
                    patch.tdl_series_id,
                    patch.mdl_movie_id,
                    patch.library_section,
                    patch.genres.clone().unwrap_or_else(|| "[]".into()),
                    patch.collections.clone().unwrap_or_else(|| "[]".into()),
                    patch.rating,
                    patch.grandparent_title,
                    patch.parent_title,
                    patch.season_number,
                    patch.episode_number,
                    patch.video_resolution,
                    patch.video_codec,
                    patch.audio_codec,
                    patch.container,
                    patch.bitrate_kbps,
                    patch.file_path,
                    patch.file_size_bytes.unwrap_or(0),
                    patch.accessible.unwrap_or(true),
                    patch.total_play_count.unwrap_or(0),
                    patch.complete_play_count.unwrap_or(0),
                    patch.partial_play_count.unwrap_or(0),
                    patch.avg_percent_complete,
                    patch.last_watched_at,
                    patch.total_watch_time_seconds.unwrap_or(0),
                    now,
                    patch.history_synced_at,
                ],
            )?;
            Ok(UpsertOutcome::Inserted)
        }
    }

    /// Transactional batch upsert, chunked at `chunk_size` rows (500 per
    /// spec.md §4.1). A failed chunk is retried once with a 1s/4s backoff
    /// (performed by the caller, which owns the async runtime); this method
    /// runs one chunk synchronously and returns per-item failures instead of
    /// aborting the whole batch, so IntegrityError rows don't block siblings.
    pub fn batch_upsert_chunk(
        &self,
        owner_id: &str,
        server_id: &str,
        patches: &[(String, MediaItemPatch)],
    ) -> CuratorResult<BatchOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut outcome = BatchOutcome::default();
        for (external_id, patch) in patches {
            match Self::upsert_media_item_locked(&tx, owner_id, server_id, external_id, patch) {
                Ok(UpsertOutcome::Inserted) => outcome.created += 1,
                Ok(UpsertOutcome::Updated) => outcome.updated += 1,
                Err(CuratorError::Integrity(msg)) => {
                    outcome.failed += 1;
                    outcome.failures.push(msg);
                }
                Err(e) => return Err(e),
            }
        }
        tx.commit()?;
        Ok(outcome)
    }

    pub fn mark_accessible(&self, ids: &[String], accessible: bool) -> CuratorResult<()> {
        let conn = self.conn.lock().unwrap();
        for id in ids {
            conn.execute(
                "UPDATE media_items SET accessible = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, accessible, now_str()],
            )?;
        }
        Ok(())
    }

    pub fn get_media_item(&self, id: &str) -> CuratorResult<Option<MediaItem>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("{SELECT_MEDIA_ITEM} WHERE id = ?1"),
            params![id],
            media_item_from_row,
        )
        .optional()
        .map_err(CuratorError::from)
    }

    pub fn find_media_item_by_external_id(
        &self,
        server_id: &str,
        external_id: &str,
    ) -> CuratorResult<Option<MediaItem>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("{SELECT_MEDIA_ITEM} WHERE server_id = ?1 AND external_id = ?2"),
            params![server_id, external_id],
            media_item_from_row,
        )
        .optional()
        .map_err(CuratorError::from)
    }

    /// Writes the audit row and hard-deletes the mirror row in one
    /// transaction (spec.md §4.1: "Writes DeletionEvent first").
    pub fn hard_delete(&self, id: &str, event: &DeletionEvent) -> CuratorResult<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        Self::insert_deletion_event_locked(&tx, event)?;
        let count = tx.execute("DELETE FROM media_items WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(count > 0)
    }

    /// Ranked deletion candidates for a rule (spec.md §4.5). `now` is passed
    /// in rather than computed here so callers (and tests) control time.
    pub fn query_candidates(
        &self,
        owner_id: &str,
        rule: &DeletionRule,
        now: DateTime<Utc>,
        limit: usize,
    ) -> CuratorResult<Vec<Candidate>> {
        let conn = self.conn.lock().unwrap();
        let now_str = now.format("%Y-%m-%dT%H:%M:%SZ").to_string();

        let mut sql = String::from(
            "SELECT id, title, kind, file_size_bytes, added_at, last_watched_at,
                    library_section, rating, tmdb_id, tdl_series_id, mdl_movie_id,
                    grandparent_title, genres, collections
             FROM media_items
             WHERE owner_id = ?1 AND accessible != 0",
        );
        let mut idx = 2;
        let mut bind_min_rating = false;
        if rule.min_rating.is_some() {
            sql.push_str(&format!(" AND (rating IS NULL OR rating < ?{idx})"));
            bind_min_rating = true;
            idx += 1;
        }
        sql.push_str(" ORDER BY file_size_bytes DESC, title ASC");

        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<CandidateRow> = if bind_min_rating {
            stmt.query_map(params![owner_id, rule.min_rating], candidate_row_from_row)?
                .collect::<Result<_, _>>()?
        } else {
            stmt.query_map(params![owner_id], candidate_row_from_row)?
                .collect::<Result<_, _>>()?
        };
        let _ = idx;

        let excluded_kinds = rule.excluded_kinds_list();
        let excluded_libraries = rule.excluded_libraries_list();
        let excluded_genres = rule.excluded_genres_list();
        let excluded_collections = rule.excluded_collections_list();

        let mut candidates: Vec<Candidate> = rows
            .into_iter()
            .filter_map(|row| {
                let added_at = DateTime::parse_from_rfc3339(&row.added_at)
                    .ok()?
                    .with_timezone(&Utc);
                let days_since_added = (now - added_at).num_days();
                if days_since_added < rule.grace_period_days {
                    return None;
                }

                let watch_anchor = row
                    .last_watched_at
                    .as_deref()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|d| d.with_timezone(&Utc))
                    .unwrap_or(added_at);
                let days_since_watched = (now - watch_anchor).num_days();
                if days_since_watched < rule.inactivity_threshold_days {
                    return None;
                }

                if excluded_kinds.iter().any(|k| k == &row.kind) {
                    return None;
                }
                if let Some(section) = &row.library_section {
                    if excluded_libraries.iter().any(|l| l == section) {
                        return None;
                    }
                }
                let genres: Vec<String> = serde_json::from_str(&row.genres).unwrap_or_default();
                if genres.iter().any(|g| excluded_genres.contains(g)) {
                    return None;
                }
                let collections: Vec<String> =
                    serde_json::from_str(&row.collections).unwrap_or_default();
                if collections.iter().any(|c| excluded_collections.contains(c)) {
                    return None;
                }

                Some(Candidate {
                    media_item_id: row.id,
                    title: row.title,
                    kind: row.kind,
                    file_size_bytes: row.file_size_bytes,
                    days_since_added,
                    days_since_watched,
                    library_section: row.library_section,
                    rating: row.rating,
                    tmdb_id: row.tmdb_id,
                    tdl_series_id: row.tdl_series_id,
                    mdl_movie_id: row.mdl_movie_id,
                    grandparent_title: row.grandparent_title,
                    show_origin: false,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.file_size_bytes
                .cmp(&a.file_size_bytes)
                .then(b.days_since_watched.cmp(&a.days_since_watched))
                .then(a.title.cmp(&b.title))
        });
        candidates.truncate(limit);
        let _ = now_str;
        Ok(candidates)
    }

    /// Builds a `Candidate` straight off one row, for cascade execution
    /// against an admin-confirmed id rather than a fresh rule query
    /// (spec.md §4.6). Returns `None` if the id doesn't exist or isn't
    /// owned by `owner_id` — the caller treats that as a rejected request,
    /// not a silent skip.
    pub fn candidate_for_media_item(
        &self,
        owner_id: &str,
        id: &str,
        now: DateTime<Utc>,
    ) -> CuratorResult<Option<Candidate>> {
        let item = match self.get_media_item(id)? {
            Some(item) if item.owner_id == owner_id => item,
            _ => return Ok(None),
        };

        let added_at = DateTime::parse_from_rfc3339(&item.added_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or(now);
        let days_since_added = (now - added_at).num_days();
        let watch_anchor = item
            .last_watched_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or(added_at);
        let days_since_watched = (now - watch_anchor).num_days();

        Ok(Some(Candidate {
            media_item_id: item.id,
            title: item.title,
            kind: item.kind,
            file_size_bytes: item.file_size_bytes,
            days_since_added,
            days_since_watched,
            library_section: item.library_section,
            rating: item.rating,
            tmdb_id: item.tmdb_id,
            tdl_series_id: item.tdl_series_id,
            mdl_movie_id: item.mdl_movie_id,
            grandparent_title: item.grandparent_title,
            show_origin: false,
        }))
    }

    pub fn show_aggregates(&self, owner_id: &str) -> CuratorResult<Vec<ShowAggregate>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT grandparent_title, COUNT(*), SUM(file_size_bytes),
                    MAX(last_watched_at), SUM(total_play_count), GROUP_CONCAT(id)
             FROM media_items
             WHERE owner_id = ?1 AND kind = 'episode' AND grandparent_title IS NOT NULL
             GROUP BY grandparent_title",
        )?;
        let rows = stmt
            .query_map(params![owner_id], |row: &Row| {
                let ids: String = row.get(5)?;
                Ok(ShowAggregate {
                    grandparent_title: row.get(0)?,
                    episode_count: row.get(1)?,
                    total_size_bytes: row.get(2)?,
                    last_watched_at: row.get(3)?,
                    total_plays: row.get(4)?,
                    episode_media_item_ids: ids.split(',').map(str::to_string).collect(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn catalog_size(&self, owner_id: &str) -> CuratorResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM media_items WHERE owner_id = ?1",
            params![owner_id],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn storage_stats(&self, owner_id: &str) -> CuratorResult<StorageStats> {
        let conn = self.conn.lock().unwrap();
        let (total_items, total_used_bytes): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(file_size_bytes), 0) FROM media_items WHERE owner_id = ?1",
            params![owner_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        let mut stmt = conn.prepare(
            "SELECT kind, COUNT(*), COALESCE(SUM(file_size_bytes), 0)
             FROM media_items WHERE owner_id = ?1 GROUP BY kind",
        )?;
        let by_kind = stmt
            .query_map(params![owner_id], |r| {
                Ok(KindStats {
                    kind: r.get(0)?,
                    count: r.get(1)?,
                    bytes: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StorageStats {
            total_items: total_items as u64,
            total_used_bytes: total_used_bytes as u64,
            by_kind,
        })
    }

    pub fn inaccessible_files(&self, owner_id: &str) -> CuratorResult<Vec<MediaItem>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_MEDIA_ITEM} WHERE owner_id = ?1 AND accessible = 0"
        ))?;
        let rows = stmt
            .query_map(params![owner_id], media_item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Server ──

    pub fn get_server(&self, id: &str) -> CuratorResult<Option<Server>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("{SELECT_SERVER} WHERE id = ?1"),
            params![id],
            server_from_row,
        )
        .optional()
        .map_err(CuratorError::from)
    }

    pub fn list_servers_for_owner(&self, owner_id: &str) -> CuratorResult<Vec<Server>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("{SELECT_SERVER} WHERE owner_id = ?1"))?;
        let rows = stmt
            .query_map(params![owner_id], server_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_server_connection(
        &self,
        id: &str,
        url: &str,
        latency_ms: i64,
    ) -> CuratorResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE servers SET preferred_connection_url = ?2, connection_latency_ms = ?3,
             connection_tested_at = ?4, updated_at = ?4 WHERE id = ?1",
            params![id, url, latency_ms, now_str()],
        )?;
        Ok(())
    }

    pub fn update_server_status(&self, id: &str, status: &str) -> CuratorResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE servers SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status, now_str()],
        )?;
        Ok(())
    }

    pub fn update_server_last_full_sync(&self, id: &str, at: &str) -> CuratorResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE servers SET last_full_sync_at = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, at, now_str()],
        )?;
        Ok(())
    }

    // ── Integration ──

    pub fn get_active_integration(
        &self,
        owner_id: &str,
        server_id: &str,
        service: &str,
    ) -> CuratorResult<Option<Integration>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!(
                "{SELECT_INTEGRATION} WHERE owner_id = ?1 AND server_id = ?2 AND service = ?3 AND status = 'active'"
            ),
            params![owner_id, server_id, service],
            integration_from_row,
        )
        .optional()
        .map_err(CuratorError::from)
    }

    pub fn record_integration_success(&self, id: &str) -> CuratorResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE integrations SET status = 'active', consecutive_failures = 0,
             last_sync_at = ?2, updated_at = ?2 WHERE id = ?1",
            params![id, now_str()],
        )?;
        Ok(())
    }

    pub fn record_integration_failure(&self, id: &str) -> CuratorResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = now_str();
        conn.execute(
            "UPDATE integrations SET consecutive_failures = consecutive_failures + 1,
             last_failure_at = ?2, updated_at = ?2 WHERE id = ?1",
            params![id, now],
        )?;
        conn.execute(
            "UPDATE integrations SET status = 'error'
             WHERE id = ?1 AND consecutive_failures >= 3
             AND (last_failure_at IS NULL OR strftime('%s', ?2) - strftime('%s', last_failure_at) <= 600)",
            params![id, now],
        )?;
        Ok(())
    }

    // ── DeletionRule ──

    pub fn get_rule(&self, owner_id: &str, id: &str) -> CuratorResult<Option<DeletionRule>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("{SELECT_RULE} WHERE owner_id = ?1 AND id = ?2"),
            params![owner_id, id],
            rule_from_row,
        )
        .optional()
        .map_err(CuratorError::from)
    }

    pub fn touch_rule_last_run(&self, id: &str) -> CuratorResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE deletion_rules SET last_run_at = ?2, updated_at = ?2 WHERE id = ?1",
            params![id, now_str()],
        )?;
        Ok(())
    }

    // ── DeletionEvent ──

    pub fn create_deletion_event(&self, event: &DeletionEvent) -> CuratorResult<()> {
        let conn = self.conn.lock().unwrap();
        Self::insert_deletion_event_locked(&conn, event)
    }

    fn insert_deletion_event_locked(conn: &Connection, event: &DeletionEvent) -> CuratorResult<()> {
        conn.execute(
            "INSERT INTO deletion_events (
                id, owner_id, rule_id, media_item_id, title, kind, file_size_bytes, file_path,
                reason, score, deleted_from_ms, deleted_from_ms_at, deleted_from_tdl, deleted_from_tdl_at,
                deleted_from_mdl, deleted_from_mdl_at, deleted_from_rqp, deleted_from_rqp_at,
                dry_run, status, actor, deleted_at, error_message
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23)",
            params![
                event.id,
                event.owner_id,
                event.rule_id,
                event.media_item_id,
                event.title,
                event.kind,
                event.file_size_bytes,
                event.file_path,
                event.reason,
                event.score,
                event.deleted_from_ms,
                event.deleted_from_ms_at,
                event.deleted_from_tdl,
                event.deleted_from_tdl_at,
                event.deleted_from_mdl,
                event.deleted_from_mdl_at,
                event.deleted_from_rqp,
                event.deleted_from_rqp_at,
                event.dry_run,
                event.status,
                event.actor,
                event.deleted_at,
                event.error_message,
            ],
        )?;
        Ok(())
    }

    // ── SyncEvent ──

    pub fn create_sync_event(&self, event: &SyncEvent) -> CuratorResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sync_events (id, owner_id, kind, trigger, status, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.id,
                event.owner_id,
                event.kind,
                event.trigger,
                event.status,
                event.started_at
            ],
        )?;
        Ok(())
    }

    pub fn finish_sync_event(
        &self,
        id: &str,
        status: &str,
        created: i64,
        updated: i64,
        failed: i64,
        error_message: Option<&str>,
    ) -> CuratorResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sync_events SET status = ?2, items_created = ?3, items_updated = ?4,
             items_failed = ?5, error_message = ?6, finished_at = ?7 WHERE id = ?1",
            params![id, status, created, updated, failed, error_message, now_str()],
        )?;
        Ok(())
    }

    // ── WebhookEvent ──

    pub fn create_webhook_event(&self, event: &WebhookEvent) -> CuratorResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO webhook_events (id, owner_id, service, payload_hash, processing_status, actions_triggered, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.id,
                event.owner_id,
                event.service,
                event.payload_hash,
                event.processing_status,
                event.actions_triggered,
                event.received_at
            ],
        )?;
        Ok(())
    }

    // ── JobSchedule ──

    pub fn get_due_schedules(&self, now: DateTime<Utc>) -> CuratorResult<Vec<JobSchedule>> {
        let conn = self.conn.lock().unwrap();
        let now_str = now.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let mut stmt = conn.prepare(
            "SELECT owner_id, kind, interval_hours, next_run_at, last_run_at, last_status, last_error, run_count
             FROM job_schedules WHERE next_run_at <= ?1",
        )?;
        let rows = stmt
            .query_map(params![now_str], schedule_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn record_schedule_run(
        &self,
        owner_id: &str,
        kind: &str,
        status: &str,
        error: Option<&str>,
        interval_hours: i64,
    ) -> CuratorResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let now_str = now.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let next_run = (now + Duration::hours(interval_hours))
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();
        conn.execute(
            "UPDATE job_schedules SET last_run_at = ?3, last_status = ?4, last_error = ?5,
             run_count = run_count + 1, next_run_at = ?6
             WHERE owner_id = ?1 AND kind = ?2",
            params![owner_id, kind, now_str, status, error, next_run],
        )?;
        Ok(())
    }

    // ── system_config ──

    pub fn get_config(&self, key: &str) -> CuratorResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT value FROM system_config WHERE key = ?1",
            params![key],
            |r| r.get(0),
        )
        .optional()
        .map_err(CuratorError::from)
    }

    pub fn set_config(&self, key: &str, value: &str) -> CuratorResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO system_config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub created: i64,
    pub updated: i64,
    pub failed: i64,
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct KindStats {
    pub kind: String,
    pub count: i64,
    pub bytes: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StorageStats {
    pub total_items: u64,
    pub total_used_bytes: u64,
    pub by_kind: Vec<KindStats>,
}

struct CandidateRow {
    id: String,
    title: String,
    kind: String,
    file_size_bytes: i64,
    added_at: String,
    last_watched_at: Option<String>,
    library_section: Option<String>,
    rating: Option<f64>,
    tmdb_id: Option<String>,
    tdl_series_id: Option<String>,
    mdl_movie_id: Option<String>,
    grandparent_title: Option<String>,
    genres: String,
    collections: String,
}

fn candidate_row_from_row(row: &Row) -> rusqlite::Result<CandidateRow> {
    Ok(CandidateRow {
        id: row.get(0)?,
        title: row.get(1)?,
        kind: row.get(2)?,
        file_size_bytes: row.get(3)?,
        added_at: row.get(4)?,
        last_watched_at: row.get(5)?,
        library_section: row.get(6)?,
        rating: row.get(7)?,
        tmdb_id: row.get(8)?,
        tdl_series_id: row.get(9)?,
        mdl_movie_id: row.get(10)?,
        grandparent_title: row.get(11)?,
        genres: row.get(12)?,
        collections: row.get(13)?,
    })
}

const SELECT_MEDIA_ITEM: &str = "SELECT
    id, owner_id, server_id, external_id, kind, title, year, runtime_minutes,
    tmdb_id, tvdb_id, imdb_id, tdl_series_id, mdl_movie_id,
    library_section, genres, collections, rating,
    grandparent_title, parent_title, season_number, episode_number,
    video_resolution, video_codec, audio_codec, container, bitrate_kbps,
    file_path, file_size_bytes, accessible,
    total_play_count, complete_play_count, partial_play_count,
    avg_percent_complete, last_watched_at, total_watch_time_seconds,
    added_at, updated_at, history_synced_at
    FROM media_items";

fn media_item_from_row(row: &Row) -> rusqlite::Result<MediaItem> {
    Ok(MediaItem {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        server_id: row.get(2)?,
        external_id: row.get(3)?,
        kind: row.get(4)?,
        title: row.get(5)?,
        year: row.get(6)?,
        runtime_minutes: row.get(7)?,
        tmdb_id: row.get(8)?,
        tvdb_id: row.get(9)?,
        imdb_id: row.get(10)?,
        tdl_series_id: row.get(11)?,
        mdl_movie_id: row.get(12)?,
        library_section: row.get(13)?,
        genres: row.get(14)?,
        collections: row.get(15)?,
        rating: row.get(16)?,
        grandparent_title: row.get(17)?,
        parent_title: row.get(18)?,
        season_number: row.get(19)?,
        episode_number: row.get(20)?,
        video_resolution: row.get(21)?,
        video_codec: row.get(22)?,
        audio_codec: row.get(23)?,
        container: row.get(24)?,
        bitrate_kbps: row.get(25)?,
        file_path: row.get(26)?,
        file_size_bytes: row.get(27)?,
        accessible: row.get(28)?,
        total_play_count: row.get(29)?,
        complete_play_count: row.get(30)?,
        partial_play_count: row.get(31)?,
        avg_percent_complete: row.get(32)?,
        last_watched_at: row.get(33)?,
        total_watch_time_seconds: row.get(34)?,
        added_at: row.get(35)?,
        updated_at: row.get(36)?,
        history_synced_at: row.get(37)?,
    })
}

const SELECT_SERVER: &str = "SELECT
    id, owner_id, name, machine_id, platform, version, status,
    auth_token_ciphertext, webhook_secret, preferred_connection_url,
    connection_latency_ms, connection_tested_at, last_full_sync_at,
    created_at, updated_at FROM servers";

fn server_from_row(row: &Row) -> rusqlite::Result<Server> {
    Ok(Server {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        machine_id: row.get(3)?,
        platform: row.get(4)?,
        version: row.get(5)?,
        status: row.get(6)?,
        auth_token_ciphertext: row.get(7)?,
        webhook_secret: row.get(8)?,
        preferred_connection_url: row.get(9)?,
        connection_latency_ms: row.get(10)?,
        connection_tested_at: row.get(11)?,
        last_full_sync_at: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

const SELECT_INTEGRATION: &str = "SELECT
    id, owner_id, server_id, service, name, base_url, api_key_ciphertext, status,
    consecutive_failures, last_failure_at, last_sync_at, created_at, updated_at
    FROM integrations";

fn integration_from_row(row: &Row) -> rusqlite::Result<Integration> {
    Ok(Integration {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        server_id: row.get(2)?,
        service: row.get(3)?,
        name: row.get(4)?,
        base_url: row.get(5)?,
        api_key_ciphertext: row.get(6)?,
        status: row.get(7)?,
        consecutive_failures: row.get(8)?,
        last_failure_at: row.get(9)?,
        last_sync_at: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

const SELECT_RULE: &str = "SELECT
    id, owner_id, name, enabled, dry_run_mode, grace_period_days, inactivity_threshold_days,
    min_rating, excluded_kinds, excluded_libraries, excluded_genres, excluded_collections,
    created_by, last_run_at, created_at, updated_at FROM deletion_rules";

fn rule_from_row(row: &Row) -> rusqlite::Result<DeletionRule> {
    Ok(DeletionRule {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        enabled: row.get(3)?,
        dry_run_mode: row.get(4)?,
        grace_period_days: row.get(5)?,
        inactivity_threshold_days: row.get(6)?,
        min_rating: row.get(7)?,
        excluded_kinds: row.get(8)?,
        excluded_libraries: row.get(9)?,
        excluded_genres: row.get(10)?,
        excluded_collections: row.get(11)?,
        created_by: row.get(12)?,
        last_run_at: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn schedule_from_row(row: &Row) -> rusqlite::Result<JobSchedule> {
    Ok(JobSchedule {
        owner_id: row.get(0)?,
        kind: row.get(1)?,
        interval_hours: row.get(2)?,
        next_run_at: row.get(3)?,
        last_run_at: row.get(4)?,
        last_status: row.get(5)?,
        last_error: row.get(6)?,
        run_count: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_owner_server(store: &MirrorStore) -> (String, String) {
        let conn = store.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO servers (id, owner_id, name, machine_id, webhook_secret)
             VALUES ('srv1', 'owner1', 'Main', 'mach1', 'secret')",
            [],
        )
        .unwrap();
        ("owner1".to_string(), "srv1".to_string())
    }

    fn movie_patch(title: &str, size: i64) -> MediaItemPatch {
        MediaItemPatch {
            kind: Some("movie".into()),
            title: Some(title.into()),
            file_size_bytes: Some(size),
            accessible: Some(true),
            ..Default::default()
        }
    }

    #[test]
    fn upsert_then_find_roundtrips() {
        let store = MirrorStore::open_in_memory().unwrap();
        let (owner, server) = seed_owner_server(&store);
        let patch = movie_patch("Alpha", 1024);
        let outcome = store
            .upsert_media_item(&owner, &server, "ext-1", &patch)
            .unwrap();
        assert!(matches!(outcome, UpsertOutcome::Inserted));

        let outcome2 = store
            .upsert_media_item(&owner, &server, "ext-1", &patch)
            .unwrap();
        assert!(matches!(outcome2, UpsertOutcome::Updated));

        let found = store
            .find_media_item_by_external_id(&server, "ext-1")
            .unwrap()
            .unwrap();
        assert_eq!(found.title, "Alpha");
        assert_eq!(found.file_size_bytes, 1024);
    }

    #[test]
    fn episode_without_hierarchy_is_rejected() {
        let store = MirrorStore::open_in_memory().unwrap();
        let (owner, server) = seed_owner_server(&store);
        let patch = MediaItemPatch {
            kind: Some("episode".into()),
            title: Some("Ep 1".into()),
            grandparent_title: Some("Show A".into()),
            season_number: None,
            episode_number: Some(1),
            ..Default::default()
        };
        let result = store.upsert_media_item(&owner, &server, "ext-ep", &patch);
        assert!(matches!(result, Err(CuratorError::Integrity(_))));
        assert!(store
            .find_media_item_by_external_id(&server, "ext-ep")
            .unwrap()
            .is_none());
    }

    #[test]
    fn query_candidates_respects_grace_period_boundary() {
        let store = MirrorStore::open_in_memory().unwrap();
        let (owner, server) = seed_owner_server(&store);

        // Insert directly so we control added_at precisely.
        {
            let conn = store.conn.lock().unwrap();
            let now = Utc::now();
            let just_inside = now - Duration::days(30) + Duration::seconds(1);
            let just_outside = now - Duration::days(30) - Duration::seconds(1);
            conn.execute(
                "INSERT INTO media_items (id, owner_id, server_id, external_id, kind, title,
                 file_size_bytes, accessible, added_at, updated_at, last_watched_at)
                 VALUES ('m1', ?1, ?2, 'e1', 'movie', 'Recent', 100, 1, ?3, ?3, NULL)",
                params![owner, server, just_inside.to_rfc3339()],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO media_items (id, owner_id, server_id, external_id, kind, title,
                 file_size_bytes, accessible, added_at, updated_at, last_watched_at)
                 VALUES ('m2', ?1, ?2, 'e2', 'movie', 'Old', 200, 1, ?3, ?3, NULL)",
                params![owner, server, just_outside.to_rfc3339()],
            )
            .unwrap();
        }

        let rule = DeletionRule {
            id: "r1".into(),
            owner_id: owner.clone(),
            name: "rule".into(),
            enabled: true,
            dry_run_mode: true,
            grace_period_days: 30,
            inactivity_threshold_days: 0,
            min_rating: None,
            excluded_kinds: "[]".into(),
            excluded_libraries: "[]".into(),
            excluded_genres: "[]".into(),
            excluded_collections: "[]".into(),
            created_by: "admin".into(),
            last_run_at: None,
            created_at: now_str(),
            updated_at: now_str(),
        };

        let candidates = store
            .query_candidates(&owner, &rule, Utc::now(), 10_000)
            .unwrap();
        let titles: Vec<&str> = candidates.iter().map(|c| c.title.as_str()).collect();
        assert!(titles.contains(&"Old"));
        assert!(!titles.contains(&"Recent"));
    }

    #[test]
    fn hard_delete_removes_row_and_writes_audit() {
        let store = MirrorStore::open_in_memory().unwrap();
        let (owner, server) = seed_owner_server(&store);
        let patch = movie_patch("ToDelete", 500);
        store
            .upsert_media_item(&owner, &server, "ext-del", &patch)
            .unwrap();
        let item = store
            .find_media_item_by_external_id(&server, "ext-del")
            .unwrap()
            .unwrap();

        let event = DeletionEvent {
            id: "ev1".into(),
            owner_id: owner.clone(),
            rule_id: None,
            media_item_id: item.id.clone(),
            title: item.title.clone(),
            kind: item.kind.clone(),
            file_size_bytes: item.file_size_bytes,
            file_path: item.file_path.clone(),
            reason: "test".into(),
            score: 0.0,
            deleted_from_ms: true,
            deleted_from_ms_at: Some(now_str()),
            deleted_from_tdl: false,
            deleted_from_tdl_at: None,
            deleted_from_mdl: false,
            deleted_from_mdl_at: None,
            deleted_from_rqp: false,
            deleted_from_rqp_at: None,
            dry_run: false,
            status: "completed".into(),
            actor: "admin".into(),
            deleted_at: now_str(),
            error_message: None,
        };

        let deleted = store.hard_delete(&item.id, &event).unwrap();
        assert!(deleted);
        assert!(store.get_media_item(&item.id).unwrap().is_none());
    }
}
