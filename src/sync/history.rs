use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::clients::ahs::{AhsHistoryRecord, ActivityHistoryClient};
use crate::clients::ms::{MediaServerClient, MsHistoryRecord};
use crate::error::CuratorResult;
use crate::mirror::MirrorStore;
use crate::models::job::{JobProgress, SyncProgress};
use crate::models::media_item::{MediaItem, MediaItemPatch};

/// Engagement-only sync: pulls watch history either from AHS (preferred, when
/// an active integration exists) or from MS itself, and merges it onto
/// existing mirror rows (spec.md §4.4). Only records newer than the owner's
/// stored watermark are requested; the watermark advances to the newest
/// `watched_at`/`viewed_at` seen once the run completes.
pub struct HistorySync<'a> {
    store: &'a MirrorStore,
    ms: &'a MediaServerClient,
    ahs: Option<&'a ActivityHistoryClient>,
}

fn watermark_key(owner_id: &str) -> String {
    format!("history_sync_watermark:{owner_id}")
}

impl<'a> HistorySync<'a> {
    pub fn new(
        store: &'a MirrorStore,
        ms: &'a MediaServerClient,
        ahs: Option<&'a ActivityHistoryClient>,
    ) -> Self {
        Self { store, ms, ahs }
    }

    pub async fn run(
        &self,
        owner_id: &str,
        server_id: &str,
        progress: &watch::Sender<JobProgress>,
        cancel: &CancellationToken,
    ) -> CuratorResult<SyncProgress> {
        let mut state = SyncProgress {
            status: "running".into(),
            ..Default::default()
        };

        let since = self
            .store
            .get_config(&watermark_key(owner_id))?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc));

        let aggregated: HashMap<String, MediaItemPatch> = if let Some(ahs) = self.ahs {
            state.history_source = Some("ahs".into());
            let _ = progress.send(JobProgress::Sync(state.clone()));
            let records = ahs.fetch_history(since).await?;
            state.total = records.len() as u64;
            aggregate_ahs(records)
        } else {
            state.history_source = Some("ms".into());
            let _ = progress.send(JobProgress::Sync(state.clone()));
            let records = self.ms.fetch_history(since).await?;
            state.total = records.len() as u64;
            aggregate_ms(records)
        };

        let synced_at = Utc::now().to_rfc3339();
        let mut newest_watched_at = since.map(|d| d.to_rfc3339());

        for (external_id, mut patch) in aggregated {
            if cancel.is_cancelled() {
                state.status = "cancelled".into();
                let _ = progress.send(JobProgress::Sync(state.clone()));
                return Ok(state);
            }
            if let Some(watched_at) = &patch.last_watched_at {
                if newest_watched_at.as_deref().is_none_or(|newest| watched_at.as_str() > newest) {
                    newest_watched_at = Some(watched_at.clone());
                }
            }
            patch.history_synced_at = Some(synced_at.clone());

            match self.store.find_media_item_by_external_id(server_id, &external_id)? {
                Some(existing) => {
                    let merged_patch = merge_engagement(&existing, &patch);
                    self.store
                        .upsert_media_item(owner_id, server_id, &external_id, &merged_patch)?;
                    state.updated += 1;
                }
                None => {
                    tracing::debug!(external_id, "history record has no matching media item yet");
                }
            }
            state.current += 1;
        }

        if let Some(watermark) = newest_watched_at {
            self.store.set_config(&watermark_key(owner_id), &watermark)?;
        }

        state.status = "completed".into();
        let _ = progress.send(JobProgress::Sync(state.clone()));
        Ok(state)
    }
}

/// Raw per-play AHS records are aggregated per external id, not collapsed
/// last-write-wins: `total_play_count` is the play count, complete/partial
/// split at the 90% threshold, `last_watched_at` is the max across plays,
/// and `total_watch_time_seconds` sums paused time plus watched duration
/// over every play (spec.md §4.4).
fn aggregate_ahs(records: Vec<AhsHistoryRecord>) -> HashMap<String, MediaItemPatch> {
    let mut groups: HashMap<String, Vec<AhsHistoryRecord>> = HashMap::new();
    for record in records {
        groups.entry(record.external_id.clone()).or_default().push(record);
    }
    groups
        .into_iter()
        .map(|(external_id, plays)| {
            let total_play_count = plays.len() as i64;
            let complete_play_count = plays.iter().filter(|p| p.percent_complete >= 0.9).count() as i64;
            let partial_play_count = total_play_count - complete_play_count;
            let avg_percent_complete =
                plays.iter().map(|p| p.percent_complete).sum::<f64>() / plays.len() as f64;
            let last_watched_at = plays.iter().map(|p| p.watched_at).max().map(|d| d.to_rfc3339());
            let total_watch_time_seconds = plays
                .iter()
                .map(|p| p.paused_counter_seconds + p.duration_watched_seconds)
                .sum::<i64>();
            (
                external_id,
                MediaItemPatch {
                    total_play_count: Some(total_play_count),
                    complete_play_count: Some(complete_play_count),
                    partial_play_count: Some(partial_play_count),
                    avg_percent_complete: Some(avg_percent_complete),
                    last_watched_at,
                    total_watch_time_seconds: Some(total_watch_time_seconds),
                    ..Default::default()
                },
            )
        })
        .collect()
}

/// MS only ever reports one session per item, not a per-play log, so its
/// contribution leaves `complete_play_count`/`partial_play_count`/
/// `total_watch_time_seconds` as `None` — `merge_engagement` passes those
/// through unchanged rather than treating "MS doesn't know" as zero.
fn aggregate_ms(records: Vec<MsHistoryRecord>) -> HashMap<String, MediaItemPatch> {
    let mut groups: HashMap<String, Vec<MsHistoryRecord>> = HashMap::new();
    for record in records {
        groups.entry(record.external_id.clone()).or_default().push(record);
    }
    groups
        .into_iter()
        .map(|(external_id, plays)| {
            let total_play_count = plays.len() as i64;
            let last = plays.iter().max_by_key(|p| p.viewed_at).expect("plays is non-empty");
            let percent = match (last.view_offset_ms, last.duration_ms) {
                (Some(offset), Some(duration)) if duration > 0 => (offset as f64 / duration as f64).min(1.0),
                _ => 1.0,
            };
            (
                external_id,
                MediaItemPatch {
                    total_play_count: Some(total_play_count),
                    complete_play_count: None,
                    partial_play_count: None,
                    avg_percent_complete: Some(percent),
                    last_watched_at: Some(last.viewed_at.to_rfc3339()),
                    total_watch_time_seconds: None,
                    ..Default::default()
                },
            )
        })
        .collect()
}

/// Engagement fields accumulate rather than overwrite: play counts add, the
/// anchor timestamp only moves forward, and a field the incoming source
/// couldn't compute (`None`) is left at the existing value instead of being
/// treated as zero.
pub(crate) fn merge_engagement(existing: &MediaItem, incoming: &MediaItemPatch) -> MediaItemPatch {
    let mut merged = incoming.clone();
    merged.total_play_count = Some(existing.total_play_count + incoming.total_play_count.unwrap_or(0));
    merged.complete_play_count = incoming.complete_play_count.map(|c| existing.complete_play_count + c);
    merged.partial_play_count = incoming.partial_play_count.map(|p| existing.partial_play_count + p);
    merged.total_watch_time_seconds = match incoming.total_watch_time_seconds {
        Some(added) => Some(existing.total_watch_time_seconds + added),
        None => None,
    };
    merged.last_watched_at = match (&existing.last_watched_at, &incoming.last_watched_at) {
        (Some(old), Some(new)) => Some(if new > old { new.clone() } else { old.clone() }),
        (None, Some(new)) => Some(new.clone()),
        (old, None) => old.clone(),
    };
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn media_item() -> MediaItem {
        MediaItem {
            id: "m1".into(),
            owner_id: "owner1".into(),
            server_id: "s1".into(),
            external_id: "e1".into(),
            kind: "episode".into(),
            title: "Ep".into(),
            year: None,
            runtime_minutes: None,
            tmdb_id: None,
            tvdb_id: None,
            imdb_id: None,
            tdl_series_id: None,
            mdl_movie_id: None,
            library_section: None,
            genres: None,
            collections: None,
            rating: None,
            grandparent_title: None,
            parent_title: None,
            season_number: None,
            episode_number: None,
            video_resolution: None,
            video_codec: None,
            audio_codec: None,
            container: None,
            bitrate_kbps: None,
            file_path: None,
            file_size_bytes: 0,
            accessible: true,
            total_play_count: 2,
            complete_play_count: 1,
            partial_play_count: 1,
            avg_percent_complete: Some(0.5),
            last_watched_at: Some("2026-01-01T00:00:00Z".into()),
            total_watch_time_seconds: 600,
            added_at: "2025-01-01T00:00:00Z".into(),
            updated_at: "2025-01-01T00:00:00Z".into(),
            history_synced_at: None,
        }
    }

    #[test]
    fn aggregates_multiple_ahs_plays_instead_of_collapsing() {
        let records = vec![
            AhsHistoryRecord {
                external_id: "e1".into(),
                watched_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
                percent_complete: 1.0,
                paused_counter_seconds: 10,
                duration_watched_seconds: 1200,
            },
            AhsHistoryRecord {
                external_id: "e1".into(),
                watched_at: Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap(),
                percent_complete: 0.3,
                paused_counter_seconds: 0,
                duration_watched_seconds: 300,
            },
        ];
        let patches = aggregate_ahs(records);
        let patch = &patches["e1"];
        assert_eq!(patch.total_play_count, Some(2));
        assert_eq!(patch.complete_play_count, Some(1));
        assert_eq!(patch.partial_play_count, Some(1));
        assert_eq!(patch.total_watch_time_seconds, Some(1510));
        assert_eq!(patch.last_watched_at.as_deref(), Some("2026-01-02T00:00:00+00:00"));
    }

    #[test]
    fn merge_adds_onto_existing_counts() {
        let existing = media_item();
        let incoming = MediaItemPatch {
            total_play_count: Some(2),
            complete_play_count: Some(1),
            partial_play_count: Some(1),
            total_watch_time_seconds: Some(400),
            last_watched_at: Some("2025-06-01T00:00:00Z".into()),
            ..Default::default()
        };
        let merged = merge_engagement(&existing, &incoming);
        assert_eq!(merged.total_play_count, Some(4));
        assert_eq!(merged.complete_play_count, Some(2));
        assert_eq!(merged.partial_play_count, Some(2));
        assert_eq!(merged.total_watch_time_seconds, Some(1000));
        // existing anchor is newer than the incoming one, so it wins
        assert_eq!(merged.last_watched_at.as_deref(), Some("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn ms_fallback_leaves_complete_and_partial_counts_untouched() {
        let existing = media_item();
        let incoming = MediaItemPatch {
            total_play_count: Some(1),
            complete_play_count: None,
            partial_play_count: None,
            total_watch_time_seconds: None,
            ..Default::default()
        };
        let merged = merge_engagement(&existing, &incoming);
        assert_eq!(merged.total_play_count, Some(3));
        assert_eq!(merged.complete_play_count, None);
        assert_eq!(merged.partial_play_count, None);
        assert_eq!(merged.total_watch_time_seconds, None);
    }
}
