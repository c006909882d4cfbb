use std::collections::{HashMap, HashSet};

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::config::CascadeConfig;
use crate::error::CuratorResult;
use crate::mirror::MirrorStore;
use crate::models::deletion_rule::{Candidate, CandidatePreview, DeletionRule};

/// Admin-supplied knobs for `Scorer::preview`, beyond the rule itself
/// (spec.md §4.5's `GET /candidates` query parameters).
#[derive(Debug, Clone, Default)]
pub struct PreviewOptions {
    pub force: bool,
    /// Collapse fully-matched shows into one `show:{title}` entry. Off by
    /// default — rollup is an explicit admin view, not an always-on
    /// transformation, since a show-level entry changes cascade semantics
    /// (TDL exclusion) from what a plain episode-level entry would get.
    pub rollup_shows: bool,
    pub limit: Option<usize>,
    pub kind_filter: Option<Vec<String>>,
    pub min_size_gb: Option<f64>,
}

/// Checksum over the exact set of ids a preview displayed, echoed back on
/// `POST /cascade` as `confirm_token` when `dry_run=false` (spec.md §4.6).
/// Not a secret — it's a checksum confirmation (the admin can only produce
/// a matching token by having fetched a preview of precisely this set),
/// the same shape as "type the resource name to confirm" in other admin
/// tooling, adapted to a non-interactive API.
pub fn compute_confirm_token(owner_id: &str, rule_id: &str, candidate_ids: &[String]) -> String {
    let mut sorted = candidate_ids.to_vec();
    sorted.sort();
    let mut hasher = Sha256::new();
    hasher.update(owner_id.as_bytes());
    hasher.update(b"|");
    hasher.update(rule_id.as_bytes());
    hasher.update(b"|");
    hasher.update(sorted.join(",").as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Builds a ranked, safety-checked candidate preview for a rule (spec.md
/// §4.5). The raw predicate/ordering lives in `MirrorStore::query_candidates`
/// — this layer adds the things that aren't pure row filtering: the
/// whole-show rollup, display-only filters, and the safety-bound check.
pub struct Scorer<'a> {
    store: &'a MirrorStore,
    config: &'a CascadeConfig,
}

impl<'a> Scorer<'a> {
    pub fn new(store: &'a MirrorStore, config: &'a CascadeConfig) -> Self {
        Self { store, config }
    }

    pub fn preview(
        &self,
        owner_id: &str,
        rule: &DeletionRule,
        opts: &PreviewOptions,
    ) -> CuratorResult<CandidatePreview> {
        let total_catalog_size = self.store.catalog_size(owner_id)?;
        let mut candidates =
            self.store
                .query_candidates(owner_id, rule, Utc::now(), self.config.max_candidates)?;
        let total_matched = candidates.len();
        let capped = total_matched >= self.config.max_candidates;

        if opts.rollup_shows {
            candidates = self.rollup_complete_shows(owner_id, candidates)?;
        }

        if let Some(kinds) = &opts.kind_filter {
            candidates.retain(|c| kinds.iter().any(|k| k == &c.kind));
        }
        if let Some(min_gb) = opts.min_size_gb {
            let min_bytes = (min_gb * 1024.0 * 1024.0 * 1024.0) as i64;
            candidates.retain(|c| c.file_size_bytes >= min_bytes);
        }
        if let Some(limit) = opts.limit {
            candidates.truncate(limit);
        }

        let safety_bound = if total_catalog_size == 0 {
            0
        } else {
            ((total_catalog_size as f64) * self.config.safety_percent_of_total / 100.0).floor() as usize
        };
        let requires_force = !opts.force && safety_bound > 0 && total_matched > safety_bound;

        let confirm_token = compute_confirm_token(
            owner_id,
            &rule.id,
            &candidates.iter().map(|c| c.media_item_id.clone()).collect::<Vec<_>>(),
        );

        Ok(CandidatePreview {
            candidates,
            total_matched,
            capped,
            requires_force,
            total_catalog_size,
            confirm_token,
        })
    }

    /// When every episode of a show is itself a candidate, collapse them
    /// into a single show-level candidate for display. `JobOrchestrator`
    /// expands a `show:{title}` id back into its real episodes (marking
    /// each `show_origin: true`) before a cascade ever touches a row — this
    /// rollup is preview-only, never the unit of execution.
    fn rollup_complete_shows(
        &self,
        owner_id: &str,
        candidates: Vec<Candidate>,
    ) -> CuratorResult<Vec<Candidate>> {
        let aggregates = self.store.show_aggregates(owner_id)?;
        let candidate_ids: HashSet<&str> = candidates.iter().map(|c| c.media_item_id.as_str()).collect();

        let mut fully_stale_shows = HashMap::new();
        for agg in &aggregates {
            let all_stale = !agg.episode_media_item_ids.is_empty()
                && agg
                    .episode_media_item_ids
                    .iter()
                    .all(|id| candidate_ids.contains(id.as_str()));
            if all_stale {
                fully_stale_shows.insert(agg.grandparent_title.clone(), agg);
            }
        }

        if fully_stale_shows.is_empty() {
            return Ok(candidates);
        }

        let mut rolled_up_shows = HashSet::new();
        let mut result = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let Some(show) = candidate.grandparent_title.as_deref() else {
                result.push(candidate);
                continue;
            };
            if let Some(agg) = fully_stale_shows.get(show) {
                if rolled_up_shows.insert(show.to_string()) {
                    result.push(Candidate {
                        media_item_id: format!("show:{show}"),
                        title: show.to_string(),
                        kind: "show".into(),
                        file_size_bytes: agg.total_size_bytes,
                        days_since_added: candidate.days_since_added,
                        days_since_watched: candidate.days_since_watched,
                        library_section: candidate.library_section.clone(),
                        rating: None,
                        tmdb_id: None,
                        tdl_series_id: candidate.tdl_series_id.clone(),
                        mdl_movie_id: None,
                        grandparent_title: Some(show.to_string()),
                        show_origin: false,
                    });
                }
                continue;
            }
            result.push(candidate);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::deletion_rule::ShowAggregate;

    fn candidate(id: &str, show: &str) -> Candidate {
        Candidate {
            media_item_id: id.into(),
            title: format!("{show} - {id}"),
            kind: "episode".into(),
            file_size_bytes: 100,
            days_since_added: 40,
            days_since_watched: 40,
            library_section: None,
            rating: None,
            tmdb_id: None,
            tdl_series_id: None,
            mdl_movie_id: None,
            grandparent_title: Some(show.into()),
            show_origin: false,
        }
    }

    #[test]
    fn rolls_up_only_when_entire_show_matches() {
        let partial = vec![candidate("e1", "Show A"), candidate("e2", "Show A")];
        let aggregates = vec![ShowAggregate {
            grandparent_title: "Show A".into(),
            episode_count: 3,
            total_size_bytes: 300,
            last_watched_at: None,
            total_plays: 0,
            episode_media_item_ids: vec!["e1".into(), "e2".into(), "e3".into()],
        }];
        let ids: HashSet<&str> = partial.iter().map(|c| c.media_item_id.as_str()).collect();
        let all_stale = aggregates[0].episode_media_item_ids.iter().all(|id| ids.contains(id.as_str()));
        assert!(!all_stale, "e3 missing from candidates, show should not roll up");
    }

    #[test]
    fn confirm_token_is_stable_regardless_of_id_order() {
        let a = compute_confirm_token("owner1", "rule1", &["x".into(), "y".into()]);
        let b = compute_confirm_token("owner1", "rule1", &["y".into(), "x".into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn confirm_token_changes_with_candidate_set() {
        let a = compute_confirm_token("owner1", "rule1", &["x".into()]);
        let b = compute_confirm_token("owner1", "rule1", &["x".into(), "y".into()]);
        assert_ne!(a, b);
    }
}
