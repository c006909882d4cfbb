use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{CuratorError, CuratorResult};
use crate::jobs::JobOrchestrator;
use crate::mirror::MirrorStore;
use crate::models::media_item::MediaItemPatch;
use crate::models::webhook_event::WebhookEvent;
use crate::sync::history::merge_engagement;

type HmacSha256 = Hmac<Sha256>;

/// `media.scrobble` carries exactly the percent watched for one play of one
/// item — MS sends this the moment a session ends, so it's merged straight
/// into the mirror rather than waiting on the next history sync.
#[derive(Debug, Deserialize)]
struct MsScrobblePayload {
    external_id: String,
    percent_complete: f64,
}

#[derive(Debug, Deserialize)]
struct MsEventEnvelope {
    event: String,
}

/// Receives MS/companion-service webhooks, verifies the shared secret,
/// debounces repeated notifications, and triggers the relevant sync job
/// (spec.md §4.8). Tenant is resolved from the path, not from any header —
/// each owner's webhook URL is unique to them.
pub struct WebhookDispatcher {
    store: std::sync::Arc<MirrorStore>,
    orchestrator: JobOrchestrator,
    debounce: Mutex<HashMap<(String, String), Instant>>,
    debounce_secs: i64,
    body_cap_bytes: usize,
}

impl WebhookDispatcher {
    pub fn new(
        store: std::sync::Arc<MirrorStore>,
        orchestrator: JobOrchestrator,
        debounce_secs: i64,
        body_cap_bytes: usize,
    ) -> Self {
        Self {
            store,
            orchestrator,
            debounce: Mutex::new(HashMap::new()),
            debounce_secs,
            body_cap_bytes,
        }
    }

    /// Verifies the payload against the owner's server secret, either as a
    /// raw shared secret (constant-time compare) or, when the adapter signs
    /// instead of forwarding the secret, as an HMAC-SHA256 of the body.
    fn verify(&self, secret: &str, provided_secret: Option<&str>, signature: Option<&str>, body: &[u8]) -> bool {
        if let Some(provided) = provided_secret {
            return bool::from(provided.as_bytes().ct_eq(secret.as_bytes()));
        }
        if let Some(signature) = signature {
            let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
                return false;
            };
            mac.update(body);
            let expected = hex::encode(mac.finalize().into_bytes());
            return bool::from(expected.as_bytes().ct_eq(signature.as_bytes()));
        }
        false
    }

    fn should_debounce(&self, owner_id: &str, kind: &str) -> bool {
        let mut debounce = self.debounce.lock().unwrap();
        let key = (owner_id.to_string(), kind.to_string());
        let now = Instant::now();
        if let Some(last) = debounce.get(&key) {
            if now.duration_since(*last).as_secs() < self.debounce_secs.max(0) as u64 {
                return true;
            }
        }
        debounce.insert(key, now);
        false
    }

    pub fn body_cap_bytes(&self) -> usize {
        self.body_cap_bytes
    }

    pub async fn handle(
        &self,
        owner_id: &str,
        service: &str,
        provided_secret: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
    ) -> CuratorResult<WebhookEvent> {
        if body.len() > self.body_cap_bytes {
            return Err(CuratorError::Validation(format!(
                "webhook payload of {} bytes exceeds the {} byte cap",
                body.len(),
                self.body_cap_bytes
            )));
        }

        let server = self
            .store
            .list_servers_for_owner(owner_id)?
            .into_iter()
            .next()
            .ok_or_else(|| CuratorError::NotFound(format!("no server registered for owner {owner_id}")))?;

        if !self.verify(&server.webhook_secret, provided_secret, signature, body) {
            return Err(CuratorError::Auth("webhook secret/signature did not match".into()));
        }

        let payload_hash = hex::encode(Sha256::digest(body));
        let event_type = serde_json::from_slice::<MsEventEnvelope>(body).ok().map(|e| e.event);

        let mut actions_triggered = Vec::new();
        let processing_status = match service {
            "ms" if event_type.as_deref() == Some("media.scrobble") => {
                match self.merge_scrobble(owner_id, &server.id, body) {
                    Ok(true) => {
                        actions_triggered.push("engagement_merged".to_string());
                        "processed"
                    }
                    Ok(false) => "skipped_unknown_item",
                    Err(e) => {
                        tracing::warn!(owner_id, error = %e, "scrobble merge failed");
                        "failed"
                    }
                }
            }
            "rqp" => "forwarded",
            _ => {
                let kind = match (service, event_type.as_deref()) {
                    ("ms", Some("library.new") | Some("library.on.deck")) => "library_sync",
                    ("ms", _) => "library_sync",
                    ("ahs", _) => "history_sync",
                    ("tdl", _) | ("mdl", _) => "library_sync",
                    (other, _) => {
                        return Err(CuratorError::Validation(format!(
                            "unrecognized webhook service '{other}'"
                        )));
                    }
                };
                if self.should_debounce(owner_id, kind) {
                    "debounced"
                } else {
                    let dispatch = match kind {
                        "library_sync" => self.orchestrator.start_library_sync(owner_id),
                        "history_sync" => self.orchestrator.start_history_sync(owner_id),
                        _ => unreachable!(),
                    };
                    match dispatch {
                        Ok(()) => {
                            actions_triggered.push(kind.to_string());
                            "processed"
                        }
                        Err(CuratorError::Conflict(_)) => "skipped_job_in_progress",
                        Err(e) => {
                            tracing::warn!(owner_id, service, error = %e, "webhook-triggered job failed to start");
                            "failed"
                        }
                    }
                }
            }
        };

        let event = WebhookEvent {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            service: service.to_string(),
            payload_hash,
            processing_status: processing_status.to_string(),
            actions_triggered: serde_json::to_string(&actions_triggered).unwrap_or_else(|_| "[]".into()),
            received_at: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        };
        self.store.create_webhook_event(&event)?;
        Ok(event)
    }

    /// Returns `Ok(false)` when the scrobbled item isn't in the mirror yet —
    /// that's not an error, just a race with a library sync that hasn't run.
    fn merge_scrobble(&self, owner_id: &str, server_id: &str, body: &[u8]) -> CuratorResult<bool> {
        let payload: MsScrobblePayload =
            serde_json::from_slice(body).map_err(|e| CuratorError::Validation(format!("bad scrobble payload: {e}")))?;
        let Some(existing) = self.store.find_media_item_by_external_id(server_id, &payload.external_id)? else {
            return Ok(false);
        };
        let incoming = MediaItemPatch {
            total_play_count: Some(1),
            complete_play_count: Some(if payload.percent_complete >= 0.9 { 1 } else { 0 }),
            partial_play_count: Some(if payload.percent_complete >= 0.9 { 0 } else { 1 }),
            avg_percent_complete: Some(payload.percent_complete),
            last_watched_at: Some(chrono::Utc::now().to_rfc3339()),
            history_synced_at: Some(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };
        let merged = merge_engagement(&existing, &incoming);
        self.store
            .upsert_media_item(owner_id, server_id, &payload.external_id, &merged)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_secret_matches_constant_time() {
        let dispatcher_secret = "super-secret";
        let ok = bool::from(dispatcher_secret.as_bytes().ct_eq(b"super-secret"));
        assert!(ok);
        let bad = bool::from(dispatcher_secret.as_bytes().ct_eq(b"wrong-secret"));
        assert!(!bad);
    }

    #[test]
    fn hmac_signature_roundtrips() {
        let secret = "super-secret";
        let body = b"{\"event\":\"deleted\"}";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());

        let mut verify_mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        verify_mac.update(body);
        let expected = hex::encode(verify_mac.finalize().into_bytes());
        assert_eq!(sig, expected);
    }

    #[test]
    fn scrobble_event_parses_from_envelope() {
        let body = br#"{"event":"media.scrobble","external_id":"abc","percent_complete":0.95}"#;
        let envelope: MsEventEnvelope = serde_json::from_slice(body).unwrap();
        assert_eq!(envelope.event, "media.scrobble");
        let payload: MsScrobblePayload = serde_json::from_slice(body).unwrap();
        assert_eq!(payload.external_id, "abc");
    }
}
