use rusqlite::Connection;

/// Ordered list of DDL statements for the mirror schema. Every statement is
/// idempotent (`IF NOT EXISTS`), following the teacher's `migrations.rs`
/// convention, so it's safe to run on every startup.
const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_migrations (
        id         TEXT PRIMARY KEY,
        applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
    );",
    "CREATE TABLE IF NOT EXISTS servers (
        id                       TEXT PRIMARY KEY,
        owner_id                 TEXT NOT NULL,
        name                     TEXT NOT NULL,
        machine_id               TEXT NOT NULL,
        platform                 TEXT,
        version                  TEXT,
        status                   TEXT NOT NULL DEFAULT 'offline' CHECK(status IN ('online','offline','error')),
        auth_token_ciphertext    TEXT NOT NULL DEFAULT '',
        webhook_secret           TEXT NOT NULL,
        preferred_connection_url TEXT,
        connection_latency_ms    INTEGER,
        connection_tested_at     TEXT,
        last_full_sync_at        TEXT,
        created_at               TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
        updated_at               TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
        UNIQUE(owner_id, machine_id)
    );",
    "CREATE TABLE IF NOT EXISTS integrations (
        id                  TEXT PRIMARY KEY,
        owner_id            TEXT NOT NULL,
        server_id           TEXT NOT NULL REFERENCES servers(id) ON DELETE CASCADE,
        service             TEXT NOT NULL CHECK(service IN ('ahs','tdl','mdl','rqp')),
        name                TEXT NOT NULL,
        base_url            TEXT NOT NULL,
        api_key_ciphertext  TEXT NOT NULL DEFAULT '',
        status              TEXT NOT NULL DEFAULT 'inactive' CHECK(status IN ('inactive','active','error')),
        consecutive_failures INTEGER NOT NULL DEFAULT 0,
        last_failure_at     TEXT,
        last_sync_at        TEXT,
        created_at          TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
        updated_at          TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
        UNIQUE(owner_id, service, name)
    );",
    "CREATE TABLE IF NOT EXISTS media_items (
        id                TEXT PRIMARY KEY,
        owner_id          TEXT NOT NULL,
        server_id         TEXT NOT NULL REFERENCES servers(id) ON DELETE CASCADE,
        external_id       TEXT NOT NULL,
        kind              TEXT NOT NULL CHECK(kind IN ('movie','show','season','episode')),
        title             TEXT NOT NULL,
        year              INTEGER,
        runtime_minutes   INTEGER,

        tmdb_id           TEXT,
        tvdb_id           TEXT,
        imdb_id           TEXT,
        tdl_series_id     TEXT,
        mdl_movie_id      TEXT,

        library_section   TEXT,
        genres            TEXT NOT NULL DEFAULT '[]',
        collections       TEXT NOT NULL DEFAULT '[]',
        rating            REAL,

        grandparent_title TEXT,
        parent_title      TEXT,
        season_number     INTEGER,
        episode_number    INTEGER,

        video_resolution  TEXT,
        video_codec       TEXT,
        audio_codec       TEXT,
        container         TEXT,
        bitrate_kbps      INTEGER,

        file_path         TEXT,
        file_size_bytes   INTEGER NOT NULL DEFAULT 0,
        accessible        INTEGER NOT NULL DEFAULT 1,

        total_play_count           INTEGER NOT NULL DEFAULT 0,
        complete_play_count        INTEGER NOT NULL DEFAULT 0,
        partial_play_count         INTEGER NOT NULL DEFAULT 0,
        avg_percent_complete       REAL,
        last_watched_at            TEXT,
        total_watch_time_seconds   INTEGER NOT NULL DEFAULT 0,

        added_at          TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
        updated_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
        history_synced_at TEXT,
        UNIQUE(server_id, external_id)
    );",
    "CREATE INDEX IF NOT EXISTS idx_media_items_owner ON media_items(owner_id);",
    "CREATE INDEX IF NOT EXISTS idx_media_items_show ON media_items(owner_id, grandparent_title);",
    "CREATE INDEX IF NOT EXISTS idx_media_items_accessible ON media_items(owner_id, accessible);",
    "CREATE TABLE IF NOT EXISTS deletion_rules (
        id                        TEXT PRIMARY KEY,
        owner_id                  TEXT NOT NULL,
        name                      TEXT NOT NULL,
        enabled                   INTEGER NOT NULL DEFAULT 1,
        dry_run_mode              INTEGER NOT NULL DEFAULT 1,
        grace_period_days         INTEGER NOT NULL DEFAULT 0,
        inactivity_threshold_days INTEGER NOT NULL DEFAULT 0,
        min_rating                REAL,
        excluded_kinds            TEXT NOT NULL DEFAULT '[]',
        excluded_libraries        TEXT NOT NULL DEFAULT '[]',
        excluded_genres           TEXT NOT NULL DEFAULT '[]',
        excluded_collections      TEXT NOT NULL DEFAULT '[]',
        created_by                TEXT NOT NULL,
        last_run_at               TEXT,
        created_at                TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
        updated_at                TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
    );",
    "CREATE TABLE IF NOT EXISTS deletion_events (
        id                   TEXT PRIMARY KEY,
        owner_id             TEXT NOT NULL,
        rule_id              TEXT,
        media_item_id        TEXT NOT NULL,
        title                TEXT NOT NULL,
        kind                 TEXT NOT NULL,
        file_size_bytes      INTEGER NOT NULL DEFAULT 0,
        file_path            TEXT,
        reason               TEXT NOT NULL DEFAULT '',
        score                REAL NOT NULL DEFAULT 0,
        deleted_from_ms      INTEGER NOT NULL DEFAULT 0,
        deleted_from_ms_at   TEXT,
        deleted_from_tdl     INTEGER NOT NULL DEFAULT 0,
        deleted_from_tdl_at  TEXT,
        deleted_from_mdl     INTEGER NOT NULL DEFAULT 0,
        deleted_from_mdl_at  TEXT,
        deleted_from_rqp     INTEGER NOT NULL DEFAULT 0,
        deleted_from_rqp_at  TEXT,
        dry_run              INTEGER NOT NULL DEFAULT 0,
        status               TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending','completed','partial','failed')),
        actor                TEXT NOT NULL DEFAULT '',
        deleted_at           TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
        error_message        TEXT
    );",
    "CREATE INDEX IF NOT EXISTS idx_deletion_events_owner ON deletion_events(owner_id, deleted_at DESC);",
    "CREATE TABLE IF NOT EXISTS sync_events (
        id             TEXT PRIMARY KEY,
        owner_id       TEXT NOT NULL,
        kind           TEXT NOT NULL CHECK(kind IN ('library_sync','history_sync')),
        trigger        TEXT NOT NULL CHECK(trigger IN ('manual','scheduled','webhook')),
        items_created  INTEGER NOT NULL DEFAULT 0,
        items_updated  INTEGER NOT NULL DEFAULT 0,
        items_failed   INTEGER NOT NULL DEFAULT 0,
        status         TEXT NOT NULL DEFAULT 'running',
        error_message  TEXT,
        started_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
        finished_at    TEXT
    );",
    "CREATE TABLE IF NOT EXISTS webhook_events (
        id                 TEXT PRIMARY KEY,
        owner_id           TEXT NOT NULL,
        service            TEXT NOT NULL,
        payload_hash       TEXT NOT NULL,
        processing_status  TEXT NOT NULL,
        actions_triggered  TEXT NOT NULL DEFAULT '[]',
        received_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
    );",
    "CREATE TABLE IF NOT EXISTS job_schedules (
        owner_id       TEXT NOT NULL,
        kind           TEXT NOT NULL,
        interval_hours INTEGER NOT NULL,
        next_run_at    TEXT NOT NULL,
        last_run_at    TEXT,
        last_status    TEXT,
        last_error     TEXT,
        run_count      INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (owner_id, kind)
    );",
    "CREATE TABLE IF NOT EXISTS system_config (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );",
];

pub fn run(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    for stmt in MIGRATIONS {
        conn.execute_batch(stmt)?;
    }
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (id) VALUES ('v1-initial')",
        [],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
