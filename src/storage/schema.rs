pub const CREATE_KV_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS kv (
        key TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
";

pub const UPSERT_KV: &str = "
    INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?)
    ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
";

pub const SELECT_KV: &str = "SELECT value FROM kv WHERE key = ?";

pub const DELETE_KV: &str = "DELETE FROM kv WHERE key = ?";
