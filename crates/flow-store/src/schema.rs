pub const MIG_0001_INIT: &str = r#"
BEGIN IMMEDIATE;

CREATE TABLE IF NOT EXISTS flows (
  flow_pk          INTEGER PRIMARY KEY AUTOINCREMENT,
  ts               REAL NOT NULL,
  unique_id        TEXT NOT NULL UNIQUE,
  source_ip        TEXT NOT NULL,
  source_port      INTEGER NOT NULL CHECK (source_port BETWEEN 0 AND 65535),
  destination_ip   TEXT NOT NULL,
  destination_port INTEGER NOT NULL CHECK (destination_port BETWEEN 0 AND 65535),
  protocol         TEXT NOT NULL,
  service          TEXT NOT NULL,
  duration         REAL,
  bytes_sent       INTEGER,
  bytes_received   INTEGER,
  conn_state       TEXT NOT NULL,
  extra_fields     TEXT NOT NULL DEFAULT '{}',
  ingested_at      INTEGER NOT NULL DEFAULT (CAST(strftime('%s','now') AS INTEGER))
);

CREATE TABLE IF NOT EXISTS alerts (
  alert_pk         INTEGER PRIMARY KEY AUTOINCREMENT,
  ts               REAL NOT NULL,
  unique_id        TEXT NOT NULL UNIQUE,
  source_ip        TEXT NOT NULL,
  destination_ip   TEXT NOT NULL,
  signature_id     INTEGER NOT NULL,
  signature        TEXT NOT NULL,
  severity         INTEGER NOT NULL,
  payload          TEXT NOT NULL,
  ingested_at      INTEGER NOT NULL DEFAULT (CAST(strftime('%s','now') AS INTEGER))
);

CREATE TABLE IF NOT EXISTS ingest_meta (
  key              TEXT PRIMARY KEY,
  value            TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_flows_ts ON flows(ts);
CREATE INDEX IF NOT EXISTS idx_flows_service ON flows(service, ts);
CREATE INDEX IF NOT EXISTS idx_flows_source ON flows(source_ip);
CREATE INDEX IF NOT EXISTS idx_alerts_ts ON alerts(ts);
CREATE INDEX IF NOT EXISTS idx_alerts_source ON alerts(source_ip);

COMMIT;
"#
;
