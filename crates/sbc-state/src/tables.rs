//! SQLite schema and column identifiers for the SBC state store.
//!
//! Identifiers that end up inside SQL text come only from the `&'static str`
//! constants below; user-provided values are always bound as parameters.

pub const PROXY_CONFIG: &str = "proxy_config";
pub const RELAY_CONFIG: &str = "relay_config";
pub const INSTANCE: &str = "instance";
pub const CERTIFICATE_AUTHORITY: &str = "certificate_authority";
pub const PORT_ALLOCATION: &str = "port_allocation";

/// Row id of the certificate authority singleton.
pub const CERTIFICATE_AUTHORITY_ROW: i64 = 1;

pub(crate) const SCHEMA: &str = "
CREATE TABLE proxy_config (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    instance_name     TEXT    NOT NULL UNIQUE,
    tls_port          INTEGER NOT NULL UNIQUE,
    udp_port          INTEGER NOT NULL UNIQUE,
    pbx_address       TEXT    NOT NULL,
    pbx_port          INTEGER NOT NULL,
    relay_port        INTEGER NOT NULL UNIQUE,
    host_ip           TEXT    NOT NULL DEFAULT '',
    regenerate_config INTEGER NOT NULL DEFAULT 0,
    packet_capture    INTEGER NOT NULL DEFAULT 0,
    container_id      TEXT    DEFAULT NULL
);

CREATE TABLE relay_config (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    media_min       INTEGER NOT NULL,
    media_max       INTEGER NOT NULL,
    media_public_ip TEXT    NOT NULL,
    listen_port     INTEGER NOT NULL,
    container_id    TEXT    DEFAULT NULL
);

CREATE TABLE certificate_authority (
    id           INTEGER PRIMARY KEY CHECK (id = 1),
    container_id TEXT    NOT NULL
);

CREATE TABLE instance (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    fqdn       TEXT    NOT NULL UNIQUE,
    created_at INTEGER NOT NULL,
    proxy_id   INTEGER NOT NULL UNIQUE
        REFERENCES proxy_config (id) ON DELETE CASCADE,
    relay_id   INTEGER NOT NULL UNIQUE
        REFERENCES relay_config (id) ON DELETE CASCADE
);
";

/// Every port ever handed out, keyed by the config row that received it.
///
/// Rows here outlive the config rows they describe, so allocation keeps
/// climbing after an instance is removed. Only an undo deletes them.
pub(crate) const ALLOCATION_SCHEMA: &str = "
CREATE TABLE port_allocation (
    table_name  TEXT    NOT NULL,
    column_name TEXT    NOT NULL,
    record_id   INTEGER NOT NULL,
    value       INTEGER NOT NULL,
    PRIMARY KEY (table_name, column_name, record_id)
);
";

pub(crate) const HIGH_WATER_SQL: &str =
    "SELECT MAX(value) FROM port_allocation WHERE table_name = ?1 AND column_name = ?2";

/// A numeric column that takes part in monotonic port allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortColumn {
    ProxyTls,
    ProxyUdp,
    ProxyRelayPort,
    RelayListen,
    RelayMediaMin,
    RelayMediaMax,
}

impl PortColumn {
    pub const ALL: [PortColumn; 6] = [
        PortColumn::ProxyTls,
        PortColumn::ProxyUdp,
        PortColumn::ProxyRelayPort,
        PortColumn::RelayListen,
        PortColumn::RelayMediaMin,
        PortColumn::RelayMediaMax,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            PortColumn::ProxyTls | PortColumn::ProxyUdp | PortColumn::ProxyRelayPort => {
                PROXY_CONFIG
            }
            PortColumn::RelayListen | PortColumn::RelayMediaMin | PortColumn::RelayMediaMax => {
                RELAY_CONFIG
            }
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            PortColumn::ProxyTls => "tls_port",
            PortColumn::ProxyUdp => "udp_port",
            PortColumn::ProxyRelayPort => "relay_port",
            PortColumn::RelayListen => "listen_port",
            PortColumn::RelayMediaMin => "media_min",
            PortColumn::RelayMediaMax => "media_max",
        }
    }

    /// Step added to the highest allocated value when allocating the next one.
    pub fn increment(&self) -> i64 {
        match self {
            PortColumn::RelayMediaMin | PortColumn::RelayMediaMax => 500,
            _ => 1,
        }
    }

    /// Copies the column's current values into the allocation log.
    pub(crate) fn seed_sql(&self) -> String {
        format!(
            "INSERT OR IGNORE INTO {PORT_ALLOCATION} (table_name, column_name, record_id, value) \
             SELECT '{table}', '{column}', id, {column} FROM {table}",
            table = self.table(),
            column = self.column(),
        )
    }
}
