//! StateStore — SQLite-backed persistence for SBC instances.
//!
//! Provides allocation of new instance records (with monotonic port
//! assignment), denormalized reads, container id bookkeeping, and the
//! delete/undo paths used by the orchestrator. The store supports both
//! on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};

use sbc_core::ContainerKind;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Thread-safe state store backed by SQLite.
#[derive(Clone)]
pub struct StateStore {
    conn: Arc<Mutex<Connection>>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let conn = Connection::open(path).map_err(|e| StateError::Unavailable(e.to_string()))?;
        let store = Self::with_connection(conn)?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| StateError::Unavailable(e.to_string()))?;
        let store = Self::with_connection(conn)?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn with_connection(conn: Connection) -> StateResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StateResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StateError::Unavailable("connection lock poisoned".to_string()))
    }

    /// Create all tables unless the instance table already exists.
    ///
    /// An existing schema is left untouched, except that a missing port
    /// allocation log is added and seeded from the stored config rows.
    pub fn ensure_schema(&self) -> StateResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        if table_exists(&tx, INSTANCE)? {
            debug!(table = INSTANCE, "schema already present, skipping creation");
        } else {
            tx.execute_batch(SCHEMA)?;
            info!("state store schema created");
        }

        if !table_exists(&tx, PORT_ALLOCATION)? {
            tx.execute_batch(ALLOCATION_SCHEMA)?;
            for column in PortColumn::ALL {
                tx.execute(&column.seed_sql(), [])?;
            }
            debug!(table = PORT_ALLOCATION, "port allocation log created");
        }

        tx.commit()?;
        Ok(())
    }

    // ── Allocation ─────────────────────────────────────────────────

    /// Validate a request, allocate its ports, and insert the proxy config,
    /// relay config, and instance rows (in that order).
    ///
    /// The three inserts share one transaction. Callers that fail later in
    /// provisioning must pass the returned ids to [`Self::undo_last_insert`].
    pub fn allocate_and_save(&self, request: &ProvisionRequest) -> StateResult<InsertedIds> {
        check_required_fields(request)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let proxy = insert_proxy_config(&tx, request)?;
        let relay = insert_relay_config(&tx, request)?;
        let instance = insert_instance(&tx, &request.fqdn, proxy, relay)?;
        tx.commit()?;

        let ids = InsertedIds {
            proxy,
            relay,
            instance,
        };
        info!(fqdn = %request.fqdn, ?ids, "instance configuration saved");
        Ok(ids)
    }

    /// Remove the rows written by one `allocate_and_save` call, including
    /// its port allocations, so the next call hands out the same ports.
    ///
    /// Every delete is attempted even if an earlier one fails; missing rows
    /// are ignored. Returns the first error encountered.
    pub fn undo_last_insert(&self, ids: &InsertedIds) -> StateResult<()> {
        let conn = self.conn()?;
        let mut first_error = None;

        for (table, id) in [
            (INSTANCE, ids.instance),
            (PROXY_CONFIG, ids.proxy),
            (RELAY_CONFIG, ids.relay),
        ] {
            match delete_row(&conn, table, id) {
                Ok(deleted) => debug!(table, id, deleted, "rolled back insert"),
                Err(e) => {
                    warn!(table, id, error = %e, "could not roll back insert");
                    first_error.get_or_insert(e);
                }
            }
        }

        for (table, id) in [(PROXY_CONFIG, ids.proxy), (RELAY_CONFIG, ids.relay)] {
            if let Err(e) = conn.execute(
                "DELETE FROM port_allocation WHERE table_name = ?1 AND record_id = ?2",
                params![table, id],
            ) {
                warn!(table, id, error = %e, "could not roll back port allocation");
                first_error.get_or_insert(e.into());
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// Denormalized view of an instance. Unknown ids yield an empty record.
    pub fn get_parameters(&self, instance_id: RecordId) -> StateResult<InstanceRecord> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT i.id, p.id, r.id, i.fqdn, p.instance_name, i.created_at, \
                        p.tls_port, p.udp_port, p.pbx_address, p.pbx_port, p.relay_port, \
                        p.host_ip, p.regenerate_config, p.packet_capture, \
                        r.media_min, r.media_max, r.media_public_ip, r.listen_port, \
                        p.container_id, r.container_id \
                 FROM instance i \
                 JOIN proxy_config p ON p.id = i.proxy_id \
                 JOIN relay_config r ON r.id = i.relay_id \
                 WHERE i.id = ?1",
                [instance_id],
                |row| {
                    Ok(InstanceRecord {
                        instance_id: row.get(0)?,
                        proxy_id: row.get(1)?,
                        relay_id: row.get(2)?,
                        fqdn: row.get(3)?,
                        name: row.get(4)?,
                        created_at: row.get::<_, i64>(5)?.max(0) as u64,
                        tls_port: row.get(6)?,
                        udp_port: row.get(7)?,
                        pbx_address: row.get(8)?,
                        pbx_port: row.get(9)?,
                        relay_port: row.get(10)?,
                        host_ip: row.get(11)?,
                        regenerate_config: row.get(12)?,
                        packet_capture: row.get(13)?,
                        media_min: row.get(14)?,
                        media_max: row.get(15)?,
                        media_public_ip: row.get(16)?,
                        relay_listen_port: row.get(17)?,
                        proxy_container_id: row.get(18)?,
                        relay_container_id: row.get(19)?,
                    })
                },
            )
            .optional()?;

        if record.is_none() {
            debug!(instance_id, "no instance with this id");
        }
        Ok(record.unwrap_or_default())
    }

    /// Resolve an instance id by fqdn.
    pub fn instance_id_for(&self, fqdn: &str) -> StateResult<Option<RecordId>> {
        let conn = self.conn()?;
        let id = conn
            .query_row("SELECT id FROM instance WHERE fqdn = ?1", [fqdn], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(id)
    }

    /// Proxy and relay container ids for an fqdn.
    ///
    /// `None` when the fqdn is unknown or either container id is unset.
    pub fn container_ids_for(&self, fqdn: &str) -> StateResult<Option<InstanceContainers>> {
        let conn = self.conn()?;
        let ids: Option<(Option<String>, Option<String>)> = conn
            .query_row(
                "SELECT p.container_id, r.container_id \
                 FROM instance i \
                 JOIN proxy_config p ON p.id = i.proxy_id \
                 JOIN relay_config r ON r.id = i.relay_id \
                 WHERE i.fqdn = ?1",
                [fqdn],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match ids {
            Some((Some(proxy), Some(relay))) if !proxy.is_empty() && !relay.is_empty() => {
                Ok(Some(InstanceContainers { proxy, relay }))
            }
            Some(_) => {
                debug!(%fqdn, "instance has no container ids recorded");
                Ok(None)
            }
            None => {
                debug!(%fqdn, "instance not found");
                Ok(None)
            }
        }
    }

    /// Every stored fqdn, in insertion order.
    pub fn all_fqdns(&self) -> StateResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT fqdn FROM instance ORDER BY id ASC")?;
        let fqdns = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(fqdns)
    }

    /// Container id of the certificate authority, or an empty string.
    pub fn certificate_authority_container_id(&self) -> StateResult<String> {
        let conn = self.conn()?;
        let id: Option<String> = conn
            .query_row(
                "SELECT container_id FROM certificate_authority ORDER BY id LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if id.is_none() {
            debug!("no certificate authority recorded");
        }
        Ok(id.unwrap_or_default())
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Record the engine id of a container.
    ///
    /// Proxy and relay rows must already exist. The certificate authority
    /// row is inserted when absent, since it is deleted on every reissue.
    pub fn save_container_id(
        &self,
        record_id: RecordId,
        kind: ContainerKind,
        container_id: &str,
    ) -> StateResult<()> {
        let table = match kind {
            ContainerKind::Proxy => PROXY_CONFIG,
            ContainerKind::Relay => RELAY_CONFIG,
            ContainerKind::CertificateAuthority => CERTIFICATE_AUTHORITY,
        };

        let conn = self.conn()?;
        let updated = conn.execute(
            &format!("UPDATE {table} SET container_id = ?1 WHERE id = ?2"),
            params![container_id, record_id],
        )?;

        if updated == 0 {
            if kind != ContainerKind::CertificateAuthority {
                return Err(StateError::NotFound(format!("{table} row {record_id}")));
            }
            conn.execute(
                "INSERT INTO certificate_authority (id, container_id) VALUES (?1, ?2)",
                params![record_id, container_id],
            )?;
        }

        debug!(table, record_id, %container_id, "container id saved");
        Ok(())
    }

    /// Delete an instance together with its proxy and relay config rows.
    /// Its ports stay in the allocation log and are never handed out again.
    /// Returns true if the instance existed.
    pub fn remove_instance(&self, fqdn: &str) -> StateResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let ids: Option<(RecordId, RecordId, RecordId)> = tx
            .query_row(
                "SELECT id, proxy_id, relay_id FROM instance WHERE fqdn = ?1",
                [fqdn],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((instance, proxy, relay)) = ids else {
            debug!(%fqdn, "instance not found, nothing to remove");
            return Ok(false);
        };

        delete_row(&tx, INSTANCE, instance)?;
        delete_row(&tx, PROXY_CONFIG, proxy)?;
        delete_row(&tx, RELAY_CONFIG, relay)?;
        tx.commit()?;

        info!(%fqdn, "instance removed from state store");
        Ok(true)
    }

    /// Delete the certificate authority row holding `container_id`.
    /// Returns true if it existed.
    pub fn remove_certificate_authority(&self, container_id: &str) -> StateResult<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM certificate_authority WHERE container_id = ?1",
            [container_id],
        )?;
        debug!(%container_id, deleted, "certificate authority record removed");
        Ok(deleted > 0)
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn check_required_fields(request: &ProvisionRequest) -> StateResult<()> {
    if request.pbx_address.trim().is_empty() {
        return Err(StateError::MissingField("pbx address"));
    }
    if request.fqdn.trim().is_empty() {
        return Err(StateError::MissingField("instance fqdn"));
    }
    if request.media_public_ip.trim().is_empty() {
        return Err(StateError::MissingField("media public ip"));
    }
    Ok(())
}

fn insert_proxy_config(conn: &Connection, request: &ProvisionRequest) -> StateResult<RecordId> {
    let defaults = &request.defaults;
    let tls_port = next_port(conn, PortColumn::ProxyTls, defaults.tls)?;
    let udp_port = next_port(conn, PortColumn::ProxyUdp, defaults.udp)?;
    let relay_port = next_port(conn, PortColumn::ProxyRelayPort, defaults.relay_signal)?;

    conn.execute(
        "INSERT INTO proxy_config \
         (instance_name, tls_port, udp_port, pbx_address, pbx_port, relay_port, \
          host_ip, regenerate_config, packet_capture) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            request.fqdn,
            tls_port,
            udp_port,
            request.pbx_address,
            request.pbx_port,
            relay_port,
            request.host_ip,
            request.regenerate_config,
            request.packet_capture,
        ],
    )?;

    let id = conn.last_insert_rowid();
    record_allocation(conn, PortColumn::ProxyTls, id, tls_port)?;
    record_allocation(conn, PortColumn::ProxyUdp, id, udp_port)?;
    record_allocation(conn, PortColumn::ProxyRelayPort, id, relay_port)?;
    debug!(id, tls_port, udp_port, relay_port, "proxy configuration inserted");
    Ok(id)
}

fn insert_relay_config(conn: &Connection, request: &ProvisionRequest) -> StateResult<RecordId> {
    let defaults = &request.defaults;
    let listen_port = next_port(conn, PortColumn::RelayListen, defaults.relay_signal)?;
    let media_min = next_port(conn, PortColumn::RelayMediaMin, defaults.media_min)?;
    let media_max = next_port(conn, PortColumn::RelayMediaMax, defaults.media_max)?;

    conn.execute(
        "INSERT INTO relay_config (media_min, media_max, media_public_ip, listen_port) \
         VALUES (?1, ?2, ?3, ?4)",
        params![media_min, media_max, request.media_public_ip, listen_port],
    )?;

    let id = conn.last_insert_rowid();
    record_allocation(conn, PortColumn::RelayListen, id, listen_port)?;
    record_allocation(conn, PortColumn::RelayMediaMin, id, media_min)?;
    record_allocation(conn, PortColumn::RelayMediaMax, id, media_max)?;
    debug!(id, media_min, media_max, listen_port, "relay configuration inserted");
    Ok(id)
}

fn insert_instance(
    conn: &Connection,
    fqdn: &str,
    proxy: RecordId,
    relay: RecordId,
) -> StateResult<RecordId> {
    conn.execute(
        "INSERT INTO instance (fqdn, created_at, proxy_id, relay_id) VALUES (?1, ?2, ?3, ?4)",
        params![fqdn, epoch_secs() as i64, proxy, relay],
    )?;
    let id = conn.last_insert_rowid();
    debug!(id, %fqdn, "instance inserted");
    Ok(id)
}

fn table_exists(conn: &Connection, table: &str) -> StateResult<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Next value for a port column: the highest value ever allocated plus the
/// column's increment, or `default` when nothing was allocated yet.
fn next_port(conn: &Connection, column: PortColumn, default: u16) -> StateResult<u16> {
    let highest: Value = conn.query_row(
        HIGH_WATER_SQL,
        params![column.table(), column.column()],
        |row| row.get(0),
    )?;

    if matches!(highest, Value::Null) {
        debug!(table = column.table(), column = column.column(), default, "no allocations yet, using default");
        return Ok(default);
    }

    let next = parse_stored(column, highest)? + column.increment();
    u16::try_from(next).map_err(|_| StateError::PortExhausted {
        table: column.table(),
        column: column.column(),
        next,
    })
}

/// Stored port values are read back as integers or numeric text.
/// Anything else means the database was modified outside this store.
fn parse_stored(column: PortColumn, value: Value) -> StateResult<i64> {
    let corrupt = |value: String| StateError::Corrupt {
        table: column.table(),
        column: column.column(),
        value,
    };

    match value {
        Value::Integer(n) => Ok(n),
        Value::Text(text) => match text.trim().parse::<i64>() {
            Ok(n) => Ok(n),
            Err(_) => Err(corrupt(text)),
        },
        other => Err(corrupt(format!("{other:?}"))),
    }
}

fn record_allocation(
    conn: &Connection,
    column: PortColumn,
    record_id: RecordId,
    value: u16,
) -> StateResult<()> {
    conn.execute(
        "INSERT INTO port_allocation (table_name, column_name, record_id, value) \
         VALUES (?1, ?2, ?3, ?4)",
        params![column.table(), column.column(), record_id, value],
    )?;
    Ok(())
}

fn delete_row(conn: &Connection, table: &'static str, id: RecordId) -> StateResult<usize> {
    let deleted = conn.execute(&format!("DELETE FROM {table} WHERE id = ?1"), [id])?;
    Ok(deleted)
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbc_core::config::PortDefaults;
    use std::collections::HashSet;

    fn test_store() -> StateStore {
        StateStore::open_in_memory().unwrap()
    }

    fn request(fqdn: &str) -> ProvisionRequest {
        let mut req = ProvisionRequest::new(fqdn, "192.168.1.10", "203.0.113.7");
        req.host_ip = "192.168.10.1".to_string();
        req
    }

    fn provision(store: &StateStore, fqdn: &str) -> InstanceRecord {
        let ids = store.allocate_and_save(&request(fqdn)).unwrap();
        store.get_parameters(ids.instance).unwrap()
    }

    fn row_count(store: &StateStore, table: &str) -> i64 {
        let conn = store.conn().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    // ── Schema ─────────────────────────────────────────────────────

    #[test]
    fn ensure_schema_is_idempotent() {
        let store = test_store();
        provision(&store, "a.example.com");

        store.ensure_schema().unwrap();
        store.ensure_schema().unwrap();

        assert_eq!(store.all_fqdns().unwrap(), vec!["a.example.com"]);
    }

    // ── Allocation ─────────────────────────────────────────────────

    #[test]
    fn first_record_uses_defaults() {
        let store = test_store();
        let record = provision(&store, "a.example.com");

        assert_eq!(record.fqdn, "a.example.com");
        assert_eq!(record.name, "a.example.com");
        assert_eq!(record.tls_port, 5061);
        assert_eq!(record.udp_port, 5060);
        assert_eq!(record.relay_port, 20001);
        assert_eq!(record.media_min, 20501);
        assert_eq!(record.media_max, 21000);
        assert_eq!(record.relay_listen_port, 20001);
        assert_eq!(record.pbx_address, "192.168.1.10");
        assert_eq!(record.pbx_port, 5060);
        assert_eq!(record.media_public_ip, "203.0.113.7");
        assert_eq!(record.host_ip, "192.168.10.1");
        assert!(record.regenerate_config);
        assert!(!record.packet_capture);
        assert_eq!(record.proxy_container_id, None);
        assert!(record.created_at > 0);
    }

    #[test]
    fn second_record_increments_from_previous() {
        let store = test_store();
        provision(&store, "a.example.com");
        let second = provision(&store, "b.example.com");

        assert_eq!(second.tls_port, 5062);
        assert_eq!(second.udp_port, 5061);
        assert_eq!(second.relay_port, 20002);
        assert_eq!(second.media_min, 21001);
        assert_eq!(second.media_max, 21500);
        assert_eq!(second.relay_listen_port, 20002);
    }

    #[test]
    fn allocated_ports_are_pairwise_distinct() {
        let store = test_store();
        let records: Vec<InstanceRecord> = (0..8)
            .map(|i| provision(&store, &format!("sbc{i}.example.com")))
            .collect();

        let distinct = |f: fn(&InstanceRecord) -> u16| {
            records.iter().map(f).collect::<HashSet<_>>().len()
        };
        assert_eq!(distinct(|r| r.tls_port), records.len());
        assert_eq!(distinct(|r| r.udp_port), records.len());
        assert_eq!(distinct(|r| r.media_min), records.len());
        assert_eq!(distinct(|r| r.media_max), records.len());

        for pair in records.windows(2) {
            assert!(pair[1].media_min > pair[0].media_max);
        }
    }

    #[test]
    fn configured_defaults_only_apply_to_first_record() {
        let store = test_store();
        let mut req = request("a.example.com");
        req.defaults = PortDefaults {
            tls: 7061,
            udp: 7060,
            pbx: 5060,
            relay_signal: 30001,
            media_min: 40000,
            media_max: 40499,
        };
        let ids = store.allocate_and_save(&req).unwrap();
        let first = store.get_parameters(ids.instance).unwrap();
        assert_eq!(first.tls_port, 7061);
        assert_eq!(first.media_min, 40000);

        // The second request carries stock defaults, which must be ignored.
        let second = provision(&store, "b.example.com");
        assert_eq!(second.tls_port, 7062);
        assert_eq!(second.media_min, 40500);
        assert_eq!(second.media_max, 40999);
    }

    #[test]
    fn missing_required_fields_are_rejected() {
        let store = test_store();

        let mut req = request("a.example.com");
        req.pbx_address.clear();
        assert!(matches!(
            store.allocate_and_save(&req),
            Err(StateError::MissingField("pbx address"))
        ));

        let mut req = request("");
        req.fqdn = " ".to_string();
        assert!(matches!(
            store.allocate_and_save(&req),
            Err(StateError::MissingField("instance fqdn"))
        ));

        let mut req = request("a.example.com");
        req.media_public_ip.clear();
        assert!(matches!(
            store.allocate_and_save(&req),
            Err(StateError::MissingField("media public ip"))
        ));

        assert_eq!(row_count(&store, PROXY_CONFIG), 0);
    }

    #[test]
    fn duplicate_fqdn_violates_constraint_without_partial_rows() {
        let store = test_store();
        provision(&store, "a.example.com");

        let err = store.allocate_and_save(&request("a.example.com")).unwrap_err();
        assert!(matches!(err, StateError::Constraint(_)));

        assert_eq!(row_count(&store, PROXY_CONFIG), 1);
        assert_eq!(row_count(&store, RELAY_CONFIG), 1);
        assert_eq!(row_count(&store, INSTANCE), 1);
    }

    #[test]
    fn port_overflow_is_reported() {
        let store = test_store();
        let mut req = request("a.example.com");
        req.defaults.media_min = 65000;
        req.defaults.media_max = 65499;
        store.allocate_and_save(&req).unwrap();

        let err = store.allocate_and_save(&request("b.example.com")).unwrap_err();
        assert!(matches!(
            err,
            StateError::PortExhausted { column: "media_min", next: 65500, .. }
        ));
    }

    // ── Undo ───────────────────────────────────────────────────────

    #[test]
    fn undo_restores_previous_rows() {
        let store = test_store();
        provision(&store, "a.example.com");

        let ids = store.allocate_and_save(&request("b.example.com")).unwrap();
        store.undo_last_insert(&ids).unwrap();

        assert_eq!(store.all_fqdns().unwrap(), vec!["a.example.com"]);
        assert_eq!(row_count(&store, PROXY_CONFIG), 1);
        assert_eq!(row_count(&store, RELAY_CONFIG), 1);
        assert_eq!(row_count(&store, PORT_ALLOCATION), 6);

        // An undone insert never happened, so its ports were never allocated.
        let again = provision(&store, "b.example.com");
        assert_eq!(again.tls_port, 5062);
        assert_eq!(again.media_min, 21001);
    }

    #[test]
    fn undo_is_idempotent_and_tolerates_unset_ids() {
        let store = test_store();
        let ids = store.allocate_and_save(&request("a.example.com")).unwrap();

        store.undo_last_insert(&ids).unwrap();
        store.undo_last_insert(&ids).unwrap();
        store.undo_last_insert(&InsertedIds::default()).unwrap();

        assert!(store.all_fqdns().unwrap().is_empty());
        assert_eq!(row_count(&store, PROXY_CONFIG), 0);
        assert_eq!(row_count(&store, RELAY_CONFIG), 0);
        assert_eq!(row_count(&store, PORT_ALLOCATION), 0);
    }

    // ── Lookups ────────────────────────────────────────────────────

    #[test]
    fn unknown_instance_yields_empty_record() {
        let store = test_store();
        let record = store.get_parameters(42).unwrap();
        assert!(record.is_empty());
        assert_eq!(record, InstanceRecord::default());
    }

    #[test]
    fn container_ids_for_unknown_fqdn_is_none() {
        let store = test_store();
        assert_eq!(store.container_ids_for("nope.example.com").unwrap(), None);
    }

    #[test]
    fn container_ids_require_both_containers() {
        let store = test_store();
        let record = provision(&store, "a.example.com");
        assert_eq!(store.container_ids_for("a.example.com").unwrap(), None);

        store
            .save_container_id(record.relay_id, ContainerKind::Relay, "relay-1")
            .unwrap();
        assert_eq!(store.container_ids_for("a.example.com").unwrap(), None);

        store
            .save_container_id(record.proxy_id, ContainerKind::Proxy, "proxy-1")
            .unwrap();
        let ids = store.container_ids_for("a.example.com").unwrap().unwrap();
        assert_eq!(ids.ids(), ["proxy-1", "relay-1"]);

        let record = store.get_parameters(record.instance_id).unwrap();
        assert_eq!(record.proxy_container_id.as_deref(), Some("proxy-1"));
        assert_eq!(record.relay_container_id.as_deref(), Some("relay-1"));
    }

    #[test]
    fn all_fqdns_in_insertion_order() {
        let store = test_store();
        provision(&store, "z.example.com");
        provision(&store, "a.example.com");
        provision(&store, "m.example.com");

        assert_eq!(
            store.all_fqdns().unwrap(),
            vec!["z.example.com", "a.example.com", "m.example.com"]
        );
    }

    #[test]
    fn instance_id_for_resolves_by_fqdn() {
        let store = test_store();
        let record = provision(&store, "a.example.com");
        assert_eq!(
            store.instance_id_for("a.example.com").unwrap(),
            Some(record.instance_id)
        );
        assert_eq!(store.instance_id_for("b.example.com").unwrap(), None);
    }

    // ── Container ids ──────────────────────────────────────────────

    #[test]
    fn save_container_id_updates_in_place() {
        let store = test_store();
        let record = provision(&store, "a.example.com");

        store
            .save_container_id(record.proxy_id, ContainerKind::Proxy, "first")
            .unwrap();
        store
            .save_container_id(record.proxy_id, ContainerKind::Proxy, "second")
            .unwrap();

        let record = store.get_parameters(record.instance_id).unwrap();
        assert_eq!(record.proxy_container_id.as_deref(), Some("second"));
        assert_eq!(row_count(&store, PROXY_CONFIG), 1);
    }

    #[test]
    fn save_container_id_for_missing_config_row_fails() {
        let store = test_store();
        let err = store
            .save_container_id(99, ContainerKind::Relay, "relay-x")
            .unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    #[test]
    fn certificate_authority_singleton_lifecycle() {
        let store = test_store();
        assert_eq!(store.certificate_authority_container_id().unwrap(), "");

        store
            .save_container_id(CERTIFICATE_AUTHORITY_ROW, ContainerKind::CertificateAuthority, "ca-1")
            .unwrap();
        assert_eq!(store.certificate_authority_container_id().unwrap(), "ca-1");

        store
            .save_container_id(CERTIFICATE_AUTHORITY_ROW, ContainerKind::CertificateAuthority, "ca-2")
            .unwrap();
        assert_eq!(store.certificate_authority_container_id().unwrap(), "ca-2");
        assert_eq!(row_count(&store, CERTIFICATE_AUTHORITY), 1);

        assert!(!store.remove_certificate_authority("ca-1").unwrap());
        assert!(store.remove_certificate_authority("ca-2").unwrap());
        assert_eq!(store.certificate_authority_container_id().unwrap(), "");

        // Recreated with the same fixed row id on the next issue.
        store
            .save_container_id(CERTIFICATE_AUTHORITY_ROW, ContainerKind::CertificateAuthority, "ca-3")
            .unwrap();
        assert_eq!(store.certificate_authority_container_id().unwrap(), "ca-3");
    }

    #[test]
    fn certificate_authority_rejects_second_row() {
        let store = test_store();
        store
            .save_container_id(CERTIFICATE_AUTHORITY_ROW, ContainerKind::CertificateAuthority, "ca-1")
            .unwrap();
        let err = store
            .save_container_id(2, ContainerKind::CertificateAuthority, "ca-2")
            .unwrap_err();
        assert!(matches!(err, StateError::Constraint(_)));
    }

    // ── Removal ────────────────────────────────────────────────────

    #[test]
    fn remove_instance_cascades_to_config_rows() {
        let store = test_store();
        let a = provision(&store, "a.example.com");
        provision(&store, "b.example.com");
        store.save_container_id(a.proxy_id, ContainerKind::Proxy, "p").unwrap();
        store.save_container_id(a.relay_id, ContainerKind::Relay, "r").unwrap();

        assert!(store.remove_instance("a.example.com").unwrap());

        assert_eq!(store.container_ids_for("a.example.com").unwrap(), None);
        assert_eq!(store.all_fqdns().unwrap(), vec!["b.example.com"]);
        assert_eq!(row_count(&store, PROXY_CONFIG), 1);
        assert_eq!(row_count(&store, RELAY_CONFIG), 1);
        assert!(store.get_parameters(a.instance_id).unwrap().is_empty());
    }

    #[test]
    fn removed_instance_ports_are_never_reused() {
        let store = test_store();
        provision(&store, "a.example.com");
        let b = provision(&store, "b.example.com");

        assert!(store.remove_instance("b.example.com").unwrap());
        let c = provision(&store, "c.example.com");

        assert!(c.tls_port > b.tls_port);
        assert!(c.udp_port > b.udp_port);
        assert!(c.relay_port > b.relay_port);
        assert!(c.relay_listen_port > b.relay_listen_port);
        assert!(c.media_min > b.media_max);
        assert_eq!((c.tls_port, c.media_min, c.media_max), (5063, 21501, 22000));
    }

    #[test]
    fn emptied_store_keeps_counting() {
        let store = test_store();
        provision(&store, "a.example.com");
        assert!(store.remove_instance("a.example.com").unwrap());
        assert!(store.all_fqdns().unwrap().is_empty());

        let b = provision(&store, "b.example.com");
        assert_eq!(b.tls_port, 5062);
        assert_eq!(b.udp_port, 5061);
        assert_eq!(b.media_min, 21001);
    }

    #[test]
    fn remove_unknown_instance_is_noop() {
        let store = test_store();
        provision(&store, "a.example.com");
        assert!(!store.remove_instance("b.example.com").unwrap());
        assert_eq!(row_count(&store, INSTANCE), 1);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("sbc.db");

        {
            let store = StateStore::open(&db_path).unwrap();
            provision(&store, "a.example.com");
        }

        let store = StateStore::open(&db_path).unwrap();
        assert_eq!(store.all_fqdns().unwrap(), vec!["a.example.com"]);
        let next = provision(&store, "b.example.com");
        assert_eq!(next.tls_port, 5062);
    }

    #[test]
    fn corrupt_port_value_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("sbc.db");
        let store = StateStore::open(&db_path).unwrap();
        provision(&store, "a.example.com");

        let raw = Connection::open(&db_path).unwrap();
        raw.execute(
            "UPDATE port_allocation SET value = 'not-a-port' WHERE column_name = 'tls_port'",
            [],
        )
        .unwrap();
        drop(raw);

        let err = store.allocate_and_save(&request("b.example.com")).unwrap_err();
        match err {
            StateError::Corrupt { table, column, value } => {
                assert_eq!(table, PROXY_CONFIG);
                assert_eq!(column, "tls_port");
                assert_eq!(value, "not-a-port");
            }
            other => panic!("expected corrupt value error, got {other:?}"),
        }
        assert_eq!(store.all_fqdns().unwrap(), vec!["a.example.com"]);
    }

    #[test]
    fn allocation_log_is_seeded_for_existing_databases() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("sbc.db");

        // A database written before the allocation log existed.
        let raw = Connection::open(&db_path).unwrap();
        raw.execute_batch(SCHEMA).unwrap();
        raw.execute_batch(
            "INSERT INTO proxy_config (instance_name, tls_port, udp_port, pbx_address, pbx_port, relay_port) \
                 VALUES ('a.example.com', 5061, 5060, '192.168.1.10', 5060, 20001), \
                        ('b.example.com', 5062, 5061, '192.168.1.10', 5060, 20002); \
             INSERT INTO relay_config (media_min, media_max, media_public_ip, listen_port) \
                 VALUES (20501, 21000, '203.0.113.7', 20001), \
                        (21001, 21500, '203.0.113.7', 20002); \
             INSERT INTO instance (fqdn, created_at, proxy_id, relay_id) \
                 VALUES ('a.example.com', 1, 1, 1), ('b.example.com', 2, 2, 2);",
        )
        .unwrap();
        drop(raw);

        let store = StateStore::open(&db_path).unwrap();
        assert_eq!(row_count(&store, PORT_ALLOCATION), 12);

        assert!(store.remove_instance("b.example.com").unwrap());
        let c = provision(&store, "c.example.com");
        assert_eq!(c.tls_port, 5063);
        assert_eq!(c.media_min, 21501);
    }
}
