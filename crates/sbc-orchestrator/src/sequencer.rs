//! Sequencer — ordered state store and container engine operations for
//! SBC instances.
//!
//! Every operation runs to completion before returning. Engine calls are
//! issued one at a time because each step depends on the previous one
//! (a proxy must not start before certificates exist).

use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use sbc_core::{CERTIFICATE_VOLUME, ContainerKind, Fqdn};
use sbc_engine::{ContainerEngine, ContainerSpec, RemoveOptions};
use sbc_state::tables::CERTIFICATE_AUTHORITY_ROW;
use sbc_state::{InsertedIds, InstanceRecord, ProvisionRequest, RecordId, StateStore};

use crate::certificates::certificate_authority_spec;
use crate::error::{OrchestratorError, OrchestratorResult, engine_err};
use crate::infra::{proxy_spec, relay_spec};
use crate::settings::Settings;

/// Result of listing every stored instance.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListReport {
    pub instances: Vec<InstanceRecord>,
    /// Fqdns whose records could not be read.
    pub skipped: Vec<String>,
}

/// Whether the shared certificate volume goes away with a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateVolume {
    Keep,
    Remove,
}

const FORCE_WITH_ANONYMOUS_VOLUMES: RemoveOptions = RemoveOptions {
    force: true,
    volumes: true,
};

const FORCE_KEEP_VOLUMES: RemoveOptions = RemoveOptions {
    force: true,
    volumes: false,
};

pub struct Sequencer<E> {
    store: StateStore,
    engine: E,
    settings: Settings,
}

impl<E> Sequencer<E> {
    pub fn new(store: StateStore, engine: E, settings: Settings) -> Self {
        Self {
            store,
            engine,
            settings,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    // ── Reporting ──────────────────────────────────────────────────

    /// Every readable instance record. Unreadable entries are logged and
    /// reported as skipped.
    pub fn list(&self) -> OrchestratorResult<ListReport> {
        let mut report = ListReport::default();

        for fqdn in self.store.all_fqdns()? {
            let record = self
                .store
                .instance_id_for(&fqdn)
                .and_then(|id| id.map(|id| self.store.get_parameters(id)).transpose());

            match record {
                Ok(Some(record)) if !record.is_empty() => report.instances.push(record),
                Ok(_) => {
                    warn!(%fqdn, "instance vanished while listing");
                    report.skipped.push(fqdn);
                }
                Err(e) => {
                    warn!(%fqdn, error = %e, "could not read instance");
                    report.skipped.push(fqdn);
                }
            }
        }

        debug!(
            instances = report.instances.len(),
            skipped = report.skipped.len(),
            "instances listed"
        );
        Ok(report)
    }
}

impl<E: ContainerEngine> Sequencer<E> {
    // ── Provision ──────────────────────────────────────────────────

    /// Store a new instance, reissue the certificate authority to cover it,
    /// then create and start its relay and proxy.
    ///
    /// On failure every row and container created by this call is removed.
    pub async fn provision(&self, request: &ProvisionRequest) -> OrchestratorResult<InstanceRecord> {
        let fqdn = Fqdn::parse(&request.fqdn)?;
        let mut request = request.clone();
        request.fqdn = fqdn.to_string();

        self.store.ensure_schema()?;
        let ids = self.store.allocate_and_save(&request)?;
        info!(%fqdn, instance_id = ids.instance, "provisioning instance");

        let record = match self.store.get_parameters(ids.instance) {
            Ok(record) => record,
            Err(e) => {
                self.rollback(&ids);
                return Err(e.into());
            }
        };

        if let Err(e) = self.reissue_certificates().await {
            error!(%fqdn, error = %e, "certificate step failed");
            self.rollback(&ids);
            return Err(e);
        }

        let mut created = Vec::new();
        if let Err(e) = self.deploy_infra(&record, &mut created).await {
            error!(%fqdn, error = %e, "infrastructure step failed");
            for id in &created {
                if let Err(cleanup) = self
                    .destroy_container_with_volumes(id, CertificateVolume::Keep)
                    .await
                {
                    warn!(%id, error = %cleanup, "could not discard container");
                }
            }
            self.rollback(&ids);
            return Err(e);
        }

        let record = self.store.get_parameters(ids.instance)?;
        info!(
            %fqdn,
            tls_port = record.tls_port,
            udp_port = record.udp_port,
            media_min = record.media_min,
            media_max = record.media_max,
            "instance provisioned"
        );
        Ok(record)
    }

    fn rollback(&self, ids: &InsertedIds) {
        match self.store.undo_last_insert(ids) {
            Ok(()) => info!(?ids, "instance records rolled back"),
            Err(e) => error!(?ids, error = %e, "could not roll back instance records"),
        }
    }

    // ── Certificate authority ──────────────────────────────────────

    /// Replace the certificate authority with one covering every stored
    /// fqdn. Running instance containers are stopped for the swap and
    /// started again afterwards, also when the swap fails.
    async fn reissue_certificates(&self) -> OrchestratorResult<()> {
        let fqdns = self.store.all_fqdns()?;
        let spec = certificate_authority_spec(&fqdns, &self.settings)?;
        debug!(primary = %fqdns[0], domains = fqdns.len(), "reissuing certificates");

        let paused = self.pause_instances().await?;

        if let Err(e) = self.replace_certificate_authority(&spec).await {
            if let Err(resume) = self.resume(&paused).await {
                warn!(error = %resume, "could not resume paused containers");
            }
            return Err(e);
        }

        self.resume(&paused).await
    }

    /// Stop every running container that belongs to a stored instance.
    /// Returns the ids that were stopped.
    async fn pause_instances(&self) -> OrchestratorResult<Vec<String>> {
        let running: HashSet<String> = self
            .engine
            .list_containers(false)
            .await
            .map_err(engine_err("list running containers"))?
            .into_iter()
            .map(|c| c.id)
            .collect();

        let mut managed = Vec::new();
        for fqdn in self.store.all_fqdns()? {
            if let Some(containers) = self.store.container_ids_for(&fqdn)? {
                managed.extend(
                    containers
                        .ids()
                        .into_iter()
                        .filter(|id| running.contains(*id))
                        .map(str::to_string),
                );
            }
        }

        let mut paused = Vec::with_capacity(managed.len());
        for id in managed {
            if let Err(e) = self.engine.stop_container(&id, self.settings.stop_timeout).await {
                if let Err(resume) = self.resume(&paused).await {
                    warn!(error = %resume, "could not resume paused containers");
                }
                return Err(engine_err(format!("stop container {id}"))(e));
            }
            debug!(%id, "container paused for certificate reissue");
            paused.push(id);
        }
        Ok(paused)
    }

    /// Start every id, attempting all of them. Returns the first failure.
    async fn resume(&self, ids: &[String]) -> OrchestratorResult<()> {
        let mut first_error = None;
        for id in ids {
            match self.engine.start_container(id).await {
                Ok(()) => debug!(%id, "container resumed"),
                Err(e) => {
                    warn!(%id, error = %e, "could not resume container");
                    first_error.get_or_insert_with(|| engine_err(format!("start container {id}"))(e));
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn replace_certificate_authority(&self, spec: &ContainerSpec) -> OrchestratorResult<()> {
        let current = self.store.certificate_authority_container_id()?;
        if !current.is_empty() {
            self.remove_tolerating_missing(&current, FORCE_WITH_ANONYMOUS_VOLUMES)
                .await?;
            self.store.remove_certificate_authority(&current)?;
            debug!(id = %current, "previous certificate authority removed");
        }

        self.engine
            .pull_image(&spec.image)
            .await
            .map_err(engine_err(format!("pull image {}", spec.image)))?;
        let id = self
            .engine
            .create_container(spec)
            .await
            .map_err(engine_err("create certificate authority"))?;

        if let Err(e) = self.activate_certificate_authority(&id).await {
            if let Err(cleanup) = self.engine.remove_container(&id, FORCE_WITH_ANONYMOUS_VOLUMES).await {
                warn!(%id, error = %cleanup, "could not discard certificate authority");
            }
            if let Err(cleanup) = self.store.remove_certificate_authority(&id) {
                warn!(%id, error = %cleanup, "could not discard certificate authority record");
            }
            return Err(e);
        }

        info!(%id, "certificate authority started");
        Ok(())
    }

    async fn activate_certificate_authority(&self, id: &str) -> OrchestratorResult<()> {
        self.store.save_container_id(
            CERTIFICATE_AUTHORITY_ROW,
            ContainerKind::CertificateAuthority,
            id,
        )?;
        self.engine
            .start_container(id)
            .await
            .map_err(engine_err("start certificate authority"))
    }

    // ── Infrastructure ─────────────────────────────────────────────

    /// Create and start the relay, then the proxy. Ids of containers
    /// created so far are pushed to `created`, also on failure.
    async fn deploy_infra(
        &self,
        record: &InstanceRecord,
        created: &mut Vec<String>,
    ) -> OrchestratorResult<()> {
        let fqdns = self.store.all_fqdns()?;
        let cert_folder = fqdns.first().map_or(record.name.as_str(), String::as_str);

        let relay = relay_spec(record, &self.settings);
        self.launch(&relay, record.relay_id, ContainerKind::Relay, Duration::ZERO, created)
            .await?;

        let proxy = proxy_spec(record, cert_folder, &self.settings);
        self.launch(
            &proxy,
            record.proxy_id,
            ContainerKind::Proxy,
            self.settings.proxy_start_delay,
            created,
        )
        .await
    }

    async fn launch(
        &self,
        spec: &ContainerSpec,
        record_id: RecordId,
        kind: ContainerKind,
        start_delay: Duration,
        created: &mut Vec<String>,
    ) -> OrchestratorResult<()> {
        self.engine
            .pull_image(&spec.image)
            .await
            .map_err(engine_err(format!("pull image {}", spec.image)))?;

        let id = self
            .engine
            .create_container(spec)
            .await
            .map_err(engine_err(format!("create {kind} container {}", spec.name)))?;
        created.push(id.clone());

        self.store.save_container_id(record_id, kind, &id)?;

        if !start_delay.is_zero() {
            info!(name = %spec.name, delay_secs = start_delay.as_secs(), "waiting for certificates before start");
            tokio::time::sleep(start_delay).await;
        }

        self.engine
            .start_container(&id)
            .await
            .map_err(engine_err(format!("start {kind} container {}", spec.name)))?;

        info!(name = %spec.name, %id, "container started");
        Ok(())
    }

    // ── Teardown ───────────────────────────────────────────────────

    /// Remove an instance's containers, their volumes (except the shared
    /// certificate volume), and its records.
    ///
    /// If a container cannot be removed the records are kept so the destroy
    /// can be retried.
    pub async fn destroy(&self, fqdn: &str) -> OrchestratorResult<()> {
        let containers = self
            .store
            .container_ids_for(fqdn)?
            .ok_or_else(|| OrchestratorError::InstanceNotFound(fqdn.to_string()))?;

        let mut failed = 0;
        for id in containers.ids() {
            match self
                .destroy_container_with_volumes(id, CertificateVolume::Keep)
                .await
            {
                Ok(()) => debug!(%fqdn, %id, "container destroyed"),
                Err(e) => {
                    error!(%fqdn, %id, error = %e, "could not destroy container");
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            return Err(OrchestratorError::DestroyIncomplete {
                fqdn: fqdn.to_string(),
                failed,
            });
        }

        self.store.remove_instance(fqdn)?;
        info!(%fqdn, "instance destroyed");
        Ok(())
    }

    /// Remove the certificate authority and the shared certificate volume.
    pub async fn destroy_certificate_authority(&self) -> OrchestratorResult<()> {
        let id = self.store.certificate_authority_container_id()?;
        if id.is_empty() {
            return Err(OrchestratorError::NoCertificateAuthority);
        }

        self.destroy_container_with_volumes(&id, CertificateVolume::Remove)
            .await?;
        self.store.remove_certificate_authority(&id)?;
        info!(%id, "certificate authority destroyed");
        Ok(())
    }

    /// Force-remove a container, then every named volume it mounted.
    /// Volume removal is best-effort; failures are logged.
    pub async fn destroy_container_with_volumes(
        &self,
        id: &str,
        certificates: CertificateVolume,
    ) -> OrchestratorResult<()> {
        let mounts = match self.engine.inspect_mounts(id).await {
            Ok(mounts) => mounts,
            Err(e) if e.is_not_found() => {
                warn!(%id, "container already gone, nothing to remove");
                return Ok(());
            }
            Err(e) => return Err(engine_err(format!("inspect container {id}"))(e)),
        };

        self.engine
            .remove_container(id, FORCE_WITH_ANONYMOUS_VOLUMES)
            .await
            .map_err(engine_err(format!("remove container {id}")))?;
        debug!(%id, "container removed");

        for volume in mounts.into_iter().filter_map(|m| m.name) {
            if volume == CERTIFICATE_VOLUME && certificates == CertificateVolume::Keep {
                debug!(%volume, "keeping shared certificate volume");
                continue;
            }
            match self.engine.remove_volume(&volume).await {
                Ok(()) => debug!(%volume, "volume removed"),
                Err(e) => warn!(%volume, error = %e, "could not remove volume"),
            }
        }
        Ok(())
    }

    async fn remove_tolerating_missing(&self, id: &str, options: RemoveOptions) -> OrchestratorResult<()> {
        match self.engine.remove_container(id, options).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                warn!(%id, "container already gone");
                Ok(())
            }
            Err(e) => Err(engine_err(format!("remove container {id}"))(e)),
        }
    }

    // ── Maintenance ────────────────────────────────────────────────

    /// Restart the proxy and relay. The first failure stops the sequence.
    pub async fn restart(&self, fqdn: &str) -> OrchestratorResult<()> {
        let containers = self
            .store
            .container_ids_for(fqdn)?
            .ok_or_else(|| OrchestratorError::InstanceNotFound(fqdn.to_string()))?;

        for id in containers.ids() {
            self.engine
                .restart_container(id, self.settings.restart_timeout)
                .await
                .map_err(engine_err(format!("restart container {id}")))?;
            debug!(%fqdn, %id, "container restarted");
        }

        info!(%fqdn, "instance restarted");
        Ok(())
    }

    /// Replace the proxy and relay containers with fresh ones built from
    /// the stored configuration. Volumes are reused.
    pub async fn recreate(&self, fqdn: &str) -> OrchestratorResult<InstanceRecord> {
        let containers = self
            .store
            .container_ids_for(fqdn)?
            .ok_or_else(|| OrchestratorError::InstanceNotFound(fqdn.to_string()))?;

        for id in containers.ids() {
            self.remove_tolerating_missing(id, FORCE_KEEP_VOLUMES).await?;
            debug!(%fqdn, %id, "container removed for recreate");
        }

        let instance_id = self
            .store
            .instance_id_for(fqdn)?
            .ok_or_else(|| OrchestratorError::InstanceNotFound(fqdn.to_string()))?;
        let record = self.store.get_parameters(instance_id)?;

        let mut created = Vec::new();
        if let Err(e) = self.deploy_infra(&record, &mut created).await {
            error!(%fqdn, error = %e, "could not recreate containers");
            for id in &created {
                if let Err(cleanup) = self.engine.remove_container(id, FORCE_KEEP_VOLUMES).await {
                    warn!(%id, error = %cleanup, "could not discard container");
                }
            }
            return Err(e);
        }

        info!(%fqdn, "instance recreated");
        Ok(self.store.get_parameters(instance_id)?)
    }
}
