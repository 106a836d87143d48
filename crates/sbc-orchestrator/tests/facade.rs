//! End-to-end facade tests on an on-disk state store and the in-memory
//! container engine.

use sbc_core::{CERTIFICATE_VOLUME, SbcConfig};
use sbc_engine::{EngineOp, MemoryEngine};
use sbc_orchestrator::{InstanceFacade, OrchestratorError};
use sbc_state::{ProvisionRequest, StateStore};
use tempfile::TempDir;

fn facade(dir: &TempDir) -> (InstanceFacade<MemoryEngine>, MemoryEngine) {
    let mut config = SbcConfig::default();
    config.paths.db_file = dir.path().join("sbc.db");
    config.paths.engine_log_file = None;
    config.lifecycle.proxy_start_delay_secs = 0;

    let engine = MemoryEngine::new();
    (InstanceFacade::new(config, engine.clone()), engine)
}

fn request(fqdn: &str) -> ProvisionRequest {
    let mut req = ProvisionRequest::new(fqdn, "192.168.1.20", "198.51.100.4");
    req.host_ip = "192.168.1.2".to_string();
    req
}

#[tokio::test]
async fn two_instances_get_disjoint_ports() {
    let dir = TempDir::new().unwrap();
    let (facade, _engine) = facade(&dir);

    let a = facade.run(&request("a.example.com")).await.unwrap();
    let b = facade.run(&request("b.example.com")).await.unwrap();

    assert_eq!((a.tls_port, a.udp_port), (5061, 5060));
    assert_eq!((a.media_min, a.media_max), (20501, 21000));
    assert_eq!((b.tls_port, b.udp_port), (5062, 5061));
    assert_eq!((b.media_min, b.media_max), (21001, 21500));

    let report = facade.list().unwrap();
    let fqdns: Vec<&str> = report.instances.iter().map(|r| r.fqdn.as_str()).collect();
    assert_eq!(fqdns, vec!["a.example.com", "b.example.com"]);
}

#[tokio::test]
async fn state_survives_between_operations() {
    let dir = TempDir::new().unwrap();
    let (facade, engine) = facade(&dir);
    facade.run(&request("a.example.com")).await.unwrap();

    let store = StateStore::open(&dir.path().join("sbc.db")).unwrap();
    let ids = store.container_ids_for("a.example.com").unwrap().unwrap();
    assert!(engine.is_running(&ids.proxy));
    assert!(engine.is_running(&ids.relay));
    assert!(!store.certificate_authority_container_id().unwrap().is_empty());
}

#[tokio::test]
async fn failed_infra_step_leaves_store_unchanged() {
    let dir = TempDir::new().unwrap();
    let (facade, engine) = facade(&dir);
    facade.run(&request("a.example.com")).await.unwrap();

    engine.fail_on(EngineOp::Pull, "zeljkoiphouse/kamailio:v0.2");
    let err = facade.run(&request("b.example.com")).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Engine { .. }));

    let report = facade.list().unwrap();
    assert_eq!(report.instances.len(), 1);
    assert_eq!(report.instances[0].fqdn, "a.example.com");
    assert!(engine.container_named("b.example.com-relay").is_none());
    assert!(!engine.has_volume("b.example.com-relay-tmp"));
}

#[tokio::test]
async fn destroy_then_destroy_certificate_authority() {
    let dir = TempDir::new().unwrap();
    let (facade, engine) = facade(&dir);
    facade.run(&request("a.example.com")).await.unwrap();
    facade.run(&request("b.example.com")).await.unwrap();

    facade.destroy("a.example.com").await.unwrap();
    facade.destroy("b.example.com").await.unwrap();
    assert!(facade.list().unwrap().instances.is_empty());
    assert!(engine.has_volume(CERTIFICATE_VOLUME));

    facade.destroy_certificate_authority().await.unwrap();
    assert!(!engine.has_volume(CERTIFICATE_VOLUME));
    assert!(engine.containers().is_empty());

    assert!(matches!(
        facade.destroy_certificate_authority().await,
        Err(OrchestratorError::NoCertificateAuthority)
    ));
}

#[tokio::test]
async fn restart_and_recreate_unknown_fqdn() {
    let dir = TempDir::new().unwrap();
    let (facade, _engine) = facade(&dir);

    assert!(matches!(
        facade.restart("ghost.example.com").await,
        Err(OrchestratorError::InstanceNotFound(_))
    ));
    assert!(matches!(
        facade.recreate("ghost.example.com").await,
        Err(OrchestratorError::InstanceNotFound(_))
    ));
}

#[tokio::test]
async fn recreate_after_containers_vanished() {
    let dir = TempDir::new().unwrap();
    let (facade, engine) = facade(&dir);
    let before = facade.run(&request("a.example.com")).await.unwrap();

    // Someone removed the containers behind our back.
    for c in engine.containers() {
        if c.spec.name.starts_with("a.example.com") {
            sbc_engine::ContainerEngine::remove_container(
                &engine,
                &c.id,
                sbc_engine::RemoveOptions {
                    force: true,
                    volumes: false,
                },
            )
            .await
            .unwrap();
        }
    }

    let after = facade.recreate("a.example.com").await.unwrap();
    assert_ne!(after.proxy_container_id, before.proxy_container_id);
    assert!(engine.container_named("a.example.com-proxy").unwrap().running);
}

#[tokio::test]
async fn list_report_serializes_to_json() {
    let dir = TempDir::new().unwrap();
    let (facade, _engine) = facade(&dir);
    facade.run(&request("a.example.com")).await.unwrap();

    let json = serde_json::to_value(facade.list().unwrap()).unwrap();
    assert_eq!(json["instances"][0]["fqdn"], "a.example.com");
    assert_eq!(json["instances"][0]["tls_port"], 5061);
    assert_eq!(json["skipped"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn list_skips_unreadable_record() {
    let dir = TempDir::new().unwrap();
    let (facade, _engine) = facade(&dir);
    facade.run(&request("a.example.com")).await.unwrap();
    facade.run(&request("b.example.com")).await.unwrap();

    let raw = rusqlite::Connection::open(dir.path().join("sbc.db")).unwrap();
    raw.execute(
        "UPDATE proxy_config SET tls_port = 'x' WHERE instance_name = 'b.example.com'",
        [],
    )
    .unwrap();
    drop(raw);

    let report = facade.list().unwrap();
    assert_eq!(report.instances.len(), 1);
    assert_eq!(report.instances[0].fqdn, "a.example.com");
    assert_eq!(report.skipped, vec!["b.example.com"]);
}
