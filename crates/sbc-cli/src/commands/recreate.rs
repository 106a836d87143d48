use sbc_core::SbcConfig;
use sbc_orchestrator::InstanceFacade;
use tracing::info;

pub async fn recreate(config: SbcConfig, fqdn: &str) -> anyhow::Result<()> {
    info!(%fqdn, "Recreating instance containers");
    let record = InstanceFacade::docker(config).recreate(fqdn).await?;
    println!("✓ Recreated {}", record.fqdn);
    if let (Some(proxy), Some(relay)) = (&record.proxy_container_id, &record.relay_container_id) {
        println!("  Proxy: {proxy}");
        println!("  Relay: {relay}");
    }
    Ok(())
}
