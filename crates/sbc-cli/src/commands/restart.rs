use sbc_core::SbcConfig;
use sbc_orchestrator::InstanceFacade;
use tracing::info;

pub async fn restart(config: SbcConfig, fqdn: &str) -> anyhow::Result<()> {
    info!(%fqdn, "Restarting instance");
    InstanceFacade::docker(config).restart(fqdn).await?;
    println!("✓ Restarted {fqdn}");
    Ok(())
}
