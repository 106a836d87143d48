use sbc_core::SbcConfig;
use sbc_orchestrator::InstanceFacade;
use tracing::info;

pub async fn destroy(config: SbcConfig, fqdn: Option<&str>, tls_node: bool) -> anyhow::Result<()> {
    let facade = InstanceFacade::docker(config);

    if tls_node {
        info!("Destroying certificate node");
        facade.destroy_certificate_authority().await?;
        println!("✓ Certificate node and shared certificates removed");
        return Ok(());
    }

    let Some(fqdn) = fqdn else {
        anyhow::bail!("either --sbc-fqdn or --tls-node is required");
    };
    info!(%fqdn, "Destroying instance");
    facade.destroy(fqdn).await?;
    println!("✓ Destroyed {fqdn}");
    Ok(())
}
