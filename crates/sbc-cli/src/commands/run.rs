use clap::{ArgAction, Args};
use sbc_core::SbcConfig;
use sbc_orchestrator::InstanceFacade;
use sbc_state::ProvisionRequest;
use tracing::info;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Fqdn the proxy advertises; also the instance name.
    #[arg(long)]
    pub sbc_fqdn: String,

    /// Static LAN address of the container host.
    #[arg(long)]
    pub host_ip: String,

    /// Address of the internal PBX.
    #[arg(long)]
    pub kamailio_pbx_ip: String,

    /// SIP port of the internal PBX.
    #[arg(long)]
    pub kamailio_pbx_port: Option<u16>,

    /// Public address for RTP transport.
    #[arg(long)]
    pub rtp_public_ip: String,

    /// Generate a fresh proxy configuration inside the container.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub kamailio_new_config: bool,

    /// Enable SIP packet capture in the proxy.
    #[arg(long)]
    pub kamailio_sip_dump: bool,

    /// TLS port used when this is the first instance on the host.
    #[arg(long)]
    pub kamailio_sbc_port: Option<u16>,

    /// UDP SIP port used when this is the first instance on the host.
    #[arg(long)]
    pub kamailio_udp_sip_port: Option<u16>,

    /// Relay signalling port used when this is the first instance.
    #[arg(long, visible_alias = "kamailio-rtpeng-port")]
    pub rtp_signal_port: Option<u16>,

    /// First media port used when this is the first instance.
    #[arg(long)]
    pub rtp_min_port: Option<u16>,

    /// Last media port used when this is the first instance.
    #[arg(long)]
    pub rtp_max_port: Option<u16>,

    #[arg(long)]
    pub kamailio_image: Option<String>,

    #[arg(long)]
    pub rtp_image: Option<String>,

    /// Image of the certificate node.
    #[arg(long)]
    pub tls_image: Option<String>,

    /// Timezone of the certificate node.
    #[arg(long)]
    pub timezone: Option<String>,

    /// Issue certificates against the ACME staging environment.
    #[arg(long)]
    pub staging: bool,
}

impl RunArgs {
    /// Apply image, port-default, and certificate flags to `config`.
    pub fn apply(&self, config: &mut SbcConfig) {
        let ports = &mut config.ports;
        if let Some(port) = self.kamailio_sbc_port {
            ports.tls = port;
        }
        if let Some(port) = self.kamailio_udp_sip_port {
            ports.udp = port;
        }
        if let Some(port) = self.kamailio_pbx_port {
            ports.pbx = port;
        }
        if let Some(port) = self.rtp_signal_port {
            ports.relay_signal = port;
        }
        if let Some(port) = self.rtp_min_port {
            ports.media_min = port;
        }
        if let Some(port) = self.rtp_max_port {
            ports.media_max = port;
        }

        if let Some(image) = &self.kamailio_image {
            config.images.proxy = image.clone();
        }
        if let Some(image) = &self.rtp_image {
            config.images.relay = image.clone();
        }
        if let Some(image) = &self.tls_image {
            config.images.certificate_authority = image.clone();
        }

        if let Some(timezone) = &self.timezone {
            config.certificates.timezone = timezone.clone();
        }
        if self.staging {
            config.certificates.staging = true;
        }
    }

    pub fn request(&self, config: &SbcConfig) -> ProvisionRequest {
        ProvisionRequest {
            fqdn: self.sbc_fqdn.clone(),
            pbx_address: self.kamailio_pbx_ip.clone(),
            pbx_port: config.ports.pbx,
            media_public_ip: self.rtp_public_ip.clone(),
            host_ip: self.host_ip.clone(),
            regenerate_config: self.kamailio_new_config,
            packet_capture: self.kamailio_sip_dump,
            defaults: config.ports,
        }
    }
}

pub async fn run(mut config: SbcConfig, args: &RunArgs) -> anyhow::Result<()> {
    args.apply(&mut config);
    let request = args.request(&config);
    info!(
        fqdn = %request.fqdn,
        proxy_image = %config.images.proxy,
        relay_image = %config.images.relay,
        "Deploying instance"
    );
    let facade = InstanceFacade::docker(config);

    let record = facade.run(&request).await?;
    println!("✓ Deployed {}", record.fqdn);
    println!("  TLS port:   {}", record.tls_port);
    println!("  UDP port:   {}", record.udp_port);
    println!("  Media:      {}-{}", record.media_min, record.media_max);
    println!("  PBX:        {}:{}", record.pbx_address, record.pbx_port);
    Ok(())
}
