use sbc_core::SbcConfig;
use sbc_orchestrator::{InstanceFacade, ListReport};
use tracing::warn;

const HEADERS: [&str; 8] = [
    "FQDN",
    "TLS_PORT",
    "UDP_PORT",
    "PBX_IP",
    "PBX_PORT",
    "PUBLIC_IP",
    "RTP_MIN",
    "RTP_MAX",
];

pub fn list(config: SbcConfig, format: &str) -> anyhow::Result<()> {
    let report = InstanceFacade::docker(config).list()?;
    if !report.skipped.is_empty() {
        warn!(skipped = ?report.skipped, "Some instances could not be read");
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print!("{}", format_table(&report)),
    }
    Ok(())
}

pub fn format_table(report: &ListReport) -> String {
    if report.instances.is_empty() {
        let mut out = String::new();
        out.push_str("===========================\n");
        out.push_str("== NO SBC INSTANCES FOUND ==\n");
        out.push_str("===========================\n");
        return out;
    }

    let rows: Vec<[String; 8]> = report
        .instances
        .iter()
        .map(|r| {
            [
                r.fqdn.clone(),
                r.tls_port.to_string(),
                r.udp_port.to_string(),
                r.pbx_address.clone(),
                r.pbx_port.to_string(),
                r.media_public_ip.clone(),
                r.media_min.to_string(),
                r.media_max.to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::from("[SBC INFORMATION]\n");
    let header: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
    for row in std::iter::once(header.as_slice()).chain(rows.iter().map(|r| r.as_slice())) {
        let line: Vec<String> = row
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    }

    if !report.skipped.is_empty() {
        out.push_str(&format!(
            "\n{} unreadable record(s) skipped: {}\n",
            report.skipped.len(),
            report.skipped.join(", ")
        ));
    }
    out
}
