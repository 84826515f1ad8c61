//! `vitalgate discover`: show the endpoints `run` would connect to.

use vitalgate_core::DeviceRecord;
use vitalgate_hardware::{DiscoveryConfig, discovery};

pub async fn execute(config: &DiscoveryConfig) -> anyhow::Result<()> {
    let records = discovery::discover(config).await?;
    if records.is_empty() {
        println!("no analyzers found");
        return Ok(());
    }
    for line in render(&records) {
        println!("{line}");
    }
    Ok(())
}

fn render(records: &[DeviceRecord]) -> Vec<String> {
    let mut lines = vec![format!("{:<28}  {:<12}  {}", "DEVICE", "TYPE", "ENDPOINT")];
    lines.extend(records.iter().map(|r| {
        format!(
            "{:<28}  {:<12}  {}",
            r.device_id.as_str(),
            r.device_type.as_str(),
            r.endpoint
        )
    }));
    lines
}
