//! Host probing for device-tier classification.

use std::fs;

use checkpoint_core::frame::HostProfile;
use sysinfo::System;
use tracing::debug;

const DMI_VENDOR: &str = "/sys/class/dmi/id/sys_vendor";
const DMI_PRODUCT: &str = "/sys/class/dmi/id/product_name";

/// Describes the machine the pipeline will run on.
///
/// Manufacturer and model come from DMI when the platform exposes it and
/// fall back to the CPU vendor and brand otherwise.
pub fn detect() -> HostProfile {
    let mut system = System::new();
    system.refresh_cpu_all();
    let cpu = system.cpus().first();

    let manufacturer = read_trimmed(DMI_VENDOR)
        .or_else(|| cpu.map(|cpu| cpu.vendor_id().trim().to_string()))
        .unwrap_or_default();
    let model = read_trimmed(DMI_PRODUCT)
        .or_else(|| cpu.map(|cpu| cpu.brand().trim().to_string()))
        .unwrap_or_default();

    let profile = HostProfile {
        logical_cores: num_cpus::get(),
        manufacturer,
        model,
    };
    debug!(
        cores = profile.logical_cores,
        manufacturer = %profile.manufacturer,
        model = %profile.model,
        os = ?System::long_os_version(),
        "host probed"
    );
    profile
}

fn read_trimmed(path: &str) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
