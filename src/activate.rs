use crate::host::HostEnvironment;
use crate::writer::{SYSCTL_FILE, THP_UNIT_NAME};
use anyhow::Result;
use log::info;

/// Load the new kernel parameter immediately instead of waiting for the
/// next boot. A failing `sysctl` is fatal.
pub(crate) fn apply_sysctl(host: &dyn HostEnvironment) -> Result<()> {
	info!("Loading kernel parameters from {SYSCTL_FILE}");
	host.exec("sysctl", &["-p", SYSCTL_FILE])?;
	Ok(())
}

/// Make the THP disable service part of every future boot and run it now.
/// Each step's exit status is checked and a failure aborts the run.
pub(crate) fn enable_thp_service(host: &dyn HostEnvironment) -> Result<()> {
	info!("Enabling and starting {THP_UNIT_NAME}");
	// Pick up the freshly written unit definition
	host.exec("systemctl", &["daemon-reload"])?;
	// Start automatically on future boots
	host.exec("systemctl", &["enable", THP_UNIT_NAME])?;
	// Run the one-shot action now
	host.exec("systemctl", &["start", THP_UNIT_NAME])?;
	Ok(())
}
