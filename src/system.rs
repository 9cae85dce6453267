use serde::Serialize;
use sysinfo::System;

/// A snapshot of the host, recorded in the report and used for the memory
/// sanity check before reserving huge pages.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SystemInfo {
	pub(crate) hostname: String,
	pub(crate) os_name: String,
	pub(crate) kernel_version: String,
	pub(crate) cpu_cores: usize,
	/// Total physical memory in bytes
	pub(crate) total_memory: u64,
	/// Currently available memory in bytes
	pub(crate) available_memory: u64,
}

impl SystemInfo {
	pub(crate) fn collect() -> Self {
		// Create a new system instance
		let mut sys = System::new_all();
		// Refresh the system information
		sys.refresh_all();
		// Get the system details
		let hostname = System::host_name().unwrap_or_else(|| "unknown".to_string());
		let os_name = System::name().unwrap_or_else(|| "unknown".to_string());
		let kernel_version = System::kernel_version().unwrap_or_else(|| "unknown".to_string());
		// Get the CPU and memory details
		let cpu_cores = sys.cpus().len();
		let total_memory = sys.total_memory();
		let available_memory = sys.available_memory();
		// Return the system information
		Self {
			hostname,
			os_name,
			kernel_version,
			cpu_cores,
			total_memory,
			available_memory,
		}
	}
}
