use crate::host::HostEnvironment;
use log::warn;
use std::path::Path;

/// Fixed allowance for shared memory segments outside the measured settings
pub(crate) const FIXED_OVERHEAD_MB: u64 = 64;
/// Native huge page size assumed when the kernel does not report one
pub(crate) const DEFAULT_PAGE_SIZE_KB: u64 = 2048;

/// Kernel memory information pseudo-file
const MEMINFO: &str = "/proc/meminfo";

/// The memory to back with huge pages, in megabytes per component.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MemoryBudget {
	pub(crate) buffer_pool_mb: u64,
	pub(crate) cache_mb: u64,
	pub(crate) jit_mb: u64,
}

impl MemoryBudget {
	/// Total reservation in megabytes, including the fixed overhead
	pub(crate) fn total_mb(&self) -> u64 {
		self.buffer_pool_mb + self.cache_mb + self.jit_mb + FIXED_OVERHEAD_MB
	}

	/// Number of huge pages covering the budget. The extra page is an
	/// unconditional safety margin, an exact multiple still gets one more.
	pub(crate) fn pages(&self, page_size_kb: u64) -> u64 {
		self.total_mb() * 1024 / page_size_kb + 1
	}
}

/// Read the native huge page size in kilobytes from the kernel.
///
/// Falls back to [`DEFAULT_PAGE_SIZE_KB`] when the pseudo-file is missing or
/// carries no `Hugepagesize:` line, which is logged as a fallback rather than
/// treated as an error.
pub(crate) fn hugepage_size_kb(host: &dyn HostEnvironment) -> u64 {
	// Read the kernel memory information
	let contents = match host.read_file(Path::new(MEMINFO)) {
		Ok(contents) => contents,
		Err(_) => {
			warn!("Cannot read {MEMINFO}, assuming {DEFAULT_PAGE_SIZE_KB} KB huge pages");
			return DEFAULT_PAGE_SIZE_KB;
		}
	};
	// Parse the huge page size, e.g. `Hugepagesize:       2048 kB`
	match contents
		.lines()
		.find_map(|line| line.strip_prefix("Hugepagesize:"))
		.and_then(|rest| rest.split_whitespace().next())
		.and_then(|size| size.parse().ok())
	{
		Some(size) => size,
		None => {
			warn!("No huge page size reported in {MEMINFO}, assuming {DEFAULT_PAGE_SIZE_KB} KB");
			DEFAULT_PAGE_SIZE_KB
		}
	}
}
