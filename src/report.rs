use crate::host::HostEnvironment;
use crate::system::SystemInfo;
use crate::writer::EditOutcome;
use anyhow::Result;
use serde::Serialize;
use std::path::Path;

/// Machine-readable record of a completed run, written as pretty JSON when
/// `--report` is given.
#[derive(Debug, Serialize)]
pub(crate) struct TuneReport {
	pub(crate) timestamp: i64,
	pub(crate) version: String,
	pub(crate) buffer_pool_mb: u64,
	pub(crate) cache_mb: u64,
	pub(crate) jit_mb: u64,
	pub(crate) overhead_mb: u64,
	pub(crate) total_mb: u64,
	pub(crate) page_size_kb: u64,
	pub(crate) page_count: u64,
	pub(crate) edits: EditSummary,
	pub(crate) system: SystemInfo,
}

/// Per-artifact outcome of the four idempotent edits.
#[derive(Debug, Serialize)]
pub(crate) struct EditSummary {
	pub(crate) sysctl: EditOutcome,
	pub(crate) database: EditOutcome,
	pub(crate) opcache: EditOutcome,
	pub(crate) thp_service: Option<EditOutcome>,
}

impl TuneReport {
	/// Serialize the report to a file
	pub(crate) fn write(&self, host: &dyn HostEnvironment, path: &Path) -> Result<()> {
		host.write_file(path, &serde_json::to_string_pretty(self)?)
	}
}
