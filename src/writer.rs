use crate::host::HostEnvironment;
use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Kernel parameter drop-in declaring the huge page reservation
pub(crate) const SYSCTL_FILE: &str = "/etc/sysctl.d/80-hugetune.conf";
/// The kernel parameter holding the reservation
const SYSCTL_KEY: &str = "vm.nr_hugepages";

/// Section marker receiving the database directive
const MYSQL_SECTION: &str = "[mysqld]";
/// Directive switching the buffer pool onto huge pages
const MYSQL_DIRECTIVE: &str = "large_pages";

/// Section marker receiving the OPcache directive in a primary file
const OPCACHE_SECTION: &str = "[opcache]";
/// Directive mapping the OPcache code segment onto huge pages
const OPCACHE_DIRECTIVE: &str = "opcache.huge_code_pages";

/// Script conditionally disabling transparent huge pages at boot
pub(crate) const THP_SCRIPT: &str = "/usr/local/sbin/hugetune-disable-thp.sh";
/// Unit definition running the script once at early boot
pub(crate) const THP_UNIT: &str = "/etc/systemd/system/hugetune-disable-thp.service";
/// Unit name used when enabling and starting the service
pub(crate) const THP_UNIT_NAME: &str = "hugetune-disable-thp.service";

const THP_SCRIPT_BODY: &str = "#!/bin/sh\n\
# Keep transparent huge pages away from the explicit reservation (managed by hugetune)\n\
if [ -f /sys/kernel/mm/transparent_hugepage/enabled ]; then\n\
\techo never > /sys/kernel/mm/transparent_hugepage/enabled\n\
fi\n\
if [ -f /sys/kernel/mm/transparent_hugepage/defrag ]; then\n\
\techo never > /sys/kernel/mm/transparent_hugepage/defrag\n\
fi\n";

const THP_UNIT_BODY: &str = "[Unit]\n\
Description=Disable transparent huge pages (hugetune)\n\
After=sysinit.target local-fs.target\n\
Before=mysqld.service mariadb.service\n\
\n\
[Service]\n\
Type=oneshot\n\
ExecStart=/usr/local/sbin/hugetune-disable-thp.sh\n\
RemainAfterExit=yes\n\
\n\
[Install]\n\
WantedBy=basic.target\n";

/// What an idempotent edit did to its artifact. Callers assert and log on
/// the outcome kind instead of re-reading the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum EditOutcome {
	/// The artifact was created or the directive inserted
	Applied,
	/// An existing directive line was rewritten to the canonical form
	Rewritten,
	/// The target value was already in place, nothing was changed
	AlreadyPresent,
	/// The section marker to insert after is missing, nothing was changed
	SkippedNoSectionMarker,
}

impl fmt::Display for EditOutcome {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Applied => write!(f, "updated"),
			Self::Rewritten => write!(f, "existing directive rewritten"),
			Self::AlreadyPresent => write!(f, "already configured, no change"),
			Self::SkippedNoSectionMarker => write!(f, "section marker not found, not modified"),
		}
	}
}

/// Overwrite the kernel reservation drop-in with the current page count.
///
/// The file is fully owned by this tool, so it is replaced rather than
/// merged; manual edits to it do not survive a re-run.
pub(crate) fn write_sysctl(host: &dyn HostEnvironment, pages: u64) -> Result<EditOutcome> {
	let path = Path::new(SYSCTL_FILE);
	let contents = format!(
		"# Huge pages for the database buffer pool and PHP OPcache (managed by hugetune)\n\
		{SYSCTL_KEY} = {pages}\n"
	);
	// Report an unchanged file so re-runs are visibly no-ops
	if host.path_exists(path) && host.read_file(path)? == contents {
		return Ok(EditOutcome::AlreadyPresent);
	}
	host.write_file(path, &contents)?;
	Ok(EditOutcome::Applied)
}

/// Ensure the database configuration carries the huge page directive.
///
/// An uncommented occurrence of the key anywhere in the file suppresses the
/// edit; the value is deliberately not verified. Otherwise the directive is
/// inserted directly after the `[mysqld]` section marker, framed by a pair
/// of comment lines. A file without that marker is left untouched and the
/// outcome reports the skip.
pub(crate) fn apply_mysql_directive(host: &dyn HostEnvironment, path: &Path) -> Result<EditOutcome> {
	let contents = host.read_file(path)?;
	// Presence of the key alone suppresses the edit
	if contents.lines().any(|line| is_directive(line, MYSQL_DIRECTIVE)) {
		return Ok(EditOutcome::AlreadyPresent);
	}
	let mut lines: Vec<&str> = contents.lines().collect();
	// Insertion happens right after the section marker
	let Some(position) = lines.iter().position(|line| line.contains(MYSQL_SECTION)) else {
		return Ok(EditOutcome::SkippedNoSectionMarker);
	};
	lines.insert(position + 1, "# Allocate the buffer pool from huge pages (added by hugetune)");
	lines.insert(position + 2, MYSQL_DIRECTIVE);
	lines.insert(position + 3, "# End of hugetune additions");
	host.write_file(path, &rejoin(lines, &contents))?;
	Ok(EditOutcome::Applied)
}

/// Ensure the PHP configuration enables huge pages for the OPcache code
/// segment, as `opcache.huge_code_pages=1`.
///
/// Three-way branch: an uncommented `=1` anywhere in the file is a no-op,
/// even when a commented template line precedes it; otherwise an occurrence
/// of the key, preferring an uncommented one, has its whole line rewritten
/// in place to the canonical form; an absent key is inserted after the
/// `[opcache]` section
/// marker of a primary file (appending marker and directive at end-of-file
/// when the marker is missing too), or simply appended when editing a
/// dedicated fragment file, which never needs a section header.
pub(crate) fn apply_opcache_directive(
	host: &dyn HostEnvironment,
	path: &Path,
	fragment: bool,
) -> Result<EditOutcome> {
	let contents = host.read_file(path)?;
	let canonical = format!("{OPCACHE_DIRECTIVE}=1");
	let mut lines: Vec<&str> = contents.lines().collect();
	// An uncommented target value anywhere needs no edit at all, a stock
	// commented template line earlier in the file must not shadow it
	if lines.iter().any(|line| opcache_value(line) == Some((false, "1".to_string()))) {
		return Ok(EditOutcome::AlreadyPresent);
	}
	// Look for an existing occurrence of the key, preferring a live one
	// over a commented one
	let occurrence = lines
		.iter()
		.position(|line| matches!(opcache_value(line), Some((false, _))))
		.or_else(|| lines.iter().position(|line| opcache_value(line).is_some()));
	if let Some(position) = occurrence {
		// Rewrite exactly that line, leaving every other line alone
		lines[position] = &canonical;
		host.write_file(path, &rejoin(lines, &contents))?;
		return Ok(EditOutcome::Rewritten);
	}
	// The key is wholly absent, work out where to add it
	if fragment {
		// A dedicated fragment file never needs a section header
		lines.push("# Map the OPcache code segment onto huge pages (added by hugetune)");
		lines.push(&canonical);
	} else if let Some(position) = lines.iter().position(|line| line.contains(OPCACHE_SECTION)) {
		lines.insert(position + 1, &canonical);
	} else {
		// No section marker either, append a fresh section at end-of-file
		lines.push("");
		lines.push(OPCACHE_SECTION);
		lines.push(&canonical);
	}
	host.write_file(path, &rejoin(lines, &contents))?;
	Ok(EditOutcome::Applied)
}

/// Install the boot-time THP disable script and its service unit.
pub(crate) fn write_thp_service(host: &dyn HostEnvironment) -> Result<EditOutcome> {
	let script = Path::new(THP_SCRIPT);
	let unit = Path::new(THP_UNIT);
	// Report an unchanged install so re-runs are visibly no-ops
	let current = host.path_exists(script)
		&& host.path_exists(unit)
		&& host.read_file(script)? == THP_SCRIPT_BODY
		&& host.read_file(unit)? == THP_UNIT_BODY;
	if current {
		return Ok(EditOutcome::AlreadyPresent);
	}
	host.write_file(script, THP_SCRIPT_BODY)?;
	host.set_executable(script)?;
	host.write_file(unit, THP_UNIT_BODY)?;
	Ok(EditOutcome::Applied)
}

/// Whether a line carries the given bare or assigned directive key at the
/// start of the line.
fn is_directive(line: &str, key: &str) -> bool {
	match line.strip_prefix(key) {
		Some(rest) => rest.is_empty() || rest.starts_with([' ', '\t', '=']),
		None => false,
	}
}

/// Parse a line carrying the OPcache directive key into its commented flag
/// and assigned value, with surrounding whitespace removed.
fn opcache_value(line: &str) -> Option<(bool, String)> {
	let trimmed = line.trim_start();
	// A leading comment character still counts as an occurrence
	let (commented, body) = match trimmed.strip_prefix([';', '#']) {
		Some(rest) => (true, rest.trim_start()),
		None => (false, trimmed),
	};
	let rest = body.strip_prefix(OPCACHE_DIRECTIVE)?;
	let value = rest.trim_start().strip_prefix('=')?;
	Some((commented, value.trim().to_string()))
}

/// Join edited lines back together, preserving the trailing newline of the
/// original contents.
fn rejoin(lines: Vec<&str>, original: &str) -> String {
	let mut contents = lines.join("\n");
	if original.ends_with('\n') || original.is_empty() {
		contents.push('\n');
	}
	contents
}
