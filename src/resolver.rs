use crate::error::TuneError;
use crate::host::HostEnvironment;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Fixed path of the database server configuration
pub(crate) const MYSQL_CONFIG: &str = "/etc/my.cnf";
/// Root directory holding one subdirectory per installed PHP runtime
pub(crate) const RUNTIME_ROOT: &str = "/etc/opt/remi";

/// Subdirectory searched for a dedicated OPcache fragment
const FRAGMENT_DIR: &str = "php.d";
/// Suffix identifying an OPcache fragment file, e.g. `10-opcache.ini`
const FRAGMENT_SUFFIX: &str = "opcache.ini";
/// Prefix of runtime directory names, e.g. `php83`
const VERSION_PREFIX: &str = "php";

/// The configuration files a run reads and edits.
#[derive(Debug)]
pub(crate) struct ResolvedPaths {
	/// The database server configuration
	pub(crate) mysql_config: PathBuf,
	/// The runtime's primary configuration file
	pub(crate) php_config: PathBuf,
	/// The file receiving the OPcache directive
	pub(crate) opcache_config: PathBuf,
	/// Whether `opcache_config` is a dedicated fragment. When no fragment
	/// was found this is false and the primary file is edited instead,
	/// which changes the insertion strategy of the writer.
	pub(crate) fragment: bool,
}

/// Resolve and validate the configuration files for a version token.
///
/// Read-only; the run aborts here, before any mutation, when either the
/// runtime's primary configuration or the database configuration is absent.
pub(crate) fn resolve(host: &dyn HostEnvironment, version: &str) -> Result<ResolvedPaths> {
	// Derive the primary configuration file from the version token
	let runtime_root = Path::new(RUNTIME_ROOT).join(version);
	let php_config = runtime_root.join("php.ini");
	// The primary configuration file must exist and be readable
	if !host.path_exists(&php_config) || host.read_file(&php_config).is_err() {
		return Err(TuneError::ConfigNotFound(php_config).into());
	}
	// Search the conventional subdirectory for a dedicated OPcache fragment
	let fragment_dir = runtime_root.join(FRAGMENT_DIR);
	let fragment_file = match host.list_dir(&fragment_dir) {
		Ok(entries) => entries
			.into_iter()
			.find(|name| name.ends_with(FRAGMENT_SUFFIX))
			.map(|name| fragment_dir.join(name)),
		Err(_) => None,
	};
	// Fall back to the primary configuration when no fragment was found
	let (opcache_config, fragment) = match fragment_file {
		Some(path) => (path, true),
		None => (php_config.clone(), false),
	};
	// The database configuration must exist as well
	let mysql_config = PathBuf::from(MYSQL_CONFIG);
	if !host.path_exists(&mysql_config) {
		return Err(TuneError::ConfigNotFound(mysql_config).into());
	}
	Ok(ResolvedPaths {
		mysql_config,
		php_config,
		opcache_config,
		fragment,
	})
}

/// Best-effort enumeration of the installed runtimes for the usage message.
pub(crate) fn installed_versions(host: &dyn HostEnvironment) -> Vec<String> {
	match host.list_dir(Path::new(RUNTIME_ROOT)) {
		Ok(entries) => entries.into_iter().filter(|name| name.starts_with(VERSION_PREFIX)).collect(),
		Err(_) => Vec::new(),
	}
}
