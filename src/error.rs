use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions which abort the run. Soft conditions (missing optional
/// settings, missing section markers) are reported as edit outcomes instead.
#[derive(Debug, Error)]
pub(crate) enum TuneError {
	#[error("this tool must be run with superuser rights")]
	PermissionDenied,
	#[error("configuration file not found: {0}")]
	ConfigNotFound(PathBuf),
	#[error("required setting `{0}` is missing from {1}")]
	RequiredSettingMissing(&'static str, PathBuf),
	#[error("command `{command}` failed: {stderr}")]
	CommandFailed {
		command: String,
		stderr: String,
	},
}
