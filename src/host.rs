use crate::error::TuneError;
use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tempfile::NamedTempFile;

/// Access to the host filesystem and to external commands.
///
/// Every pipeline stage goes through this trait, so a whole run can be
/// exercised against an in-memory mock without touching the machine.
pub(crate) trait HostEnvironment {
	/// Read a whole file as UTF-8 text
	fn read_file(&self, path: &Path) -> Result<String>;
	/// Replace the contents of a file
	fn write_file(&self, path: &Path, contents: &str) -> Result<()>;
	/// Check whether a path exists
	fn path_exists(&self, path: &Path) -> bool;
	/// List the entry names of a directory, sorted
	fn list_dir(&self, path: &Path) -> Result<Vec<String>>;
	/// Mark a file as executable
	fn set_executable(&self, path: &Path) -> Result<()>;
	/// Run an external command once, returning its trimmed stdout
	fn exec(&self, program: &str, args: &[&str]) -> Result<String>;
	/// Whether the process runs with superuser rights
	fn is_superuser(&self) -> bool;
}

/// The real host.
pub(crate) struct Host;

impl HostEnvironment for Host {
	fn read_file(&self, path: &Path) -> Result<String> {
		fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
	}

	fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
		// Write into the target directory first, then rename over the
		// destination, so a failed run never leaves a truncated file.
		let dir = path.parent().unwrap_or_else(|| Path::new("/"));
		let mut file = NamedTempFile::new_in(dir)
			.with_context(|| format!("failed to create a temporary file in {}", dir.display()))?;
		file.write_all(contents.as_bytes())
			.with_context(|| format!("failed to write {}", path.display()))?;
		file.persist(path).with_context(|| format!("failed to replace {}", path.display()))?;
		Ok(())
	}

	fn path_exists(&self, path: &Path) -> bool {
		path.exists()
	}

	fn list_dir(&self, path: &Path) -> Result<Vec<String>> {
		// Collect the entry names of the directory
		let entries = fs::read_dir(path)
			.with_context(|| format!("failed to list {}", path.display()))?;
		let mut names: Vec<String> =
			entries.filter_map(|e| Some(e.ok()?.file_name().to_string_lossy().into_owned())).collect();
		// Sort for a deterministic first-match search
		names.sort();
		Ok(names)
	}

	fn set_executable(&self, path: &Path) -> Result<()> {
		use std::os::unix::fs::PermissionsExt;
		fs::set_permissions(path, fs::Permissions::from_mode(0o755))
			.with_context(|| format!("failed to mark {} as executable", path.display()))
	}

	fn exec(&self, program: &str, args: &[&str]) -> Result<String> {
		// Output debug information to the logs
		info!("Running command `{program} {}`", args.join(" "));
		// Create a new process command
		let output = Command::new(program)
			.args(args)
			.output()
			.with_context(|| format!("failed to execute `{program}`"))?;
		// Check the exit status of the command
		match output.status.success() {
			// Get the stdout out from the command
			true => Ok(String::from_utf8_lossy(&output.stdout).trim().to_string()),
			// Surface the stderr of the failed command
			false => Err(TuneError::CommandFailed {
				command: format!("{program} {}", args.join(" ")),
				stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
			}
			.into()),
		}
	}

	fn is_superuser(&self) -> bool {
		nix::unistd::geteuid().is_root()
	}
}

#[cfg(test)]
pub(crate) mod mock {
	use super::*;
	use std::cell::RefCell;
	use std::collections::BTreeMap;
	use std::path::PathBuf;

	/// An in-memory host for pipeline tests. Files live in a map keyed by
	/// absolute path, and executed commands are recorded instead of run.
	#[derive(Default)]
	pub(crate) struct MockHost {
		pub(crate) files: RefCell<BTreeMap<PathBuf, String>>,
		pub(crate) executables: RefCell<Vec<PathBuf>>,
		pub(crate) commands: RefCell<Vec<String>>,
		pub(crate) failing_program: Option<String>,
		pub(crate) superuser: bool,
	}

	impl MockHost {
		pub(crate) fn new() -> Self {
			Self {
				superuser: true,
				..Self::default()
			}
		}

		pub(crate) fn with_file(self, path: &str, contents: &str) -> Self {
			self.files.borrow_mut().insert(PathBuf::from(path), contents.to_string());
			self
		}

		pub(crate) fn file(&self, path: &str) -> Option<String> {
			self.files.borrow().get(Path::new(path)).cloned()
		}
	}

	impl HostEnvironment for MockHost {
		fn read_file(&self, path: &Path) -> Result<String> {
			self.file(&path.to_string_lossy())
				.ok_or_else(|| anyhow::anyhow!("failed to read {}", path.display()))
		}

		fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
			self.files.borrow_mut().insert(path.to_path_buf(), contents.to_string());
			Ok(())
		}

		fn path_exists(&self, path: &Path) -> bool {
			// A path exists when it holds a file or is a parent of one
			self.files.borrow().keys().any(|p| p == path || p.starts_with(path))
		}

		fn list_dir(&self, path: &Path) -> Result<Vec<String>> {
			// Derive the immediate child names from the stored file paths
			let mut names: Vec<String> = self
				.files
				.borrow()
				.keys()
				.filter_map(|p| p.strip_prefix(path).ok())
				.filter_map(|p| p.components().next())
				.map(|c| c.as_os_str().to_string_lossy().into_owned())
				.collect();
			names.sort();
			names.dedup();
			match names.is_empty() {
				true => Err(anyhow::anyhow!("failed to list {}", path.display())),
				false => Ok(names),
			}
		}

		fn set_executable(&self, path: &Path) -> Result<()> {
			self.executables.borrow_mut().push(path.to_path_buf());
			Ok(())
		}

		fn exec(&self, program: &str, args: &[&str]) -> Result<String> {
			let command = format!("{program} {}", args.join(" "));
			self.commands.borrow_mut().push(command.clone());
			match self.failing_program.as_deref() == Some(program) {
				true => Err(TuneError::CommandFailed {
					command,
					stderr: "mock failure".to_string(),
				}
				.into()),
				false => Ok(String::new()),
			}
		}

		fn is_superuser(&self) -> bool {
			self.superuser
		}
	}
}
