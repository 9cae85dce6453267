use crate::calculate::{FIXED_OVERHEAD_MB, MemoryBudget};
use crate::error::TuneError;
use crate::host::{Host, HostEnvironment};
use crate::report::{EditSummary, TuneReport};
use crate::writer::EditOutcome;
use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::process::exit;

mod activate;
mod calculate;
mod convert;
mod error;
mod extract;
mod host;
mod report;
mod resolver;
mod system;
mod writer;

#[derive(Parser, Debug)]
#[command(term_width = 0)]
pub(crate) struct Args {
	/// The PHP runtime to tune, e.g. `php83`
	pub(crate) version: Option<String>,

	/// Also install a boot-time service disabling transparent huge pages
	#[arg(long)]
	pub(crate) disable_thp: bool,

	/// Compute and log every change without touching the host
	#[arg(long)]
	pub(crate) dry_run: bool,

	/// Write a JSON report of the run to this path
	#[arg(long)]
	pub(crate) report: Option<PathBuf>,
}

fn main() -> Result<()> {
	// Initialise the logger
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
	// Parse the command line arguments
	let args = Args::parse();
	// Access the real host
	let host = Host;
	// A missing version token prints usage plus the installed runtimes
	let Some(version) = args.version.clone() else {
		eprintln!("Usage: hugetune [OPTIONS] <VERSION>");
		let versions = resolver::installed_versions(&host);
		match versions.is_empty() {
			true => eprintln!("No installed PHP runtimes found under {}", resolver::RUNTIME_ROOT),
			false => eprintln!("Installed PHP runtimes: {}", versions.join(", ")),
		}
		exit(2);
	};
	// Run the tuning pipeline
	run(&args, &version, &host)
}

fn run(args: &Args, version: &str, host: &dyn HostEnvironment) -> Result<()> {
	// Mutating the host requires superuser rights, a dry run does not
	if !args.dry_run && !host.is_superuser() {
		return Err(TuneError::PermissionDenied.into());
	}
	// Resolve and validate the configuration files for this runtime
	let paths = resolver::resolve(host, version)?;
	info!("Database configuration: {}", paths.mysql_config.display());
	info!("PHP configuration: {}", paths.php_config.display());
	match paths.fragment {
		true => info!("OPcache fragment: {}", paths.opcache_config.display()),
		false => {
			warn!("No dedicated OPcache fragment found, editing {}", paths.php_config.display())
		}
	}
	// The database buffer pool size is mandatory
	let mysql_contents = host.read_file(&paths.mysql_config)?;
	let buffer_pool = extract::setting(&mysql_contents, extract::BUFFER_POOL_KEY).ok_or_else(|| {
		TuneError::RequiredSettingMissing(extract::BUFFER_POOL_KEY, paths.mysql_config.clone())
	})?;
	// The OPcache settings fall back to their documented defaults
	let opcache_contents = host.read_file(&paths.opcache_config)?;
	let cache = extract::setting(&opcache_contents, extract::CACHE_MEMORY_KEY).unwrap_or_else(|| {
		warn!("`{}` not set, assuming {}", extract::CACHE_MEMORY_KEY, extract::CACHE_MEMORY_DEFAULT);
		extract::CACHE_MEMORY_DEFAULT.to_string()
	});
	let jit = extract::setting(&opcache_contents, extract::JIT_BUFFER_KEY).unwrap_or_else(|| {
		warn!("`{}` not set, assuming {}", extract::JIT_BUFFER_KEY, extract::JIT_BUFFER_DEFAULT);
		extract::JIT_BUFFER_DEFAULT.to_string()
	});
	// Normalise every component to megabytes
	let budget = MemoryBudget {
		buffer_pool_mb: convert::to_megabytes(&buffer_pool),
		cache_mb: convert::to_megabytes(&cache),
		jit_mb: convert::to_megabytes(&jit),
	};
	// Work out the page count from the native huge page size
	let page_size_kb = calculate::hugepage_size_kb(host);
	let pages = budget.pages(page_size_kb);
	info!(
		"Memory budget: {} MB ({} MB buffer pool + {} MB cache + {} MB JIT + {} MB overhead)",
		budget.total_mb(),
		budget.buffer_pool_mb,
		budget.cache_mb,
		budget.jit_mb,
		FIXED_OVERHEAD_MB
	);
	info!("Reserving {pages} huge pages of {page_size_kb} KB");
	// Sanity-check the budget against the physical memory of the host
	let system = system::SystemInfo::collect();
	if budget.total_mb().saturating_mul(1024 * 1024) > system.total_memory {
		warn!(
			"The {} MB budget exceeds the {} MB of physical memory on this host",
			budget.total_mb(),
			system.total_memory / (1024 * 1024)
		);
	}
	// A dry run stops before any mutation
	if args.dry_run {
		info!("Dry run: would overwrite {} with `vm.nr_hugepages = {pages}`", writer::SYSCTL_FILE);
		info!("Dry run: would ensure `large_pages` in {}", paths.mysql_config.display());
		info!(
			"Dry run: would ensure `opcache.huge_code_pages=1` in {}",
			paths.opcache_config.display()
		);
		if args.disable_thp {
			info!("Dry run: would install {} and {}", writer::THP_SCRIPT, writer::THP_UNIT);
		}
		info!("Dry run: no changes were made");
		return Ok(());
	}
	// Apply the idempotent edits
	let sysctl = writer::write_sysctl(host, pages)?;
	log_outcome(writer::SYSCTL_FILE, sysctl);
	let database = writer::apply_mysql_directive(host, &paths.mysql_config)?;
	log_outcome(&paths.mysql_config.display().to_string(), database);
	let opcache = writer::apply_opcache_directive(host, &paths.opcache_config, paths.fragment)?;
	log_outcome(&paths.opcache_config.display().to_string(), opcache);
	let thp_service = match args.disable_thp {
		true => {
			let outcome = writer::write_thp_service(host)?;
			log_outcome(writer::THP_UNIT, outcome);
			Some(outcome)
		}
		false => None,
	};
	// Load the kernel parameter immediately, not only on next boot
	activate::apply_sysctl(host)?;
	// Enable the service for future boots and run it now
	if thp_service.is_some() {
		activate::enable_thp_service(host)?;
	}
	// Write the JSON report when requested
	if let Some(path) = &args.report {
		let report = TuneReport {
			timestamp: chrono::Utc::now().timestamp(),
			version: version.to_string(),
			buffer_pool_mb: budget.buffer_pool_mb,
			cache_mb: budget.cache_mb,
			jit_mb: budget.jit_mb,
			overhead_mb: FIXED_OVERHEAD_MB,
			total_mb: budget.total_mb(),
			page_size_kb,
			page_count: pages,
			edits: EditSummary {
				sysctl,
				database,
				opcache,
				thp_service,
			},
			system,
		};
		report.write(host, path)?;
		info!("Report written to {}", path.display());
	}
	// Final instructions for the operator
	println!("--------------------------------------------------");
	println!(
		"Reserved {pages} huge pages ({page_size_kb} KB each) for a {} MB budget",
		budget.total_mb()
	);
	println!("To finish applying the new settings:");
	println!("  - restart the database server: systemctl restart mysqld");
	println!("  - restart PHP-FPM: systemctl restart {version}-php-fpm");
	println!("  - verify the reservation: grep HugePages_Total /proc/meminfo");
	println!("--------------------------------------------------");
	Ok(())
}

/// Log an edit outcome, surfacing skips as warnings.
fn log_outcome(artifact: &str, outcome: EditOutcome) {
	match outcome {
		EditOutcome::SkippedNoSectionMarker => warn!("{artifact}: {outcome}"),
		_ => info!("{artifact}: {outcome}"),
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::host::mock::MockHost;

	fn args() -> Args {
		Args {
			version: Some("php83".to_string()),
			disable_thp: false,
			dry_run: false,
			report: None,
		}
	}

	fn tuned_host() -> MockHost {
		MockHost::new()
			.with_file("/etc/my.cnf", "[mysqld]\ninnodb_buffer_pool_size = 8G\n")
			.with_file("/etc/opt/remi/php83/php.ini", "[PHP]\nengine = On\n")
			.with_file(
				"/etc/opt/remi/php83/php.d/10-opcache.ini",
				"opcache.enable=1\nopcache.memory_consumption = 256\nopcache.jit_buffer_size = 512M\n",
			)
			.with_file("/proc/meminfo", "MemTotal: 32768000 kB\nHugepagesize:       2048 kB\n")
	}

	#[test]
	fn a_full_run_writes_every_artifact_and_activates() {
		let host = tuned_host();
		run(&args(), "php83", &host).unwrap();
		// 8192 + 256 + 512 + 64 MB at 2048 KB pages, plus the margin
		assert!(host.file(writer::SYSCTL_FILE).unwrap().contains("vm.nr_hugepages = 4513"));
		assert!(host.file("/etc/my.cnf").unwrap().contains("large_pages"));
		let fragment = host.file("/etc/opt/remi/php83/php.d/10-opcache.ini").unwrap();
		assert!(fragment.ends_with("opcache.huge_code_pages=1\n"));
		assert_eq!(
			host.commands.borrow().as_slice(),
			["sysctl -p /etc/sysctl.d/80-hugetune.conf"]
		);
	}

	#[test]
	fn a_second_run_changes_nothing() {
		let host = tuned_host();
		run(&args(), "php83", &host).unwrap();
		let snapshot = host.files.borrow().clone();
		run(&args(), "php83", &host).unwrap();
		assert_eq!(*host.files.borrow(), snapshot);
	}

	#[test]
	fn the_extended_variant_installs_the_thp_service() {
		let host = tuned_host();
		let args = Args {
			disable_thp: true,
			..args()
		};
		run(&args, "php83", &host).unwrap();
		assert!(host.file(writer::THP_SCRIPT).is_some());
		assert!(host.file(writer::THP_UNIT).is_some());
		let commands = host.commands.borrow();
		assert!(commands.contains(&"systemctl daemon-reload".to_string()));
		assert!(commands.contains(&"systemctl enable hugetune-disable-thp.service".to_string()));
		assert!(commands.contains(&"systemctl start hugetune-disable-thp.service".to_string()));
	}

	#[test]
	fn a_missing_buffer_pool_size_aborts_before_any_mutation() {
		let host = tuned_host();
		host.files.borrow_mut().insert("/etc/my.cnf".into(), "[mysqld]\nuser = mysql\n".to_string());
		let err = run(&args(), "php83", &host).unwrap_err();
		assert!(err.to_string().contains("innodb_buffer_pool_size"));
		// No artifact was written and no command was executed
		assert!(host.file(writer::SYSCTL_FILE).is_none());
		assert!(host.commands.borrow().is_empty());
	}

	#[test]
	fn a_dry_run_performs_no_writes_and_no_commands() {
		let host = tuned_host();
		let snapshot = host.files.borrow().clone();
		let args = Args {
			dry_run: true,
			..args()
		};
		run(&args, "php83", &host).unwrap();
		assert_eq!(*host.files.borrow(), snapshot);
		assert!(host.commands.borrow().is_empty());
	}

	#[test]
	fn a_dry_run_does_not_require_superuser_rights() {
		let host = MockHost {
			superuser: false,
			..tuned_host()
		};
		let args = Args {
			dry_run: true,
			..args()
		};
		run(&args, "php83", &host).unwrap();
	}

	#[test]
	fn missing_superuser_rights_are_fatal() {
		let host = MockHost {
			superuser: false,
			..tuned_host()
		};
		let err = run(&args(), "php83", &host).unwrap_err();
		assert!(err.to_string().contains("superuser"));
	}

	#[test]
	fn optional_settings_fall_back_to_their_defaults() {
		let host = tuned_host();
		host.files.borrow_mut().insert(
			"/etc/opt/remi/php83/php.d/10-opcache.ini".into(),
			"opcache.enable=1\n".to_string(),
		);
		run(&args(), "php83", &host).unwrap();
		// 8192 + 128 + 0 + 64 MB => floor(8384 * 1024 / 2048) + 1
		assert!(host.file(writer::SYSCTL_FILE).unwrap().contains("vm.nr_hugepages = 4193"));
	}

	#[test]
	fn a_failing_activation_is_fatal() {
		let host = MockHost {
			failing_program: Some("sysctl".to_string()),
			..tuned_host()
		};
		let err = run(&args(), "php83", &host).unwrap_err();
		assert!(err.to_string().contains("sysctl"));
	}

	#[test]
	fn the_report_records_the_computed_reservation() {
		let host = tuned_host();
		let args = Args {
			report: Some(PathBuf::from("/root/report.json")),
			..args()
		};
		run(&args, "php83", &host).unwrap();
		let report = host.file("/root/report.json").unwrap();
		let json: serde_json::Value = serde_json::from_str(&report).unwrap();
		assert_eq!(json["page_count"], 4513);
		assert_eq!(json["total_mb"], 9024);
		assert_eq!(json["edits"]["sysctl"], "applied");
	}
}
