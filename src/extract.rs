/// The mandatory database buffer pool setting
pub(crate) const BUFFER_POOL_KEY: &str = "innodb_buffer_pool_size";
/// The OPcache shared memory setting
pub(crate) const CACHE_MEMORY_KEY: &str = "opcache.memory_consumption";
/// The OPcache JIT code buffer setting
pub(crate) const JIT_BUFFER_KEY: &str = "opcache.jit_buffer_size";

/// Fallback when `opcache.memory_consumption` is not set, the PHP default
pub(crate) const CACHE_MEMORY_DEFAULT: &str = "128M";
/// Fallback when `opcache.jit_buffer_size` is not set, the JIT is off
pub(crate) const JIT_BUFFER_DEFAULT: &str = "0M";

/// Extract a `key = value` setting from INI-style file contents.
///
/// Only a line starting with the key at column 0 matches, so commented-out
/// and indented occurrences are skipped. The returned value is the right-hand
/// side of the first `=` with all whitespace removed. Absence is `None`, not
/// an error; callers decide whether the setting is mandatory.
pub(crate) fn setting(contents: &str, key: &str) -> Option<String> {
	for line in contents.lines() {
		// The key must sit at the very start of the line
		let Some(rest) = line.strip_prefix(key) else {
			continue;
		};
		// The key must be followed by an assignment, this also rejects
		// longer keys sharing the same prefix
		let Some(value) = rest.trim_start().strip_prefix('=') else {
			continue;
		};
		// Strip all whitespace from the value
		return Some(value.split_whitespace().collect());
	}
	None
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn finds_the_first_matching_line() {
		let contents = "user = mysql\ninnodb_buffer_pool_size = 8G\ninnodb_buffer_pool_size = 1G\n";
		assert_eq!(setting(contents, BUFFER_POOL_KEY), Some("8G".to_string()));
	}

	#[test]
	fn whitespace_is_stripped_from_the_value() {
		let contents = "opcache.memory_consumption =  256 \n";
		assert_eq!(setting(contents, CACHE_MEMORY_KEY), Some("256".to_string()));
	}

	#[test]
	fn commented_lines_do_not_match() {
		let contents = "# innodb_buffer_pool_size = 8G\n; innodb_buffer_pool_size = 4G\n";
		assert_eq!(setting(contents, BUFFER_POOL_KEY), None);
	}

	#[test]
	fn indented_lines_do_not_match() {
		let contents = "\tinnodb_buffer_pool_size = 8G\n  innodb_buffer_pool_size = 4G\n";
		assert_eq!(setting(contents, BUFFER_POOL_KEY), None);
	}

	#[test]
	fn longer_keys_sharing_the_prefix_do_not_match() {
		let contents = "innodb_buffer_pool_size_extra = 2G\n";
		assert_eq!(setting(contents, BUFFER_POOL_KEY), None);
	}

	#[test]
	fn absence_is_a_marker_not_an_error() {
		assert_eq!(setting("user = mysql\n", BUFFER_POOL_KEY), None);
	}
}
