/// Normalise a size-with-unit string into megabytes.
///
/// The value is split into its digits (the magnitude) and everything else
/// (the unit). `G`/`GB` multiply by 1024, `K`/`KB` divide by 1024 rounding
/// down, and `M`/`MB` are the identity. Any other unit, including no unit at
/// all, falls through to the identity case, matching the convention that bare
/// cache-size values in MySQL and OPcache configs are megabytes. A value with
/// no digits converts to zero.
pub(crate) fn to_megabytes(value: &str) -> u64 {
	// Strip all non-digit characters to get the magnitude
	let digits: String = value.chars().filter(char::is_ascii_digit).collect();
	let magnitude: u64 = digits.parse().unwrap_or(0);
	// Strip all digit characters to get the unit
	let unit: String =
		value.chars().filter(|c| !c.is_ascii_digit()).collect::<String>().trim().to_uppercase();
	// Convert the magnitude into megabytes
	match unit.as_str() {
		"G" | "GB" => magnitude * 1024,
		"K" | "KB" => magnitude / 1024,
		_ => magnitude,
	}
}
