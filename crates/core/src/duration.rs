//! Duration helpers shared by config and CA issuance.
//!
//! `serde_dur` serializes a `Duration` as a plain number of seconds
//! (`#[serde(with = "serde_dur")]`). `parse_human` reads the `1h30m`-style
//! strings used in config command-labels and CLI flags.

use std::time::Duration;

pub mod serde_dur {
	use super::Duration;
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		s.serialize_u64(d.as_secs())
	}

	pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let secs = u64::deserialize(d)?;
		Ok(Duration::from_secs(secs))
	}
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
	#[error("empty duration string")]
	Empty,
	#[error("invalid duration component {0:?}")]
	InvalidComponent(String),
}

/// Parses a Go-style human duration like `1h30m`, `90s`, `500ms`. Units
/// supported: `ms`, `s`, `m`, `h`. Hand-rolled because no pulled-in
/// dependency provides a Go-style duration parser.
pub fn parse_human(input: &str) -> Result<Duration, ParseError> {
	let input = input.trim();
	if input.is_empty() {
		return Err(ParseError::Empty);
	}

	let mut total = Duration::ZERO;
	let mut num_start = 0usize;
	let bytes = input.as_bytes();
	let mut i = 0usize;
	while i < bytes.len() {
		// Accumulate the numeric (and optionally fractional) prefix.
		while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
			i += 1;
		}
		if i == num_start {
			return Err(ParseError::InvalidComponent(input.to_string()));
		}
		let number: f64 = input[num_start..i]
			.parse()
			.map_err(|_| ParseError::InvalidComponent(input[num_start..i].to_string()))?;

		let unit_start = i;
		while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
			i += 1;
		}
		let unit = &input[unit_start..i];
		let component = match unit {
			"ms" => Duration::from_secs_f64(number / 1000.0),
			"s" => Duration::from_secs_f64(number),
			"m" => Duration::from_secs_f64(number * 60.0),
			"h" => Duration::from_secs_f64(number * 3600.0),
			other => return Err(ParseError::InvalidComponent(other.to_string())),
		};
		total += component;
		num_start = i;
	}

	Ok(total)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_compound_duration() {
		assert_eq!(parse_human("1h30m").unwrap(), Duration::from_secs(5400));
	}

	#[test]
	fn parses_single_unit() {
		assert_eq!(parse_human("90s").unwrap(), Duration::from_secs(90));
		assert_eq!(parse_human("500ms").unwrap(), Duration::from_millis(500));
	}

	#[test]
	fn rejects_empty_and_garbage() {
		assert_eq!(parse_human(""), Err(ParseError::Empty));
		assert!(parse_human("potato").is_err());
	}
}
