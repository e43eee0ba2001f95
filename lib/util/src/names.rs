//! Object name utilities
use thiserror::Error;

/// The ways a name may be invalid
#[derive(Debug, Error)]
pub enum NameError {
	/// This name is empty
	#[error("name cannot be empty")]
	Empty,

	/// This name is entirely whitespace
	#[error("name cannot be entirely whitespace")]
	IsWhitespace,

	/// This name has leading or trailing whitespace
	#[error("name cannot have leading or trailing whitespace")]
	TrimWhitespace,

	/// This name contains a path separator.
	/// Node names are joined with their pipeline id by a slash,
	/// so a slash inside a name would be ambiguous.
	#[error("name cannot contain `/`")]
	HasSlash,
}

/// Check the given node or pipeline name for errors.
pub fn check_name(name: &str) -> Result<(), NameError> {
	if name.is_empty() {
		return Err(NameError::Empty);
	}

	let trimmed = name.trim();
	if trimmed.is_empty() {
		return Err(NameError::IsWhitespace);
	}

	if trimmed.len() != name.len() {
		return Err(NameError::TrimWhitespace);
	}

	if name.contains('/') {
		return Err(NameError::HasSlash);
	}

	return Ok(());
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn names() {
		assert!(check_name("filewatcher").is_ok());
		assert!(check_name("file_watcher-2").is_ok());

		assert!(matches!(check_name(""), Err(NameError::Empty)));
		assert!(matches!(check_name("   "), Err(NameError::IsWhitespace)));
		assert!(matches!(check_name(" x"), Err(NameError::TrimWhitespace)));
		assert!(matches!(check_name("x "), Err(NameError::TrimWhitespace)));
		assert!(matches!(check_name("a/b"), Err(NameError::HasSlash)));
	}
}
