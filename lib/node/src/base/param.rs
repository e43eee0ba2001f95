use serde::{Deserialize, Serialize};
use smartstring::{LazyCompact, SmartString};
use utoipa::ToSchema;

/// A parameter given to a node in the pipeline config
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum NodeParameterValue {
	/// A boolean parameter
	Boolean(bool),

	/// An integer parameter
	Integer(i64),

	/// A float parameter
	Float(f64),

	/// A string parameter
	#[schema(value_type = String)]
	String(SmartString<LazyCompact>),
}

impl NodeParameterValue {
	/// Get this parameter as a string, if it is one
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(s) => Some(s),
			_ => None,
		}
	}

	/// Get this parameter as a float.
	/// Integers are widened, since TOML writes `1.0` as `1`.
	pub fn as_float(&self) -> Option<f64> {
		match self {
			Self::Float(x) => Some(*x),
			Self::Integer(x) => Some(*x as f64),
			_ => None,
		}
	}
}
