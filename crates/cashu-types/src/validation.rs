//! Validation of per-implementation configuration tables.
//!
//! Every pluggable backend (storage, price source) receives its own raw TOML
//! table. Backends describe the fields they accept with a [`Schema`] and
//! check the table before building themselves.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

/// Expected type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// Integer with inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
}

impl FieldType {
	fn name(&self) -> &'static str {
		match self {
			FieldType::String => "string",
			FieldType::Integer { .. } => "integer",
			FieldType::Boolean => "boolean",
		}
	}
}

/// Extra check run on a field after its type matched.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named, typed field in a [`Schema`].
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		let matches = match &self.field_type {
			FieldType::String => value.is_str(),
			FieldType::Boolean => value.is_bool(),
			FieldType::Integer { min, max } => match value.as_integer() {
				Some(n) => {
					if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
						return Err(ValidationError::InvalidValue {
							field: self.name.clone(),
							message: format!("Value {} is out of range", n),
						});
					}
					true
				},
				None => false,
			},
		};
		if !matches {
			return Err(ValidationError::TypeMismatch {
				field: self.name.clone(),
				expected: self.field_type.name().to_string(),
				actual: value.type_str().to_string(),
			});
		}
		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			})?;
		}
		Ok(())
	}
}

/// Required and optional fields of an implementation table.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Checks presence, type and custom validators of every declared field.
	///
	/// Undeclared keys are ignored.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table".to_string(),
				actual: config.type_str().to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}
		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}
		Ok(())
	}
}

/// Implemented by each backend's schema type.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

/// Ties a configuration name to the factory that builds the implementation.
pub trait ImplementationRegistry {
	/// Key under `implementations` in the config file.
	const NAME: &'static str;
	/// Factory function type of the implementation family.
	type Factory;

	fn factory() -> Self::Factory;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn table(src: &str) -> toml::Value {
		toml::from_str(src).unwrap()
	}

	#[test]
	fn test_required_and_optional_fields() {
		let schema = Schema::new(
			vec![Field::new("base_url", FieldType::String)],
			vec![Field::new(
				"timeout_seconds",
				FieldType::Integer {
					min: Some(1),
					max: Some(60),
				},
			)],
		);

		assert!(schema.validate(&table("base_url = \"http://x\"")).is_ok());
		assert!(matches!(
			schema.validate(&table("timeout_seconds = 5")),
			Err(ValidationError::MissingField(_))
		));
		assert!(matches!(
			schema.validate(&table("base_url = \"x\"\ntimeout_seconds = 0")),
			Err(ValidationError::InvalidValue { .. })
		));
		assert!(matches!(
			schema.validate(&table("base_url = 3")),
			Err(ValidationError::TypeMismatch { .. })
		));
	}

	#[test]
	fn test_custom_validator() {
		let schema = Schema::new(
			vec![Field::new("price", FieldType::String).with_validator(|v| {
				match v.as_str().map(|s| s.starts_with('-')) {
					Some(false) => Ok(()),
					_ => Err("must be positive".to_string()),
				}
			})],
			vec![],
		);
		assert!(schema.validate(&table("price = \"100\"")).is_ok());
		assert!(schema.validate(&table("price = \"-1\"")).is_err());
	}
}
