//! Setting schema definitions
//!
//! A client describes its settings with `SettingDefinition`s collected in a
//! `SchemaBuilder`, then registers the frozen `ClientSchema` with the authority.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::HashMap;

use crate::prelude::*;
use crate::types::{SettingValue, TypedValue};

/// Setting definition - metadata for one setting of a client
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingDefinition {
	pub name: String,
	pub description: String,
	/// Compiled-in default, the last fallback when neither the authority nor the
	/// offline cache can provide a value
	pub default_value: Option<TypedValue>,
	#[serde(default)]
	pub is_secret: bool,
	pub validation_regex: Option<String>,
	pub validation_explanation: Option<String>,
	pub group: Option<String>,
	#[serde(default)]
	pub advanced: bool,
}

impl SettingDefinition {
	pub fn builder(name: impl Into<String>) -> SettingDefinitionBuilder {
		SettingDefinitionBuilder::new(name)
	}

	/// Check a value against the type of the default and the validation regex
	pub fn validate(&self, value: &TypedValue) -> ClResult<()> {
		if let Some(default) = &self.default_value {
			if !value.matches_type(default) {
				return Err(Error::ValidationError(format!(
					"Type mismatch for setting '{}': expected {}, got {}",
					self.name,
					default.type_name(),
					value.type_name()
				)));
			}
		}
		if let Some(pattern) = &self.validation_regex {
			let re = Regex::new(pattern)
				.map_err(|e| Error::ValidationError(format!("invalid regex: {}", e)))?;
			if !re.is_match(&value.to_config_string()) {
				return Err(Error::ValidationError(
					self.validation_explanation
						.clone()
						.unwrap_or_else(|| format!("'{}' does not match {}", self.name, pattern)),
				));
			}
		}
		Ok(())
	}
}

/// Builder for SettingDefinition with fluent API
pub struct SettingDefinitionBuilder {
	name: String,
	description: Option<String>,
	default_value: Option<TypedValue>,
	is_secret: bool,
	validation_regex: Option<String>,
	validation_explanation: Option<String>,
	group: Option<String>,
	advanced: bool,
}

impl SettingDefinitionBuilder {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			description: None,
			default_value: None,
			is_secret: false,
			validation_regex: None,
			validation_explanation: None,
			group: None,
			advanced: false,
		}
	}

	/// Set the description (required)
	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}

	pub fn default(mut self, value: TypedValue) -> Self {
		self.default_value = Some(value);
		self
	}

	pub fn secret(mut self, is_secret: bool) -> Self {
		self.is_secret = is_secret;
		self
	}

	pub fn validation(mut self, regex: impl Into<String>, explanation: impl Into<String>) -> Self {
		self.validation_regex = Some(regex.into());
		self.validation_explanation = Some(explanation.into());
		self
	}

	pub fn group(mut self, group: impl Into<String>) -> Self {
		self.group = Some(group.into());
		self
	}

	pub fn advanced(mut self, advanced: bool) -> Self {
		self.advanced = advanced;
		self
	}

	pub fn build(self) -> ClResult<SettingDefinition> {
		if self.name.trim().is_empty() {
			return Err(Error::ConfigError("Setting name is required".into()));
		}
		let description = self.description.ok_or_else(|| {
			Error::ConfigError(format!("Setting '{}' needs a description", self.name))
		})?;
		if let Some(pattern) = &self.validation_regex {
			Regex::new(pattern).map_err(|e| {
				Error::ConfigError(format!("Setting '{}' has an invalid regex: {}", self.name, e))
			})?;
		}

		Ok(SettingDefinition {
			name: self.name,
			description,
			default_value: self.default_value,
			is_secret: self.is_secret,
			validation_regex: self.validation_regex,
			validation_explanation: self.validation_explanation,
			group: self.group,
			advanced: self.advanced,
		})
	}
}

/// Registration payload: everything the authority needs to know about a client
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSchema {
	pub name: String,
	pub description: String,
	pub instance: Option<String>,
	pub settings: Vec<SettingDefinition>,
}

impl ClientSchema {
	pub fn get(&self, name: &str) -> Option<&SettingDefinition> {
		self.settings.iter().find(|s| s.name == name)
	}

	/// Values built from the declared defaults
	pub fn default_values(&self) -> Vec<SettingValue> {
		self.settings
			.iter()
			.filter_map(|def| {
				def.default_value.as_ref().map(|value| SettingValue {
					name: def.name.clone(),
					value: Some(value.clone()),
					is_secret: def.is_secret,
					last_changed: None,
				})
			})
			.collect()
	}
}

/// Mutable collection of definitions used while a client is being wired up
pub struct SchemaBuilder {
	name: String,
	description: String,
	definitions: Vec<SettingDefinition>,
	index: HashMap<String, usize>,
}

impl SchemaBuilder {
	pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			description: description.into(),
			definitions: Vec::new(),
			index: HashMap::new(),
		}
	}

	/// Register a new setting definition
	pub fn register(&mut self, def: SettingDefinition) -> ClResult<&mut Self> {
		if self.index.contains_key(&def.name) {
			return Err(Error::ConfigError(format!("Setting '{}' is already registered", def.name)));
		}
		debug!("Registering setting: {}", def.name);
		self.index.insert(def.name.clone(), self.definitions.len());
		self.definitions.push(def);
		Ok(self)
	}

	/// Freeze into the registration payload
	pub fn build(self, instance: Option<&str>) -> ClResult<ClientSchema> {
		if self.name.trim().is_empty() {
			return Err(Error::ConfigError("Client name is required".into()));
		}
		Ok(ClientSchema {
			name: self.name,
			description: self.description,
			instance: instance.map(str::to_string),
			settings: self.definitions,
		})
	}

	pub fn len(&self) -> usize {
		self.definitions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.definitions.is_empty()
	}
}


// vim: ts=4
