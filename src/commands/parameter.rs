//! Typed parameter definitions and validation of raw execution values

use std::collections::HashMap;
use std::fmt;

use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A parameter value rejected by [`validate`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required parameter: {name}")]
    MissingParameter { name: String },
    #[error("Invalid value for parameter '{name}': {value}")]
    InvalidValue { name: String, value: String },
}

/// A raw value supplied for one parameter at execution time
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum ParamValue {
    Switch(bool),
    Text(String),
    List(Vec<String>),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Switch(value) => write!(f, "{value}"),
            ParamValue::Text(value) => write!(f, "{value:?}"),
            ParamValue::List(values) => write!(f, "{values:?}"),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Switch(value)
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(values: Vec<&str>) -> Self {
        ParamValue::List(values.into_iter().map(str::to_string).collect())
    }
}

/// Flat mapping from parameter name to raw value, as sent by a client
pub type ExecuteParams = HashMap<String, ParamValue>;

/// One selectable entry of a `select` parameter
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

/// Default of a `select` parameter; a list only makes sense with `multiple`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum SelectDefault {
    One(String),
    Many(Vec<String>),
}

impl Default for SelectDefault {
    fn default() -> Self {
        SelectDefault::One(String::new())
    }
}

fn default_true() -> bool {
    true
}

/// Free text parameter
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct InputParameter {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: String,
}

/// Parameter restricted to a fixed list of option values
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct SelectParameter {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub default: SelectDefault,
    /// Accept a list of option values instead of a single one
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub options: Vec<SelectOption>,
}

impl SelectParameter {
    fn allows(&self, value: &str) -> bool {
        self.options.iter().any(|option| option.value == value)
    }
}

/// Boolean on/off parameter
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct SwitchParameter {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub default: bool,
}

/// A parameter accepted by a command, discriminated by its `type` field
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Parameter {
    Input(InputParameter),
    Select(SelectParameter),
    Switch(SwitchParameter),
}

impl Parameter {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Parameter::Input(p) => &p.name,
            Parameter::Select(p) => &p.name,
            Parameter::Switch(p) => &p.name,
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Parameter::Input(p) => &p.label,
            Parameter::Select(p) => &p.label,
            Parameter::Switch(p) => &p.label,
        }
    }

    #[must_use]
    pub fn required(&self) -> bool {
        match self {
            Parameter::Input(p) => p.required,
            Parameter::Select(p) => p.required,
            Parameter::Switch(p) => p.required,
        }
    }

    /// Flag parameters are passed by name (`-Verbose`) rather than by position
    #[must_use]
    pub fn is_flag(&self) -> bool {
        self.name().starts_with('-')
    }

    /// Check a raw value against this definition's kind-specific rules.
    #[must_use]
    pub fn check_value(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (Parameter::Input(p), ParamValue::Text(text)) => {
                !(p.required && text.trim().is_empty())
            }
            (Parameter::Select(p), ParamValue::Text(text)) if !p.multiple => {
                p.allows(text) || (!p.required && text.trim().is_empty())
            }
            (Parameter::Select(p), ParamValue::List(items)) if p.multiple => {
                items.iter().all(|item| p.allows(item))
            }
            (Parameter::Switch(_), ParamValue::Switch(_)) => true,
            _ => false,
        }
    }
}

/// Validate raw execution values against a command's parameter definitions.
///
/// Every declared parameter must be present, whatever its kind or `required`
/// flag; presence is checked before the value itself. Values for names the
/// command does not declare are ignored.
///
/// # Errors
///
/// Returns the first `ValidationError` found, naming the offending parameter.
pub fn validate(
    definitions: &[Parameter],
    values: &ExecuteParams,
) -> Result<(), ValidationError> {
    for definition in definitions {
        let name = definition.name();
        let Some(value) = values.get(name) else {
            return Err(ValidationError::MissingParameter {
                name: name.to_string(),
            });
        };
        if !definition.check_value(value) {
            return Err(ValidationError::InvalidValue {
                name: name.to_string(),
                value: value.to_string(),
            });
        }
    }

    for key in values.keys() {
        if !definitions.iter().any(|d| d.name() == key.as_str()) {
            debug!("Ignoring undeclared parameter '{key}'");
        }
    }
    Ok(())
}
