//! Turning a command definition plus validated parameters into an argv
//!
//! Each script kind has one [`ScriptBuilder`]. Builders are collected in an
//! explicit [`BuilderRegistry`] created at startup; nothing registers itself.

pub mod powershell;
pub mod python;
pub mod shell;

use std::collections::HashMap;
use std::fmt;

use log::debug;
use thiserror::Error;

use crate::commands::command::{Command, ScriptKind};
use crate::commands::parameter::{ExecuteParams, ParamValue, Parameter};

use self::powershell::PowerShellBuilder;
use self::python::PythonBuilder;
use self::shell::ShellBuilder;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuilderError {
    #[error("Unsupported script type: {0}")]
    UnsupportedKind(ScriptKind),
}

/// Command-line strategy for one script kind.
///
/// `build` is only called with parameters that already passed validation
/// and never fails.
pub trait ScriptBuilder: Send + Sync {
    fn kind(&self) -> ScriptKind;

    /// Interpreter used when the command does not name its own
    fn default_program(&self) -> &str;

    /// Fixed arguments placed between the interpreter and the script path
    fn flags(&self) -> &[&'static str] {
        &[]
    }

    /// Whether a command's `interpreter` field may replace the default
    fn supports_interpreter_override(&self) -> bool {
        true
    }

    fn program(&self, command: &Command) -> String {
        match command.interpreter {
            Some(ref interpreter) if self.supports_interpreter_override() => interpreter.clone(),
            _ => self.default_program().to_string(),
        }
    }

    fn build(&self, command: &Command, params: &ExecuteParams) -> Vec<String> {
        let mut argv = vec![self.program(command)];
        argv.extend(self.flags().iter().map(|flag| (*flag).to_string()));
        argv.push(command.path.display().to_string());
        argv.extend(expand_parameters(&command.parameters, params));
        debug!("Built command line for '{}': {argv:?}", command.name);
        argv
    }
}

/// Expand parameter values into arguments, in declaration order.
///
/// Flag parameters (names starting with `-`) emit their name when switched on
/// or given a non-blank string. Strings emit their trimmed value, lists one
/// argument per non-blank element. Blank values emit nothing.
#[must_use]
pub fn expand_parameters(definitions: &[Parameter], values: &ExecuteParams) -> Vec<String> {
    let mut args = Vec::new();
    for definition in definitions {
        let Some(value) = values.get(definition.name()) else {
            continue;
        };
        match value {
            ParamValue::Switch(on) => {
                if *on && definition.is_flag() {
                    args.push(definition.name().to_string());
                }
            }
            ParamValue::Text(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    if definition.is_flag() {
                        args.push(definition.name().to_string());
                    }
                    args.push(text.to_string());
                }
            }
            ParamValue::List(items) => args.extend(
                items
                    .iter()
                    .map(|item| item.trim())
                    .filter(|item| !item.is_empty())
                    .map(str::to_string),
            ),
        }
    }
    args
}

/// Explicit mapping from script kind to its builder
pub struct BuilderRegistry {
    builders: HashMap<ScriptKind, Box<dyn ScriptBuilder>>,
}

impl BuilderRegistry {
    /// An empty registry; every kind is unsupported until registered.
    #[must_use]
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Registry with a builder for every built-in kind. `interpreters`
    /// replaces the default program of individual kinds.
    #[must_use]
    pub fn with_defaults(interpreters: &HashMap<ScriptKind, String>) -> Self {
        let program = |kind: ScriptKind| interpreters.get(&kind).cloned();
        let mut registry = Self::new();
        registry.register(Box::new(PowerShellBuilder::windows(program(
            ScriptKind::WinPowerShell,
        ))));
        registry.register(Box::new(PowerShellBuilder::core(program(
            ScriptKind::PowerShell,
        ))));
        registry.register(Box::new(PythonBuilder::new(program(ScriptKind::Python))));
        registry.register(Box::new(ShellBuilder::new(program(ScriptKind::Shell))));
        registry
    }

    /// Add a builder, replacing any previous one for the same kind.
    pub fn register(&mut self, builder: Box<dyn ScriptBuilder>) {
        self.builders.insert(builder.kind(), builder);
    }

    /// Select the builder for `kind`.
    ///
    /// # Errors
    ///
    /// Returns `BuilderError::UnsupportedKind` if no builder is registered.
    pub fn get(&self, kind: ScriptKind) -> Result<&dyn ScriptBuilder, BuilderError> {
        self.builders
            .get(&kind)
            .map(Box::as_ref)
            .ok_or(BuilderError::UnsupportedKind(kind))
    }

    /// Registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<ScriptKind> {
        let mut kinds: Vec<ScriptKind> = self.builders.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl Default for BuilderRegistry {
    fn default() -> Self {
        Self::with_defaults(&HashMap::new())
    }
}

impl fmt::Debug for BuilderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::commands::parameter::{InputParameter, SelectParameter, SwitchParameter};

    pub(crate) fn command(kind: ScriptKind, parameters: Vec<Parameter>) -> Command {
        Command {
            id: 1,
            name: "deploy".to_string(),
            label: "Deploy".to_string(),
            description: String::new(),
            kind,
            path: PathBuf::from("/scripts/deploy"),
            interpreter: None,
            new_console: false,
            parameters,
        }
    }

    pub(crate) fn input(name: &str) -> Parameter {
        Parameter::Input(InputParameter {
            name: name.to_string(),
            label: name.to_string(),
            description: String::new(),
            required: false,
            default: String::new(),
        })
    }

    pub(crate) fn switch(name: &str) -> Parameter {
        Parameter::Switch(SwitchParameter {
            name: name.to_string(),
            label: name.to_string(),
            description: String::new(),
            required: true,
            default: false,
        })
    }

    pub(crate) fn multi_select(name: &str) -> Parameter {
        Parameter::Select(SelectParameter {
            name: name.to_string(),
            label: name.to_string(),
            description: String::new(),
            required: true,
            default: crate::commands::parameter::SelectDefault::default(),
            multiple: true,
            options: Vec::new(),
        })
    }

    fn values(entries: Vec<(&str, ParamValue)>) -> ExecuteParams {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_flag_expansion() {
        let defs = vec![switch("-Force"), switch("-DryRun"), input("-Name"), input("-Tag")];
        let args = expand_parameters(
            &defs,
            &values(vec![
                ("-Force", true.into()),
                ("-DryRun", false.into()),
                ("-Name", " web ".into()),
                ("-Tag", "  ".into()),
            ]),
        );
        assert_eq!(args, vec!["-Force", "-Name", "web"]);
    }

    #[test]
    fn test_positional_and_list_expansion() {
        let defs = vec![input("target"), multi_select("hosts"), switch("quiet")];
        let args = expand_parameters(
            &defs,
            &values(vec![
                ("target", " prod ".into()),
                ("hosts", vec!["b", " ", "a"].into()),
                ("quiet", true.into()),
            ]),
        );
        assert_eq!(args, vec!["prod", "b", "a"]);
    }

    #[test]
    fn test_expansion_follows_declaration_order() {
        let defs = vec![input("first"), input("second")];
        let args = expand_parameters(
            &defs,
            &values(vec![("second", "2".into()), ("first", "1".into())]),
        );
        assert_eq!(args, vec!["1", "2"]);
    }

    #[test]
    fn test_registry_rejects_unregistered_kind() {
        let mut registry = BuilderRegistry::new();
        registry.register(Box::new(ShellBuilder::new(None)));
        assert!(registry.get(ScriptKind::Shell).is_ok());
        assert_eq!(
            registry.get(ScriptKind::Python).err(),
            Some(BuilderError::UnsupportedKind(ScriptKind::Python))
        );
    }

    #[test]
    fn test_registry_defaults_cover_all_kinds() {
        let registry = BuilderRegistry::default();
        assert_eq!(
            registry.kinds(),
            vec![
                ScriptKind::WinPowerShell,
                ScriptKind::PowerShell,
                ScriptKind::Python,
                ScriptKind::Shell
            ]
        );
    }

    #[test]
    fn test_configured_interpreter_replaces_default() {
        let interpreters = HashMap::from([(ScriptKind::Python, "/opt/py/bin/python3".to_string())]);
        let registry = BuilderRegistry::with_defaults(&interpreters);
        let cmd = command(ScriptKind::Python, vec![]);
        let argv = registry
            .get(ScriptKind::Python)
            .unwrap()
            .build(&cmd, &ExecuteParams::new());
        assert_eq!(argv, vec!["/opt/py/bin/python3", "/scripts/deploy"]);
    }
}
