//! Catalog source file handling
//!
//! The source is a JSON array of nodes, or a script package object wrapping
//! such an array. Every node is discriminated by its `type` field:
//! `scriptgroup` for groups, a script kind tag for commands.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use log::warn;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::commands::command::{Command, ScriptKind};
use crate::commands::group::CommandGroup;
use crate::commands::ids::{IdCounter, NodeId};
use crate::commands::node::CommandNode;
use crate::commands::parameter::Parameter;

/// Errors that can occur while loading a catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Catalog file not found: {0}")]
    NotFound(PathBuf),
    #[error("Unable to read catalog file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to parse JSON catalog file {path}: {source}")]
    Json {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("Cannot resolve script paths relative to catalog source: {0}")]
    UnresolvableSource(PathBuf),
    #[error("Duplicate ID in catalog: {0}")]
    DuplicateId(NodeId),
    #[error("Duplicate parameter '{name}' in command '{command}'")]
    DuplicateParameter { command: String, name: String },
    #[error("Invalid catalog: {0}")]
    Validation(String),
}

/// A group of nodes in the source file
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct SourceGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub children: Vec<SourceNode>,
}

/// A script in the source file; its kind is the node's `type` tag
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct SourceCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    /// Script path, relative to the catalog file unless absolute
    pub path: String,
    /// Interpreter to use instead of the kind's default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
    /// Open a console window of its own (Windows only)
    #[serde(default)]
    pub newconsole: bool,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

/// A node of the source tree, discriminated by `type`
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(tag = "type")]
pub enum SourceNode {
    #[serde(rename = "scriptgroup")]
    Group(SourceGroup),
    #[serde(rename = "winpowershell")]
    WinPowerShell(SourceCommand),
    #[serde(rename = "powershell")]
    PowerShell(SourceCommand),
    #[serde(rename = "python")]
    Python(SourceCommand),
    #[serde(rename = "shell")]
    Shell(SourceCommand),
}

impl SourceNode {
    fn id(&self) -> Option<NodeId> {
        match self {
            SourceNode::Group(group) => group.id,
            SourceNode::WinPowerShell(cmd)
            | SourceNode::PowerShell(cmd)
            | SourceNode::Python(cmd)
            | SourceNode::Shell(cmd) => cmd.id,
        }
    }

    fn command(kind: ScriptKind, cmd: SourceCommand) -> Self {
        match kind {
            ScriptKind::WinPowerShell => SourceNode::WinPowerShell(cmd),
            ScriptKind::PowerShell => SourceNode::PowerShell(cmd),
            ScriptKind::Python => SourceNode::Python(cmd),
            ScriptKind::Shell => SourceNode::Shell(cmd),
        }
    }
}

/// A distributable bundle of scripts with an optional bundled Python
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct SourcePackage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    /// Install hint shown to users, e.g. a requirements command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<String>,
    /// Default interpreter for `python` scripts in this package
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python: Option<String>,
    pub scripts: Vec<SourceNode>,
}

/// Root of a catalog source file
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum CatalogSource {
    Nodes(Vec<SourceNode>),
    Package(SourcePackage),
}

impl CatalogSource {
    /// Parse catalog JSON, choosing the root shape from its first token.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Json` if the text does not match the format.
    pub fn from_json(text: &str, path: &Path) -> Result<Self, CatalogError> {
        let to_error = |source| CatalogError::Json {
            source,
            path: path.to_path_buf(),
        };
        if text.trim_start().starts_with('[') {
            serde_json::from_str(text)
                .map(CatalogSource::Nodes)
                .map_err(to_error)
        } else {
            serde_json::from_str(text)
                .map(CatalogSource::Package)
                .map_err(to_error)
        }
    }
}

/// Resolve `value` against `base` unless it is already absolute.
#[must_use]
pub fn resolve_path(base: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    joined
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Interpreters given as bare program names are looked up on `PATH`;
/// anything containing a separator is treated as a path.
fn resolve_interpreter(base: &Path, value: &str) -> String {
    if value.contains('/') || value.contains('\\') {
        resolve_path(base, value).display().to_string()
    } else {
        value.to_string()
    }
}

/// State carried through one conversion of source nodes into catalog nodes
pub(crate) struct Loader<'a> {
    base_dir: &'a Path,
    default_python: Option<String>,
    ids: IdCounter,
}

impl<'a> Loader<'a> {
    pub(crate) fn new(base_dir: &'a Path, default_python: Option<&str>) -> Self {
        Self {
            base_dir,
            default_python: default_python.map(|p| resolve_interpreter(base_dir, p)),
            ids: IdCounter::new(),
        }
    }

    pub(crate) fn default_python(&self) -> Option<&str> {
        self.default_python.as_deref()
    }

    /// Claim every explicit ID in the tree before any are generated.
    pub(crate) fn claim_ids(&mut self, nodes: &[SourceNode]) -> Result<(), CatalogError> {
        for node in nodes {
            if let Some(id) = node.id()
                && !self.ids.claim(id)
            {
                return Err(CatalogError::DuplicateId(id));
            }
            if let SourceNode::Group(group) = node {
                self.claim_ids(&group.children)?;
            }
        }
        Ok(())
    }

    pub(crate) fn convert(
        &mut self,
        nodes: Vec<SourceNode>,
    ) -> Result<Vec<CommandNode>, CatalogError> {
        nodes.into_iter().map(|node| self.convert_node(node)).collect()
    }

    fn convert_node(&mut self, node: SourceNode) -> Result<CommandNode, CatalogError> {
        let (kind, cmd) = match node {
            SourceNode::Group(group) => return self.convert_group(group),
            SourceNode::WinPowerShell(cmd) => (ScriptKind::WinPowerShell, cmd),
            SourceNode::PowerShell(cmd) => (ScriptKind::PowerShell, cmd),
            SourceNode::Python(cmd) => (ScriptKind::Python, cmd),
            SourceNode::Shell(cmd) => (ScriptKind::Shell, cmd),
        };
        self.convert_command(kind, cmd)
    }

    fn convert_group(&mut self, group: SourceGroup) -> Result<CommandNode, CatalogError> {
        let id = group.id.unwrap_or_else(|| self.ids.next_id());
        if group.name.trim().is_empty() {
            return Err(CatalogError::Validation(format!(
                "Group with id '{id}' has an empty name"
            )));
        }
        if group.children.is_empty() {
            warn!("Group '{}' has no children", group.name);
        }
        let children = self.convert(group.children)?;
        Ok(CommandNode::Group(CommandGroup {
            id,
            name: group.name,
            label: group.label,
            description: group.description,
            children,
        }))
    }

    fn convert_command(
        &mut self,
        kind: ScriptKind,
        cmd: SourceCommand,
    ) -> Result<CommandNode, CatalogError> {
        let id = cmd.id.unwrap_or_else(|| self.ids.next_id());
        if cmd.name.trim().is_empty() {
            return Err(CatalogError::Validation(format!(
                "Command with id '{id}' has an empty name"
            )));
        }
        if cmd.path.trim().is_empty() {
            return Err(CatalogError::Validation(format!(
                "Command '{}' has an empty path",
                cmd.name
            )));
        }
        for (index, param) in cmd.parameters.iter().enumerate() {
            if cmd.parameters[..index]
                .iter()
                .any(|earlier| earlier.name() == param.name())
            {
                return Err(CatalogError::DuplicateParameter {
                    command: cmd.name.clone(),
                    name: param.name().to_string(),
                });
            }
        }

        let interpreter = match cmd.interpreter {
            Some(ref value) => Some(resolve_interpreter(self.base_dir, value)),
            None if kind == ScriptKind::Python => self.default_python.clone(),
            None => None,
        };

        Ok(CommandNode::Command(Arc::new(Command {
            id,
            path: resolve_path(self.base_dir, &cmd.path),
            name: cmd.name,
            label: cmd.label,
            description: cmd.description,
            kind,
            interpreter,
            new_console: cmd.newconsole,
            parameters: cmd.parameters,
        })))
    }
}

impl From<&CommandNode> for SourceNode {
    fn from(node: &CommandNode) -> Self {
        match node {
            CommandNode::Group(group) => SourceNode::Group(SourceGroup {
                id: Some(group.id),
                name: group.name.clone(),
                label: group.label.clone(),
                description: group.description.clone(),
                children: group.children.iter().map(SourceNode::from).collect(),
            }),
            CommandNode::Command(cmd) => SourceNode::command(
                cmd.kind,
                SourceCommand {
                    id: Some(cmd.id),
                    name: cmd.name.clone(),
                    label: cmd.label.clone(),
                    description: cmd.description.clone(),
                    path: cmd.path.display().to_string(),
                    interpreter: cmd.interpreter.clone(),
                    newconsole: cmd.new_console,
                    parameters: cmd.parameters.clone(),
                },
            ),
        }
    }
}
