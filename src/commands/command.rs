use std::fmt;
use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::commands::ids::NodeId;
use crate::commands::parameter::Parameter;

/// The interpreter family a command's script is written for
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    /// Windows PowerShell 5 (`powershell.exe`)
    WinPowerShell,
    /// PowerShell 7+ (`pwsh`)
    PowerShell,
    Python,
    /// POSIX shell script
    Shell,
}

impl ScriptKind {
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            ScriptKind::WinPowerShell => "winpowershell",
            ScriptKind::PowerShell => "powershell",
            ScriptKind::Python => "python",
            ScriptKind::Shell => "shell",
        }
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A single invokable script and the parameters it accepts
#[derive(Debug, Clone)]
pub struct Command {
    pub id: NodeId,
    pub name: String,
    pub label: String,
    pub description: String,
    pub kind: ScriptKind,
    /// Absolute path of the script, resolved at load time
    pub path: PathBuf,
    pub interpreter: Option<String>,
    /// Run in a console window of its own (Windows only)
    pub new_console: bool,
    pub parameters: Vec<Parameter>,
}

impl Command {
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name() == name)
    }
}
