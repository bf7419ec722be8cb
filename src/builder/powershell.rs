use crate::builder::ScriptBuilder;
use crate::commands::command::ScriptKind;

const POWERSHELL_FLAGS: [&str; 5] = [
    "-NoLogo",
    "-NonInteractive",
    "-ExecutionPolicy",
    "RemoteSigned",
    "-File",
];

/// Windows PowerShell (`powershell`) and PowerShell 7 (`pwsh`) scripts
#[derive(Debug, Clone)]
pub struct PowerShellBuilder {
    kind: ScriptKind,
    program: String,
}

impl PowerShellBuilder {
    /// Windows PowerShell always runs the system `powershell`; commands
    /// cannot pick another interpreter.
    #[must_use]
    pub fn windows(program: Option<String>) -> Self {
        Self {
            kind: ScriptKind::WinPowerShell,
            program: program.unwrap_or_else(|| "powershell".to_string()),
        }
    }

    #[must_use]
    pub fn core(program: Option<String>) -> Self {
        Self {
            kind: ScriptKind::PowerShell,
            program: program.unwrap_or_else(|| "pwsh".to_string()),
        }
    }
}

impl ScriptBuilder for PowerShellBuilder {
    fn kind(&self) -> ScriptKind {
        self.kind
    }

    fn default_program(&self) -> &str {
        &self.program
    }

    fn flags(&self) -> &[&'static str] {
        &POWERSHELL_FLAGS
    }

    fn supports_interpreter_override(&self) -> bool {
        self.kind == ScriptKind::PowerShell
    }
}
