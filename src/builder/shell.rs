use crate::builder::ScriptBuilder;
use crate::commands::command::ScriptKind;

/// POSIX shell scripts, run as `sh <script> <args>`
#[derive(Debug, Clone)]
pub struct ShellBuilder {
    program: String,
}

impl ShellBuilder {
    #[must_use]
    pub fn new(program: Option<String>) -> Self {
        Self {
            program: program.unwrap_or_else(|| "sh".to_string()),
        }
    }
}

impl ScriptBuilder for ShellBuilder {
    fn kind(&self) -> ScriptKind {
        ScriptKind::Shell
    }

    fn default_program(&self) -> &str {
        &self.program
    }
}
