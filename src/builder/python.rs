use crate::builder::ScriptBuilder;
use crate::commands::command::ScriptKind;

#[derive(Debug, Clone)]
pub struct PythonBuilder {
    program: String,
}

impl PythonBuilder {
    #[must_use]
    pub fn new(program: Option<String>) -> Self {
        Self {
            program: program.unwrap_or_else(|| "python".to_string()),
        }
    }
}

impl ScriptBuilder for PythonBuilder {
    fn kind(&self) -> ScriptKind {
        ScriptKind::Python
    }

    fn default_program(&self) -> &str {
        &self.program
    }
}
