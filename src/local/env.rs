use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Named arguments handed to a single job.
pub type Parameters = serde_json::Map<String, Value>;

/// Capabilities every job of a runner starts with.
///
/// Built once when the runner is created and shared read-only with every job,
/// so jobs never have to load the same modules themselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEnvironment {
    modules: Vec<String>,
    variables: Parameters,
}

impl ExecutionEnvironment {
    pub fn new<I, S>(modules: I, variables: Parameters) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut loaded: Vec<String> = Vec::new();
        for module in modules {
            let module = module.into();
            if !loaded.iter().any(|m| m.eq_ignore_ascii_case(&module)) {
                loaded.push(module);
            }
        }
        Self {
            modules: loaded,
            variables,
        }
    }

    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    /// Module names compare case-insensitively.
    pub fn has_module(&self, name: &str) -> bool {
        self.modules.iter().any(|m| m.eq_ignore_ascii_case(name))
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }
}
