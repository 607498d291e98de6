use super::{RegistryError, Tool, ToolError};
use crate::model::ToolSpec;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A registered tool with its compiled input schema.
#[derive(Clone)]
pub struct RegisteredTool {
    tool: Arc<dyn Tool>,
    validator: Arc<jsonschema::Validator>,
}

impl RegisteredTool {
    pub fn tool(&self) -> &Arc<dyn Tool> {
        &self.tool
    }

    pub fn name(&self) -> &str {
        &self.tool.spec().name
    }

    /// Check arguments against the tool's schema, listing every violation.
    pub fn validate(&self, input: &Value) -> Result<(), ToolError> {
        if self.validator.is_valid(input) {
            return Ok(());
        }
        let errors: Vec<String> = self
            .validator
            .iter_errors(input)
            .map(|e| e.to_string())
            .collect();
        Err(ToolError::Schema(errors.join("; ")))
    }
}

/// Named tools offered to one agent.
///
/// Filled at start-up through `&mut self`, then moved into an
/// [`Agent`](crate::Agent) and only read from.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, compiling its schema up front.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let spec = tool.spec();
        let name = spec.name.clone();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }
        if !spec.schema.is_object() {
            return Err(RegistryError::InvalidSchema {
                name,
                reason: "schema must be a JSON object".into(),
            });
        }
        let validator = jsonschema::Validator::new(&spec.schema).map_err(|e| {
            RegistryError::InvalidSchema {
                name: name.clone(),
                reason: e.to_string(),
            }
        })?;

        self.order.push(name.clone());
        self.tools.insert(
            name,
            RegisteredTool {
                tool,
                validator: Arc::new(validator),
            },
        );
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Result<Self, RegistryError> {
        self.register(tool)?;
        Ok(self)
    }

    pub fn lookup(&self, name: &str) -> Result<&RegisteredTool, RegistryError> {
        self.tools
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Declarations offered to the model, in registration order.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|registered| registered.tool.spec().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .finish()
    }
}
