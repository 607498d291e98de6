use crate::model::Backend;
use crate::tools::ToolRegistry;
use std::sync::Arc;

/// A reasoning unit: a system prompt, a model, and the tools it may call.
///
/// Immutable once built. Nested agents are offered to a parent through
/// [`SubAgentInvoker`](crate::SubAgentInvoker).
pub struct Agent<B> {
    name: String,
    description: String,
    system_prompt: Option<String>,
    model: Arc<B>,
    tools: ToolRegistry,
}

impl<B: Backend> Agent<B> {
    pub fn builder(name: impl Into<String>, model: Arc<B>) -> AgentBuilder<B> {
        AgentBuilder {
            name: name.into(),
            description: None,
            system_prompt: None,
            model,
            tools: ToolRegistry::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn model(&self) -> &B {
        &self.model
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }
}

impl<B> std::fmt::Debug for Agent<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Agent`].
pub struct AgentBuilder<B> {
    name: String,
    description: Option<String>,
    system_prompt: Option<String>,
    model: Arc<B>,
    tools: ToolRegistry,
}

impl<B: Backend> AgentBuilder<B> {
    /// Shown to a parent agent when this agent is wrapped as a tool.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn build(self) -> Agent<B> {
        let description = self
            .description
            .unwrap_or_else(|| format!("Delegate a task to the {} agent", self.name));
        Agent {
            name: self.name,
            description,
            system_prompt: self.system_prompt,
            model: self.model,
            tools: self.tools,
        }
    }
}
