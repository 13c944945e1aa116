//! MCP Client Manager: owns the MCP transport clients for one agent
//! session and presents a unified, non-leaky surface to the agent runner.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rmcp::model::{Implementation, PaginatedRequestParam};
use rmcp::service::{DynService, RunningService};
use rmcp::RoleClient;
use threadline_core::chat::ChatProvider;
use threadline_core::mcp::{McpServerConfig, McpServerTransportConfig, McpToolAdapter};
use threadline_core::tool_decorator::CallFunctionTool;

use crate::error::AgentError;
use crate::sampling::{SamplingClientHandler, SamplingHandler};
use crate::types::{ToolCatalog, ToolDescriptor};

const DIAL_ATTEMPTS: u32 = 3;
const DIAL_BASE_DELAY: Duration = Duration::from_secs(2);

type McpClient = RunningService<RoleClient, Box<dyn DynService<RoleClient>>>;

/// One agent session's view over its configured MCP tool servers.
pub struct McpClientManager {
    clients: HashMap<String, McpClient>,
    catalog: ToolCatalog,
    tools: HashMap<String, Arc<dyn CallFunctionTool>>,
    system_prompt: String,
}

impl McpClientManager {
    /// Dials every endpoint concurrently, merges tool catalogs under
    /// server-qualified names, and concatenates resolved prompts into the
    /// session's system prompt. Every dialed client installs a
    /// `SamplingClientHandler` backed by `provider`, so an MCP server that
    /// invokes sampling (`CreateMessage`) is routed back through this
    /// session's own chat client.
    pub async fn connect(
        name: &str,
        user_id: &str,
        endpoints: &[McpServerConfig],
        provider: Arc<dyn ChatProvider>,
    ) -> Result<Self, AgentError> {
        let client_info = Implementation {
            name: name.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            ..Default::default()
        };
        let _ = user_id;
        let sampling = Arc::new(SamplingHandler::new(provider));

        let dials = endpoints.iter().map(|endpoint| {
            let handler = SamplingClientHandler::new(sampling.clone(), client_info.clone());
            async move {
                let client = dial_with_retry(&endpoint.name, &endpoint.transport, &handler).await?;
                Ok::<_, AgentError>((endpoint.name.clone(), client))
            }
        });
        let dialed: Vec<_> = futures::future::join_all(dials).await;

        let mut clients = HashMap::new();
        for result in dialed {
            let (server_name, client) = result?;
            clients.insert(server_name, client);
        }

        let mut catalog = ToolCatalog::new();
        let mut tools: HashMap<String, Arc<dyn CallFunctionTool>> = HashMap::new();
        let mut prompt_sections = Vec::new();

        for (server_name, client) in &clients {
            let listed = client
                .peer()
                .list_tools(Some(PaginatedRequestParam::default()))
                .await
                .map_err(|e| AgentError::McpDialFailed {
                    server: server_name.clone(),
                    attempts: 1,
                    message: format!("ListTools failed: {e}"),
                })?;

            for mcp_tool in listed.tools {
                let adapter = McpToolAdapter::try_new(mcp_tool, client.peer().clone())
                    .map_err(|e| AgentError::Other(e.into()))?;
                let qualified = format!("{}:{}", server_name, adapter.descriptor().function.name);
                catalog
                    .insert(ToolDescriptor {
                        server: server_name.clone(),
                        tool: adapter.descriptor(),
                    })
                    .map_err(AgentError::DuplicateToolName)?;
                tools.insert(qualified, Arc::new(adapter));
            }

            if let Ok(prompts) = client
                .peer()
                .list_prompts(Some(PaginatedRequestParam::default()))
                .await
            {
                for prompt in prompts.prompts {
                    if let Ok(resolved) = client
                        .peer()
                        .get_prompt(rmcp::model::GetPromptRequestParam {
                            name: prompt.name.clone(),
                            arguments: None,
                        })
                        .await
                    {
                        for message in resolved.messages {
                            if let Some(text) = message.content.as_text() {
                                prompt_sections.push(text.text.clone());
                            }
                        }
                    }
                }
            }
        }

        let system_prompt = if prompt_sections.is_empty() {
            String::new()
        } else {
            format!("User Context\n{}", prompt_sections.join("\n\n"))
        };

        Ok(Self {
            clients,
            catalog,
            tools,
            system_prompt,
        })
    }

    /// Stable for the life of the session.
    pub fn tool_catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Immutable for the life of the session.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tool(&self, qualified_name: &str) -> Option<Arc<dyn CallFunctionTool>> {
        self.tools.get(qualified_name).cloned()
    }

    pub fn server_names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(|s| s.as_str())
    }

    /// Reads a resource URI from whichever connected server still answers
    /// it. Tries every client in turn since the manager doesn't track
    /// which server owns which URI outside the tool catalog; returns
    /// `None` (rather than an error) if no server recognizes it anymore,
    /// which the resource monitor treats as the resource having gone away.
    pub async fn read_resource(&self, uri: &str) -> Option<rmcp::model::ReadResourceResult> {
        for client in self.clients.values() {
            let result = client
                .peer()
                .read_resource(rmcp::model::ReadResourceRequestParam {
                    uri: uri.to_string(),
                })
                .await;
            if let Ok(result) = result {
                return Some(result);
            }
        }
        None
    }

    /// Releases every transport client. Called on every exit path of the
    /// owning session (success or failure).
    pub async fn close(self) {
        for (name, client) in self.clients {
            if let Err(e) = client.cancel().await {
                log::warn!("error closing MCP client `{name}`: {e}");
            }
        }
    }
}

async fn dial_with_retry(
    server_name: &str,
    transport: &McpServerTransportConfig,
    handler: &SamplingClientHandler,
) -> Result<McpClient, AgentError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match transport.start(handler.clone()).await {
            Ok(client) => return Ok(client),
            Err(e) if attempt < DIAL_ATTEMPTS => {
                let delay = DIAL_BASE_DELAY * 2u32.pow(attempt - 1);
                log::warn!(
                    "dial attempt {attempt}/{DIAL_ATTEMPTS} to MCP server `{server_name}` failed: {e}; retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(AgentError::McpDialFailed {
                    server: server_name.to_string(),
                    attempts: attempt,
                    message: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_is_empty_with_no_prompts() {
        let manager = McpClientManager {
            clients: HashMap::new(),
            catalog: ToolCatalog::new(),
            tools: HashMap::new(),
            system_prompt: String::new(),
        };
        assert_eq!(manager.system_prompt(), "");
        assert_eq!(manager.tool_catalog().len(), 0);
    }
}
