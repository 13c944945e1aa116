use crate::chat::Tool;
use async_trait::async_trait;
use serde_json::Value;

/// Adapter interface for host-side tool implementations (e.g. MCP-backed tools).
#[async_trait]
pub trait CallFunctionTool: Send + Sync {
    fn descriptor(&self) -> Tool;
    async fn call(&self, args: Value) -> anyhow::Result<String>;

    /// Server name for server-aware tools (e.g. MCP tools). `None` for tools
    /// with no server affiliation.
    fn server_name(&self) -> Option<&str> {
        None
    }
}
