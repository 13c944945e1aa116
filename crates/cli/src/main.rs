mod adapters;
mod cli_args;
mod commands;
mod provider;

use std::collections::HashSet;
use std::sync::Arc;

use clap::Parser;
use threadline_agent::approval::ApprovalRegistry;
use threadline_agent::config::{load_config, AgentConfig, Config, ConfigSource};
use threadline_agent::history::ChatHistoryStore;
use threadline_agent::mcp_manager::McpClientManager;
use threadline_agent::monitor::AgentFactory;
use threadline_agent::resource_monitor::{
    LoggingResourceNotifier, McpResourceStateSource, ResourceSubscriptionMonitor,
};
use threadline_agent::runner::{AgentRunner, LocalLmRunner, McpAgentRunner};
use threadline_agent::session::SessionRegistry;
use threadline_agent::{AgentError, ConversationKey, ConversationMonitor};
use threadline_core::chat::ChatProvider;
use threadline_core::session::InMemorySessionStore;
use tokio_util::sync::CancellationToken;

use cli_args::{ChatMode, CliArgs};
use provider::EchoChatProvider;

/// Builds the one runner this CLI process serves, lazily on first use per
/// conversation key. With no MCP servers configured this is a bare
/// `LocalLmRunner`; otherwise it dials every configured server, routes
/// inbound MCP sampling back through the same provider, and starts a
/// resource subscription monitor alongside the resulting `McpAgentRunner`.
struct SingleAgentFactory {
    provider: Arc<dyn ChatProvider>,
    agent: AgentConfig,
    approvals: Arc<ApprovalRegistry>,
}

#[async_trait::async_trait]
impl AgentFactory for SingleAgentFactory {
    async fn build(&self, key: &ConversationKey) -> Result<Arc<dyn AgentRunner>, AgentError> {
        if self.agent.mcp.is_empty() {
            return Ok(Arc::new(LocalLmRunner::new(self.provider.clone())));
        }

        let mcp = Arc::new(
            McpClientManager::connect(&self.agent.id, "cli", &self.agent.mcp, self.provider.clone())
                .await?,
        );

        let monitor = ResourceSubscriptionMonitor::new();
        let source = Arc::new(McpResourceStateSource::new(mcp.clone()));
        let notifier = Arc::new(LoggingResourceNotifier);
        tokio::spawn(monitor.run(source, notifier, CancellationToken::new()));

        let approval = self.approvals.gate_for(&key.history_key());
        Ok(Arc::new(McpAgentRunner::new(self.provider.clone(), mcp, approval)))
    }
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging();
    let args = CliArgs::parse();

    let config = match &args.config {
        Some(path) => load_config(ConfigSource::File(path.clone())).await?,
        None => Config {
            agent: AgentConfig {
                id: "local".to_string(),
                provider: "echo".to_string(),
                model: "echo".to_string(),
                api_key: None,
                system: None,
                mcp: Vec::new(),
                approval_whitelist: Vec::new(),
            },
            bus: Default::default(),
            render: Default::default(),
        },
    };

    let approvals = Arc::new(ApprovalRegistry::new(config.agent.approval_whitelist.clone()));
    let sessions = Arc::new(SessionRegistry::new(approvals.clone()));
    let history = Arc::new(ChatHistoryStore::new(Arc::new(InMemorySessionStore::new())));
    let factory = Arc::new(SingleAgentFactory {
        provider: Arc::new(EchoChatProvider),
        agent: config.agent.clone(),
        approvals,
    });
    let monitor = ConversationMonitor::new(sessions.clone(), history.clone(), factory);

    let key = ConversationKey::new(args.chat_id, args.thread_id, config.agent.id.clone());

    match args.chat_mode {
        ChatMode::Terminal => adapters::run_terminal(monitor, sessions, history, key).await,
        ChatMode::Once => {
            let prompt = match args.prompt {
                Some(p) => p,
                None => {
                    let mut input = String::new();
                    std::io::stdin().read_line(&mut input)?;
                    input.trim().to_string()
                }
            };
            adapters::run_once(monitor, sessions, key, prompt).await
        }
        ChatMode::Bot => {
            let valid_agent_ids: HashSet<String> = if config.bus.valid_agent_ids.is_empty() {
                [config.agent.id.clone()].into_iter().collect()
            } else {
                config.bus.valid_agent_ids.clone()
            };
            adapters::run_bot(monitor, sessions, valid_agent_ids, args.chat_id).await
        }
        ChatMode::Web => adapters::run_web().await,
    }
}
