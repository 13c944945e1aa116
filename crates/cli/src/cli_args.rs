use clap::{Parser, ValueEnum};

/// Which adapter surface drives this process. The core (Monitor, Session
/// Manager, MCP Client Manager) is identical across all four; only how
/// prompts arrive and how updates are rendered differs.
#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "lowercase")]
pub enum ChatMode {
    /// Interactive REPL over stdin/stdout.
    Terminal,
    /// Message-bus adapter (see `threadline_agent::bus`). Wiring a real
    /// transport is out of scope here; this mode reads newline-delimited
    /// bus JSON from stdin and writes responses to stdout.
    Bot,
    /// Browser push-connection adapter. Out of scope for this binary —
    /// the hub itself is a thin adapter process that links against the
    /// same `threadline-agent` core; this mode only validates the flag.
    Web,
    /// Send a single prompt and print the response, then exit.
    Once,
}

#[derive(Parser, Debug)]
#[command(name = "threadline", about = "Multi-adapter runner for the conversation orchestration engine")]
pub struct CliArgs {
    /// Which adapter surface to run.
    #[arg(long = "chat", value_enum, default_value = "terminal")]
    pub chat_mode: ChatMode,

    /// Path to a TOML config file (see `threadline_agent::config`). Falls
    /// back to a minimal built-in agent with no MCP endpoints if omitted.
    #[arg(long)]
    pub config: Option<std::path::PathBuf>,

    /// The conversation's chat id; distinct ids never share a session.
    #[arg(long, default_value_t = 1)]
    pub chat_id: i64,

    /// The conversation's thread id within `chat_id`.
    #[arg(long, default_value_t = 0)]
    pub thread_id: i64,

    /// Prompt text for `--chat once`; read from stdin if omitted.
    #[arg(long)]
    pub prompt: Option<String>,
}
