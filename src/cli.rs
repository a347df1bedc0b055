//! Command-line interface for rigchat
//!
//! Provides argument parsing and subcommand handling for the rigchat binary.

use clap::{Parser, Subcommand};

/// Classification-aware chat client for local and cloud LLMs
#[derive(Parser)]
#[command(name = "rigchat")]
#[command(version)]
#[command(about = "Classification-aware chat client for local and cloud LLMs")]
#[command(
    long_about = "rigchat routes each query to a local Ollama model or an OpenRouter cloud \
    model based on complexity, cost and data classification, and streams the answer \
    to the terminal. Classified data never leaves the machine."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Show the routing decision for a query without sending it
    Route {
        /// Query text
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Classification level (UNCLASSIFIED, CUI, CONFIDENTIAL, SECRET, TOP SECRET)
        #[arg(long)]
        classification: Option<String>,

        /// Routing mode: local, cloud or auto
        #[arg(short, long)]
        mode: Option<String>,

        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask one question and stream the answer
    Ask {
        /// Query text
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Classification level (UNCLASSIFIED, CUI, CONFIDENTIAL, SECRET, TOP SECRET)
        #[arg(long)]
        classification: Option<String>,

        /// Routing mode: local, cloud or auto
        #[arg(short, long)]
        mode: Option<String>,

        /// Override the local model
        #[arg(long)]
        model: Option<String>,

        /// Skip the response cache
        #[arg(long)]
        no_cache: bool,

        /// Print session statistics after the answer
        #[arg(long)]
        stats: bool,

        /// Print Prometheus metrics after the answer
        #[arg(long)]
        metrics: bool,
    },

    /// Interactive chat reading one query per line from stdin (the default)
    Chat {
        /// Classification level (UNCLASSIFIED, CUI, CONFIDENTIAL, SECRET, TOP SECRET)
        #[arg(long)]
        classification: Option<String>,

        /// Routing mode: local, cloud or auto
        #[arg(short, long)]
        mode: Option<String>,

        /// Override the local model
        #[arg(long)]
        model: Option<String>,

        /// Skip the response cache
        #[arg(long)]
        no_cache: bool,

        /// Print Prometheus metrics on exit
        #[arg(long)]
        metrics: bool,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# rigchat Configuration
# =====================
#
# Every section is optional. Without a config file rigchat talks to Ollama on
# localhost and never uses the cloud.
#
# RIGRUN_CLASSIFICATION, RIGRUN_PARANOID, RIGRUN_OFFLINE (or RIGRUN_NO_NETWORK),
# RIGRUN_MODE, RIGRUN_MAX_TIER, RIGRUN_OLLAMA_URL, RIGRUN_MODEL and
# RIGRUN_OPENROUTER_KEY override the matching keys below.

# ─────────────────────────────────────────────────────────────────────────────
# ROUTING
# ─────────────────────────────────────────────────────────────────────────────

[routing]
# "local"  - every query goes to the local model
# "cloud"  - every query goes to OpenRouter (needs cloud.openrouter_key)
# "auto"   - complexity/cost based choice ("hybrid" is accepted as an alias)
mode = "auto"

# Most expensive tier the router may choose:
# "local", "auto", "cloud", "haiku", "sonnet", "opus", "gpt-4o"
max_tier = "opus"

# Block all cloud traffic regardless of classification
paranoid = false

# No network at all beyond a localhost Ollama (implies paranoid).
# local.url must then point at localhost, 127.0.0.1 or ::1.
offline = false

# Auto mode: keep trivial and simple queries local
auto_prefer_local = false

# Auto mode: stay local when a typical query would cost more than this (cents).
# 0 disables the ceiling.
auto_max_cost_cents = 0.0

# Auto mode without a cloud key: "local" falls back silently,
# "error" falls back and shows a notice
auto_fallback = "local"

# ─────────────────────────────────────────────────────────────────────────────
# SECURITY
# ─────────────────────────────────────────────────────────────────────────────

[security]
# Data classification for this session. Anything above UNCLASSIFIED is
# always answered locally and every blocked cloud route is audited.
# Options: "UNCLASSIFIED", "CUI", "CONFIDENTIAL", "SECRET", "TOP SECRET"
classification = "UNCLASSIFIED"

# ─────────────────────────────────────────────────────────────────────────────
# STREAMING
# ─────────────────────────────────────────────────────────────────────────────

[streaming]
# Tokens buffered before a redraw (1-1000)
batch_size = 15

# Maximum redraws per second (1-60)
max_fps = 30

# ─────────────────────────────────────────────────────────────────────────────
# BACKENDS
# ─────────────────────────────────────────────────────────────────────────────

[local]
url = "http://localhost:11434"
model = "llama3.2"
timeout_seconds = 120

[cloud]
# Falls back to the OPENROUTER_API_KEY environment variable when unset
# openrouter_key = "sk-or-..."
base_url = "https://openrouter.ai/api/v1"
timeout_seconds = 60

# ─────────────────────────────────────────────────────────────────────────────
# CACHE
# ─────────────────────────────────────────────────────────────────────────────

[cache]
enabled = true
ttl_seconds = 86400
capacity = 1000
# Token overlap needed for a semantic hit (0-1]. Overlap ignores word order
# and cannot see negation: lower values may match questions that differ by a
# single word such as "not".
similarity_threshold = 0.85

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
# RUST_LOG overrides this.
log_level = "info"
"#
}
