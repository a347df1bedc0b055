//! rigchat binary
//!
//! `config` writes a template, `route` explains a routing decision, `ask`
//! answers one question and `chat` (the default) reads questions from stdin
//! until EOF.

use clap::Parser;
use rigchat::backend::{ModelBackend, OllamaBackend, OpenRouterBackend};
use rigchat::cache::QueryCache;
use rigchat::cli::{Cli, Command, generate_config_template};
use rigchat::config::Config;
use rigchat::conversation::MessageStatus;
use rigchat::metrics::Metrics;
use rigchat::router::{QueryAnalysis, RoutingDecisionEngine};
use rigchat::security::{AuditSink, ClassificationLevel, PolicyEnforcer, TracingAuditSink};
use rigchat::session::{ChatSession, SessionSettings, SessionState, SubmitOutcome};
use rigchat::stream::{STREAM_TICK, StreamEvent, StreamingBuffer};
use rigchat::telemetry;
use std::io::Write;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Options shared by `ask` and `chat`
struct SessionArgs {
    classification: Option<String>,
    mode: Option<String>,
    model: Option<String>,
    no_cache: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let command = match cli.command {
        Some(Command::Config { output }) => {
            let template = generate_config_template();
            match output {
                Some(path) => {
                    std::fs::write(&path, template)?;
                    eprintln!("Wrote configuration template to {}", path);
                }
                None => print!("{}", template),
            }
            return Ok(());
        }
        Some(command) => command,
        None => Command::Chat {
            classification: None,
            mode: None,
            model: None,
            no_cache: false,
            metrics: false,
        },
    };

    let config = Config::load_or_default(&cli.config)?;
    telemetry::init(&config.observability.log_level);

    match command {
        Command::Route {
            query,
            classification,
            mode,
            json,
        } => route(&config, &query.join(" "), classification, mode, json),
        Command::Ask {
            query,
            classification,
            mode,
            model,
            no_cache,
            stats,
            metrics,
        } => {
            let args = SessionArgs {
                classification,
                mode,
                model,
                no_cache,
            };
            ask(&config, args, &query.join(" "), stats, metrics).await
        }
        Command::Chat {
            classification,
            mode,
            model,
            no_cache,
            metrics,
        } => {
            let args = SessionArgs {
                classification,
                mode,
                model,
                no_cache,
            };
            chat(&config, args, metrics).await
        }
        Command::Config { .. } => Ok(()),
    }
}

fn parse_classification(
    config: &Config,
    input: Option<String>,
) -> Result<ClassificationLevel, Box<dyn std::error::Error>> {
    match input {
        Some(level) => Ok(level.parse()?),
        None => Ok(config.security.classification),
    }
}

fn build_engine() -> RoutingDecisionEngine {
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let enforcer = Arc::new(PolicyEnforcer::new(Arc::clone(&audit)));
    RoutingDecisionEngine::new(enforcer, audit)
}

fn route(
    config: &Config,
    query: &str,
    classification: Option<String>,
    mode: Option<String>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let level = parse_classification(config, classification)?;
    let mode = mode.unwrap_or_else(|| config.routing.mode.as_str().to_string());
    let options = config.router_options();

    let decision = build_engine().decide(query, level, &mode, Some(&options));

    if json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else {
        println!("Tier:       {}", decision.tier());
        println!("Complexity: {}", decision.complexity());
        println!(
            "Type:       {} ({} model)",
            decision.query_type(),
            decision.query_type().model_hint()
        );
        println!("Est. cost:  {:.4} cents", decision.estimated_cost_cents());
        println!("Reason:     {}", decision.reason());
        if let Some(notice) = decision.notice() {
            println!("Notice:     {}", notice);
        }

        let analysis = QueryAnalysis::analyze(query);
        println!(
            "Analysis:   ~{} tokens, effort {:?}, code={}, math={}, reasoning={} (suggests {})",
            analysis.token_count,
            analysis.effort,
            analysis.has_code,
            analysis.has_math,
            analysis.requires_reasoning,
            analysis.recommended_tier()
        );
    }
    Ok(())
}

fn build_session(
    config: &Config,
    args: SessionArgs,
    metrics: Arc<Metrics>,
) -> Result<(ChatSession, UnboundedReceiver<StreamEvent>), Box<dyn std::error::Error>> {
    let mut settings = SessionSettings::from_config(config);
    settings.classification = parse_classification(config, args.classification)?;
    if let Some(mode) = args.mode {
        settings.mode = mode;
    }
    if let Some(model) = args.model {
        settings.local_model = model;
    }

    let local: Arc<dyn ModelBackend> =
        Arc::new(OllamaBackend::new(&config.local.url, config.local.timeout())?);
    let buffer = Arc::new(StreamingBuffer::with_config(
        config.streaming.batch_size(),
        config.streaming.max_fps(),
    ));

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let mut session = ChatSession::new(build_engine(), local, settings, events_tx)
        .with_buffer(buffer)
        .with_metrics(metrics);

    match config.cloud.openrouter_key() {
        _ if config.routing.offline => {
            tracing::info!("Offline mode, no cloud backend will be created");
        }
        Some(key) => {
            let cloud =
                OpenRouterBackend::new(&config.cloud.base_url, key, config.cloud.timeout())?;
            session = session.with_cloud(Arc::new(cloud));
        }
        None => tracing::debug!("No OpenRouter key configured, cloud tiers unavailable"),
    }

    if config.cache.enabled && !args.no_cache {
        session = session.with_cache(Arc::new(QueryCache::new(config.cache.settings())));
    }

    Ok((session, events_rx))
}

async fn ask(
    config: &Config,
    args: SessionArgs,
    query: &str,
    show_stats: bool,
    show_metrics: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let metrics = Arc::new(Metrics::new()?);
    let (mut session, mut events) = build_session(config, args, Arc::clone(&metrics))?;

    run_turn(&mut session, &mut events, query).await?;

    report(&session, &metrics, show_stats, show_metrics)
}

async fn chat(
    config: &Config,
    args: SessionArgs,
    show_metrics: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let metrics = Arc::new(Metrics::new()?);
    let (mut session, mut events) = build_session(config, args, Arc::clone(&metrics))?;
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        eprint!("> ");
        std::io::stderr().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            eprintln!();
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        run_turn(&mut session, &mut events, &line).await?;
    }

    report(&session, &metrics, true, show_metrics)
}

/// Submit one query and drive the event loop until its stream ends
async fn run_turn(
    session: &mut ChatSession,
    events: &mut UnboundedReceiver<StreamEvent>,
    query: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();

    if session.submit(query, query) == SubmitOutcome::Ignored {
        return Ok(());
    }
    if let Some(routing) = session.conversation().last().and_then(|m| m.routing.as_ref()) {
        eprintln!("[{}] {}", routing.label, routing.reason);
    }

    let mut printed = 0usize;
    let mut ticker = tokio::time::interval(STREAM_TICK);

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                session.handle_event(event);
            }
            _ = ticker.tick() => {
                if session.tick() {
                    if let Some(message) = session.conversation().last() {
                        if message.content.len() > printed {
                            write!(stdout, "{}", &message.content[printed..])?;
                            stdout.flush()?;
                            printed = message.content.len();
                        }
                    }
                }
                if session.state() == SessionState::Ready {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                session.cancel();
            }
        }
    }

    writeln!(stdout)?;
    if let Some(message) = session.conversation().last() {
        if message.status == MessageStatus::Cancelled {
            eprintln!("[cancelled]");
        }
    }
    let notices: Vec<_> = session.notices().iter().map(|n| (n.id, n.message.clone())).collect();
    for (id, message) in notices {
        eprintln!("! {}", message);
        session.dismiss_notice(id);
    }
    Ok(())
}

fn report(
    session: &ChatSession,
    metrics: &Metrics,
    show_stats: bool,
    show_metrics: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show_stats {
        eprintln!("{}", session.stats().summary());
        let viewport = session.viewport_stats();
        tracing::debug!(
            total = viewport.total,
            skipped = viewport.skipped,
            skip_percent = viewport.skip_percent,
            "Redraw efficiency"
        );
    }
    if show_metrics {
        print!("{}", metrics.gather()?);
    }
    Ok(())
}
