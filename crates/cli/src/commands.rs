//! Subcommand implementations. Each builds the four collaborators
//! (event store, model client, tool registry, engine config) from
//! [`AppConfig`] and drives `ea-engine`/`ea-projections` directly — this
//! crate owns no behaviour of its own beyond wiring and formatting.

use std::sync::Arc;

use ea_domain::capability::ModelRole;
use ea_domain::config::ExecConfig;
use ea_domain::event::StreamName;
use ea_engine::{process_thread, session};
use ea_projections::{session_state, SessionState, SessionStatus};
use ea_providers::{LlmRouter, ModelClient, RouterModelClient};
use ea_store::{CategoryReadOptions, EventStore};
use ea_tools::{exec_tool, read_file_tool, write_file_tool, ToolRegistry};

use crate::config::AppConfig;

pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => anyhow::bail!("unknown --format '{other}' (expected text|json)"),
        }
    }
}

async fn connect(config: &AppConfig) -> anyhow::Result<EventStore> {
    EventStore::connect(&config.event_store)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))
}

fn build_model_client(config: &AppConfig) -> anyhow::Result<Arc<dyn ModelClient>> {
    let router = LlmRouter::from_config(&config.llm).map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(Arc::new(RouterModelClient::new(Arc::new(router), ModelRole::Executor)))
}

fn build_tool_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    let cwd = std::env::current_dir().unwrap_or_else(|_| ".".into());
    // Registration can only fail on a duplicate name or empty description;
    // these are fixed, known-good built-ins, so a panic here would mean a
    // programming error, not a runtime condition to recover from.
    registry.register(exec_tool(ExecConfig::default())).expect("exec tool registers cleanly");
    registry
        .register(read_file_tool(cwd.clone()))
        .expect("read_file tool registers cleanly");
    registry
        .register(write_file_tool(cwd))
        .expect("write_file tool registers cleanly");
    registry
}

/// `ea-agent start <message>`
pub async fn start(config: &AppConfig, message: &str) -> anyhow::Result<()> {
    let store = connect(config).await?;
    let (thread_id, stream_name) =
        session::start_session(&store, &config.category, config.version.as_deref(), message)
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;

    let model = build_model_client(config)?;
    let tools = build_tool_registry();
    let state = process_thread(&store, model.as_ref(), &tools, &config.engine, &stream_name, None)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    println!("thread_id: {thread_id}");
    print_session_state(&state, &OutputFormat::Text);
    Ok(())
}

/// `ea-agent continue <thread_id>` — re-enters the processing loop without
/// adding a new user turn (useful after a crash mid-loop, or to let a
/// previously-failed LLM call's retry budget play out again).
pub async fn continue_thread(config: &AppConfig, thread_id: &str) -> anyhow::Result<()> {
    let store = connect(config).await?;
    let stream_name = StreamName::build(&config.category, config.version.as_deref(), thread_id);

    let model = build_model_client(config)?;
    let tools = build_tool_registry();
    let state = process_thread(&store, model.as_ref(), &tools, &config.engine, &stream_name, None)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    print_session_state(&state, &OutputFormat::Text);
    Ok(())
}

/// `ea-agent message <thread_id> <text>`
pub async fn message(config: &AppConfig, thread_id: &str, text: &str) -> anyhow::Result<()> {
    let store = connect(config).await?;
    let stream_name = StreamName::build(&config.category, config.version.as_deref(), thread_id);

    session::add_user_message(&store, &stream_name, text)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let model = build_model_client(config)?;
    let tools = build_tool_registry();
    let state = process_thread(&store, model.as_ref(), &tools, &config.engine, &stream_name, None)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    print_session_state(&state, &OutputFormat::Text);
    Ok(())
}

/// `ea-agent show <thread_id> [--format text|json] [--full]`
pub async fn show(
    config: &AppConfig,
    thread_id: &str,
    format: OutputFormat,
    full: bool,
) -> anyhow::Result<()> {
    let store = connect(config).await?;
    let stream_name = StreamName::build(&config.category, config.version.as_deref(), thread_id);

    let events = read_all(&store, &stream_name).await?;
    if events.is_empty() {
        anyhow::bail!("no events found for thread '{thread_id}'");
    }
    let state = session_state(&events).map_err(|e| anyhow::anyhow!("{e}"))?;

    match format {
        OutputFormat::Json => {
            let payload = if full {
                serde_json::json!({
                    "session": session_state_json(&state),
                    "events": events.iter().map(|e| serde_json::json!({
                        "type": e.event_type,
                        "position": e.position,
                        "global_position": e.global_position,
                        "time": e.time,
                        "data": e.data,
                        "metadata": e.metadata,
                    })).collect::<Vec<_>>(),
                })
            } else {
                session_state_json(&state)
            };
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        OutputFormat::Text => {
            print_session_state(&state, &OutputFormat::Text);
            if full {
                println!();
                for event in &events {
                    println!("[{}] {} {}", event.position, event.event_type, event.data);
                }
            }
        }
    }
    Ok(())
}

/// `ea-agent list [--limit N] [--format text|json]` — pages through the
/// category reading every stream's events, groups them by stream, and
/// prints the projected session state per thread, most recently active
/// first.
pub async fn list(config: &AppConfig, limit: usize, format: OutputFormat) -> anyhow::Result<()> {
    let store = connect(config).await?;
    let category = StreamName::build(&config.category, config.version.as_deref(), "x");
    // `StreamName::build` needs an entity id; strip it back off to get the
    // bare category prefix the category read matches on.
    let category_prefix = category
        .rsplit_once('-')
        .map(|(prefix, _)| prefix.to_string())
        .unwrap_or(category);

    let mut by_stream: std::collections::HashMap<String, Vec<ea_domain::event::Event>> =
        std::collections::HashMap::new();
    let mut from_global_position = 0i64;
    const BATCH: i64 = 1000;
    loop {
        let batch = store
            .read_category(&category_prefix, from_global_position, BATCH, CategoryReadOptions::default())
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        let got = batch.len();
        for event in batch {
            from_global_position = from_global_position.max(event.global_position + 1);
            by_stream.entry(event.stream_name.clone()).or_default().push(event);
        }
        if (got as i64) < BATCH {
            break;
        }
    }

    let mut states: Vec<SessionState> = by_stream
        .into_values()
        .filter_map(|mut events| {
            events.sort_by_key(|e| e.position);
            session_state(&events).ok()
        })
        .collect();
    states.sort_by(|a, b| b.last_activity_time.cmp(&a.last_activity_time));
    states.truncate(limit);

    match format {
        OutputFormat::Json => {
            let payload: Vec<_> = states.iter().map(session_state_json).collect();
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        OutputFormat::Text => {
            for state in &states {
                println!(
                    "{}\t{:?}\tmessages={}\ttools={}\tllm_calls={}\terrors={}",
                    state.thread_id,
                    state.status,
                    state.message_count,
                    state.tool_call_count,
                    state.llm_call_count,
                    state.error_count
                );
            }
        }
    }
    Ok(())
}

fn session_state_json(state: &SessionState) -> serde_json::Value {
    serde_json::json!({
        "thread_id": state.thread_id,
        "status": format!("{:?}", state.status),
        "message_count": state.message_count,
        "llm_call_count": state.llm_call_count,
        "tool_call_count": state.tool_call_count,
        "error_count": state.error_count,
        "session_start_time": state.session_start_time,
        "session_end_time": state.session_end_time,
        "last_activity_time": state.last_activity_time,
    })
}

fn print_session_state(state: &SessionState, _format: &OutputFormat) {
    let status = match state.status {
        SessionStatus::Active => "active",
        SessionStatus::Completed => "completed",
        SessionStatus::Failed => "failed",
        SessionStatus::Terminated => "terminated",
    };
    println!(
        "status: {status}  messages: {}  llm_calls: {}  tool_calls: {}  errors: {}",
        state.message_count, state.llm_call_count, state.tool_call_count, state.error_count
    );
}

async fn read_all(store: &EventStore, stream_name: &str) -> anyhow::Result<Vec<ea_domain::event::Event>> {
    let mut events = Vec::new();
    let mut from_position = 0i64;
    const BATCH: i64 = 500;
    loop {
        let batch = store
            .read_stream(stream_name, from_position, BATCH)
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        let got = batch.len() as i64;
        events.extend(batch);
        if got < BATCH {
            break;
        }
        from_position += got;
    }
    Ok(events)
}
