mod config;

use std::process::ExitCode;
use std::sync::Arc;

use scripting::{ContinuePolicy, ErrorPolicy, FatalPolicy, ScriptHost};

use crate::config::{parse_cli_args, PolicyKind, RunnerConfig};

fn build_policy(config: &RunnerConfig) -> Arc<dyn ErrorPolicy> {
    let policy = match config.errors.policy {
        PolicyKind::Continue => ContinuePolicy::shared(),
        PolicyKind::Exit => FatalPolicy::shared(),
    };
    if !config.errors.enabled {
        policy.disable();
    }
    policy
}

fn main() -> ExitCode {
    let (config, cli) = parse_cli_args();
    observability::init_logging_with(&config.logging.filter);

    tracing::info!(
        scripts_dir = %config.scripting.scripts_dir,
        policy = ?config.errors.policy,
        "script runner starting"
    );

    let policy = build_policy(&config);
    let mut host = match ScriptHost::new(config.to_script_config(), policy) {
        Ok(host) => host,
        Err(e) => {
            tracing::error!("Failed to create script host: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Per-file failures were already reported; keep going with what loaded
    if let Err(e) = host.run_directory(&config.scripting.scripts_dir) {
        tracing::warn!("script directory loaded with errors: {}", e);
    }

    if let Err(e) = host.on_create(false) {
        tracing::error!("OnCreate failed: {}", e);
    }

    let mut status = ExitCode::SUCCESS;
    if let Some(function) = &cli.call {
        match host.invoke_with_result(function, ()) {
            Ok(value) if value.is_nil() => tracing::info!(function = %function, "call finished"),
            Ok(value) => println!("{}", describe(&value)),
            Err(e) => {
                tracing::error!(function = %function, "call failed: {}", e);
                status = ExitCode::FAILURE;
            }
        }
    }

    host.destroy();
    tracing::info!("script runner stopped");
    status
}

fn describe(value: &scripting::ScriptValue) -> String {
    match value {
        scripting::ScriptValue::String(s) => s.clone(),
        scripting::ScriptValue::Number(n) => n.to_string(),
        scripting::ScriptValue::Boolean(b) => b.to_string(),
        other => format!("<{}>", other.type_name()),
    }
}
