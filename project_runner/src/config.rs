use std::path::Path;

use serde::Deserialize;

use scripting::ScriptConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Log failures and keep going.
    Continue,
    /// Log the first failure and exit the process.
    Exit,
}

impl Default for PolicyKind {
    fn default() -> Self {
        Self::Continue
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScriptSection {
    pub scripts_dir: String,
    pub memory_limit_kb: usize,
    pub sandbox: bool,
    pub extensions: Vec<String>,
}

impl Default for ScriptSection {
    fn default() -> Self {
        Self {
            scripts_dir: "scripts".to_string(),
            memory_limit_kb: 16384, // 16 MB
            sandbox: true,
            extensions: vec!["lua".to_string(), "luau".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ErrorSection {
    pub policy: PolicyKind,
    pub enabled: bool,
}

impl Default for ErrorSection {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Top-level runner configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub scripting: ScriptSection,
    pub errors: ErrorSection,
    pub logging: LoggingSection,
}

impl RunnerConfig {
    /// Load configuration from an optional TOML file path.
    /// Falls back to defaults if path is None or file doesn't exist.
    pub fn load(config_path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        let config = match config_path {
            Some(path) if Path::new(path).exists() => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            _ => Self::default(),
        };
        Ok(config)
    }

    /// Convert scripting section to scripting crate's ScriptConfig.
    pub fn to_script_config(&self) -> ScriptConfig {
        ScriptConfig {
            memory_limit: self.scripting.memory_limit_kb * 1024,
            sandbox: self.scripting.sandbox,
            extensions: self.scripting.extensions.clone(),
        }
    }
}

/// Command-line options layered over the config file.
#[derive(Debug, Default)]
pub struct CliArgs {
    pub config_path: Option<String>,
    pub scripts_dir: Option<String>,
    pub call: Option<String>,
}

/// Parse `--config <path>`, `--scripts <dir>` and `--call <function>`.
pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<CliArgs, String> {
    let mut cli = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let slot = match arg.as_str() {
            "--config" => &mut cli.config_path,
            "--scripts" => &mut cli.scripts_dir,
            "--call" => &mut cli.call,
            other => return Err(format!("Unknown argument: {}", other)),
        };
        match args.next() {
            Some(val) => *slot = Some(val),
            None => return Err(format!("{} requires a value argument", arg)),
        }
    }

    Ok(cli)
}

/// Parse process arguments and merge them with the config file.
/// Exits with a message on bad input.
pub fn parse_cli_args() -> (RunnerConfig, CliArgs) {
    let cli = match parse_args(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let mut config = match RunnerConfig::load(cli.config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    // CLI --scripts overrides config file
    if let Some(dir) = &cli.scripts_dir {
        config.scripting.scripts_dir = dir.clone();
    }

    (config, cli)
}
