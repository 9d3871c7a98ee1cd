use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub connection_string: String,
    pub pool_size: usize,
    /// Create the pharmacy tables on startup when they are missing.
    pub bootstrap_schema: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub backend: String, // "remote" or "ollama"
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExecutorConfig {
    pub timeout_ms: u64,
    pub max_rows: usize,
    /// Row cap applied to queries issued by the analyze endpoint.
    pub analysis_max_rows: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FeedbackConfig {
    pub log_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub llm: LlmConfig,
    pub executor: ExecutorConfig,
    pub feedback: FeedbackConfig,
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// DuckDB database file (or ":memory:")
    #[arg(long)]
    pub database: Option<String>,

    /// Directory for the SQL feedback log
    #[arg(long)]
    pub feedback_dir: Option<String>,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        // Start with the built-in defaults
        let mut config_builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        // Add configuration from file if specified
        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            // Check for config in default locations
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/pharma-insight/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // PHARMA_LLM__API_KEY, PHARMA_EXECUTOR__TIMEOUT_MS, ...
        config_builder = config_builder.add_source(
            Environment::with_prefix("PHARMA")
                .prefix_separator("_")
                .separator("__"),
        );

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        // Override with command line args if provided
        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(database) = &args.database {
            config.database.connection_string = database.clone();
        }
        if let Some(feedback_dir) = &args.feedback_dir {
            config.feedback.log_dir = feedback_dir.clone();
        }

        if config.llm.api_key.is_none() {
            config.llm.api_key = std::env::var("OPENAI_API_KEY").ok().filter(|key| !key.is_empty());
        }

        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                connection_string: "pharma-insight.duckdb".to_string(),
                pool_size: 5,
                bootstrap_schema: false,
            },
            web: WebConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            llm: LlmConfig {
                backend: "remote".to_string(),
                model: "gpt-3.5-turbo".to_string(),
                api_key: None,
                api_url: None,
                temperature: 0.7,
                max_tokens: 2000,
                timeout_secs: 60,
            },
            executor: ExecutorConfig {
                timeout_ms: 5000,
                max_rows: 1000,
                analysis_max_rows: 100,
            },
            feedback: FeedbackConfig {
                log_dir: "logs".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_win_over_defaults() {
        let args = CliArgs {
            config: Some(PathBuf::from("does-not-exist.toml")),
            ..CliArgs::default()
        };
        // An explicit config file that is missing is an error, not a silent default.
        assert!(AppConfig::new(&args).is_err());

        let args = CliArgs {
            host: Some("0.0.0.0".to_string()),
            port: Some(8088),
            database: Some(":memory:".to_string()),
            ..CliArgs::default()
        };
        let config = AppConfig::new(&args).expect("defaults should deserialize");
        assert_eq!(config.web.host, "0.0.0.0");
        assert_eq!(config.web.port, 8088);
        assert_eq!(config.database.connection_string, ":memory:");
        assert_eq!(config.executor.timeout_ms, 5000);
        assert_eq!(config.executor.analysis_max_rows, 100);
    }
}
