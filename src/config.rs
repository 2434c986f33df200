use clap::Args;

use crate::store::ConfiguredIdentity;

pub const DEFAULT_LLM_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_LLM_MODEL: &str = "claude-3-5-haiku-20241022";

/// Connection and service settings shared by every subcommand. Each flag can
/// also come from the environment.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    #[arg(long, env = "LLM_API_URL", default_value = DEFAULT_LLM_URL)]
    pub llm_api_url: String,

    #[arg(long, env = "LLM_MODEL", default_value = DEFAULT_LLM_MODEL)]
    pub llm_model: String,

    #[arg(long, env = "LLM_TIMEOUT_SECS", default_value_t = 60)]
    pub llm_timeout_secs: u64,

    /// Email of the signed-in user; unset means anonymous
    #[arg(long, env = "DASHBOARD_USER_EMAIL")]
    pub user_email: Option<String>,

    #[arg(long, env = "DASHBOARD_USER_NAME")]
    pub user_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_LLM_URL.to_string(),
            api_key: None,
            model: DEFAULT_LLM_MODEL.to_string(),
            max_tokens: 1024,
            temperature: 0.2,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub llm: LlmConfig,
    pub identity: ConfiguredIdentity,
}

impl From<ConfigArgs> for AppConfig {
    fn from(args: ConfigArgs) -> Self {
        AppConfig {
            database_url: args.database_url,
            max_connections: args.max_connections.max(1),
            llm: LlmConfig {
                api_url: args.llm_api_url,
                api_key: args.llm_api_key,
                model: args.llm_model,
                timeout_secs: args.llm_timeout_secs.max(1),
                ..LlmConfig::default()
            },
            identity: ConfiguredIdentity::new(args.user_email, args.user_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        config: ConfigArgs,
    }

    #[test]
    fn flags_fill_config() {
        let harness = Harness::parse_from([
            "test",
            "--database-url",
            "postgres://localhost/dashboard",
            "--max-connections",
            "0",
            "--llm-model",
            "custom-model",
        ]);
        let config = AppConfig::from(harness.config);
        assert_eq!(config.database_url, "postgres://localhost/dashboard");
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.llm.model, "custom-model");
        assert_eq!(config.llm.max_tokens, 1024);
    }
}
