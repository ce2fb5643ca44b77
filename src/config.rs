use std::env;

pub struct AppConfig {
    pub http_bind: String,
    pub shutdown_command: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            http_bind: env_var("HTTP_BIND", "0.0.0.0:8000"),
            shutdown_command: env_var("SHUTDOWN_COMMAND", "systemctl poweroff")
                .split_whitespace()
                .map(str::to_string)
                .collect(),
        }
    }
}

fn env_var(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
