use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::generation::client::GeminiSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_generation_timeout_ms")]
    pub generation_timeout_ms: u64,
    #[serde(default = "default_image_timeout_ms")]
    pub image_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_model")]
    pub model_text: String,
    #[serde(default = "default_model")]
    pub model_image: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3001
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_generation_timeout_ms() -> u64 {
    2500
}
fn default_image_timeout_ms() -> u64 {
    15000
}
fn default_request_timeout_ms() -> u64 {
    30000
}
fn default_max_body_bytes() -> usize {
    1024 * 1024
}
fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_api_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: default_bind(),
            port: default_port(),
            log_level: default_log_level(),
            generation_timeout_ms: default_generation_timeout_ms(),
            image_timeout_ms: default_image_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
            model_text: default_model(),
            model_image: default_model(),
            api_base_url: default_api_base_url(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
        Self::from_toml_str(&content, path)
    }

    /// Like `from_file`, but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, String> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(ServerConfig::default())
        }
    }

    pub fn from_toml_str(content: &str, source_path: &Path) -> Result<Self, String> {
        let config: ServerConfig =
            toml::from_str(content).map_err(|e| format!("{}: {}", source_path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        if !(1024..=65535).contains(&self.port) {
            errors.push(format!(
                "port must be 1024-65535, got {}. Example: port = 3001",
                self.port
            ));
        }

        if self.bind.parse::<std::net::IpAddr>().is_err() {
            errors.push(format!(
                "bind must be an IP address, got '{}'. Example: bind = \"127.0.0.1\"",
                self.bind
            ));
        }

        if self.generation_timeout_ms == 0 {
            errors.push(format!(
                "generation_timeout_ms must be > 0, got {}. Example: generation_timeout_ms = 2500",
                self.generation_timeout_ms
            ));
        }

        if self.image_timeout_ms == 0 {
            errors.push(format!(
                "image_timeout_ms must be > 0, got {}. Example: image_timeout_ms = 15000",
                self.image_timeout_ms
            ));
        }

        if self.request_timeout_ms <= self.generation_timeout_ms {
            errors.push(format!(
                "request_timeout_ms must be greater than generation_timeout_ms ({}), got {}. Example: request_timeout_ms = 30000",
                self.generation_timeout_ms, self.request_timeout_ms
            ));
        }

        if self.max_body_bytes == 0 {
            errors.push(format!(
                "max_body_bytes must be > 0, got {}. Example: max_body_bytes = 1048576",
                self.max_body_bytes
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            errors.push(format!(
                "log_level must be one of {:?}, got '{}'. Example: log_level = \"info\"",
                valid_levels, self.log_level
            ));
        }

        for (name, value) in [("model_text", &self.model_text), ("model_image", &self.model_image)] {
            if value.trim().is_empty() {
                errors.push(format!(
                    "{} must not be empty. Example: {} = \"gemini-2.5-flash\"",
                    name, name
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("\n"))
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .map_err(|e| format!("Invalid bind address {}:{}: {}", self.bind, self.port, e))
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_millis(self.image_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Gemini client settings; text requests are bounded by the image timeout
    /// since the generation timeout is enforced separately by the orchestrator.
    pub fn gemini_settings(&self) -> GeminiSettings {
        GeminiSettings {
            api_base_url: self.api_base_url.clone(),
            text_model: self.model_text.clone(),
            image_model: self.model_image.clone(),
            api_key_env: self.api_key_env.clone(),
            request_timeout: self.image_timeout(),
        }
    }
}
