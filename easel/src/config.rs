//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `EASEL_CONFIG`
//! environment variable. A missing file is not an error: every field has a default.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `EASEL_` override YAML values
//! 3. **Conventional credentials** - `OPENAI_API_KEY` sets `completion.api_key` and
//!    `BLOB_READ_WRITE_TOKEN` sets `images.blob.token`
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `EASEL_IMAGES__STAGING=blob` sets the `images.staging` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use easel::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! EASEL_PORT=8080
//!
//! # Completion API credential (either form works)
//! OPENAI_API_KEY=sk-...
//! EASEL_COMPLETION__API_KEY=sk-...
//!
//! # Upload images to blob storage instead of inlining them
//! EASEL_IMAGES__STAGING=blob
//! BLOB_READ_WRITE_TOKEN=vercel_blob_rw_...
//!
//! # Relay the full upstream payload instead of `{"message": ...}`
//! EASEL_RESPONSE__SHAPE=full
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, time::Duration};
use url::Url;

use crate::errors::Error;

/// Persona used when no `completion.system_prompt` is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly and conversational art critic. Only provide art critiques or insights \
     when the user asks directly about art. If the user makes casual conversation or greetings, respond naturally without \
     discussing art unless it's mentioned.";

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "EASEL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// All fields have defaults, so an empty file (or no file) yields a runnable server that only
/// needs a completion API key.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Upstream completion API settings
    pub completion: CompletionConfig,
    /// Image upload handling
    pub images: ImagesConfig,
    /// Input acceptance policy
    pub input: InputConfig,
    /// Shape of successful chat responses
    pub response: ResponseConfig,
    /// CORS settings for browser clients served from another origin
    pub cors: CorsConfig,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            completion: CompletionConfig::default(),
            images: ImagesConfig::default(),
            input: InputConfig::default(),
            response: ResponseConfig::default(),
            cors: CorsConfig::default(),
            enable_otel_export: false,
        }
    }
}

/// Settings for the OpenAI-compatible chat completion API.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompletionConfig {
    /// Base URL of the API; `/chat/completions` is appended to it
    pub base_url: Url,
    /// Bearer credential. When absent the server still starts, but every chat request fails
    /// with a configuration error.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Model identifier sent with every request
    pub model: String,
    /// System instruction placed first in every prompt
    pub system_prompt: String,
    /// Optional per-request timeout. Unset means the HTTP client's defaults apply.
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".parse().expect("static URL is valid"),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            timeout: None,
        }
    }
}

impl fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// How an accepted image is turned into a reference the model can read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStaging {
    /// Embed the bytes as a base64 `data:` URI
    #[default]
    Inline,
    /// Upload the bytes to blob storage and pass the returned public URL
    Blob,
}

/// Image upload configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Accept the `image` multipart field at all
    pub enabled: bool,
    /// Declared content types that are accepted (compared without parameters, case-insensitively)
    pub allowed_content_types: Vec<String>,
    /// Largest accepted image in bytes
    pub max_size_bytes: u64,
    /// Largest accepted request body in bytes, text fields and multipart framing included
    pub max_request_bytes: u64,
    /// Directory for request-scoped temporary files (default: the OS temp directory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
    /// Staging strategy
    pub staging: ImageStaging,
    /// Blob storage settings, used when `staging` is `blob`
    pub blob: BlobConfig,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_content_types: vec!["image/jpeg".to_string(), "image/png".to_string()],
            max_size_bytes: 5 * 1024 * 1024,
            max_request_bytes: 16 * 1024 * 1024,
            temp_dir: None,
            staging: ImageStaging::Inline,
            blob: BlobConfig::default(),
        }
    }
}

impl ImagesConfig {
    /// Directory that staged uploads are written to
    pub fn staging_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Blob storage API settings.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlobConfig {
    /// Upload endpoint; the object pathname is appended to it
    pub base_url: Url,
    /// Bearer credential for the storage API
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// Pathname prefix for uploaded objects
    pub path_prefix: String,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            base_url: "https://blob.vercel-storage.com".parse().expect("static URL is valid"),
            token: None,
            path_prefix: "uploads".to_string(),
        }
    }
}

impl fmt::Debug for BlobConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobConfig")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("path_prefix", &self.path_prefix)
            .finish()
    }
}

/// Input acceptance policy.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
    /// Require non-empty text even when an image is attached
    pub require_text: bool,
}

/// What a successful chat request returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseShape {
    /// `{"message": "<assistant text>"}`
    #[default]
    Message,
    /// The upstream completion payload, unchanged
    Full,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResponseConfig {
    pub shape: ResponseShape,
}

/// CORS configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests. Empty means same-origin only.
    pub allowed_origins: Vec<CorsOrigin>,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.completion.model.trim().is_empty() {
            return Err(Error::Configuration {
                message: "Config validation: completion.model cannot be empty".to_string(),
            });
        }

        if self.completion.api_key.as_deref().is_some_and(|key| key.trim().is_empty()) {
            return Err(Error::Configuration {
                message: "Config validation: completion.api_key is set but empty".to_string(),
            });
        }

        if self.images.enabled {
            if self.images.allowed_content_types.is_empty() {
                return Err(Error::Configuration {
                    message: "Config validation: images.allowed_content_types cannot be empty when images are enabled".to_string(),
                });
            }

            if self.images.max_size_bytes == 0 {
                return Err(Error::Configuration {
                    message: "Config validation: images.max_size_bytes cannot be 0".to_string(),
                });
            }

            if self.images.max_request_bytes < self.images.max_size_bytes {
                return Err(Error::Configuration {
                    message: format!(
                        "Config validation: images.max_request_bytes ({}) cannot be smaller than images.max_size_bytes ({})",
                        self.images.max_request_bytes, self.images.max_size_bytes
                    ),
                });
            }

            if self.images.staging == ImageStaging::Blob && self.images.blob.token.as_deref().is_none_or(|t| t.trim().is_empty()) {
                return Err(Error::Configuration {
                    message: "Config validation: images.staging is 'blob' but no blob token is configured. \
                     Set BLOB_READ_WRITE_TOKEN or images.blob.token."
                        .to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can override specific values
            .merge(Env::prefixed("EASEL_").ignore(&["config"]).split("__"))
            // Conventional credential variables
            .merge(
                Env::raw()
                    .only(&["OPENAI_API_KEY"])
                    .map(|_| "completion.api_key".into()),
            )
            .merge(
                Env::raw()
                    .only(&["BLOB_READ_WRITE_TOKEN"])
                    .map(|_| "images.blob.token".into()),
            )
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|_jail| {
            let config = Config::load(&args("missing.yaml"))?;

            assert_eq!(config.port, 3000);
            assert_eq!(config.completion.base_url.as_str(), "https://api.openai.com/v1");
            assert_eq!(config.completion.system_prompt, DEFAULT_SYSTEM_PROMPT);
            assert!(config.images.enabled);
            assert_eq!(config.images.allowed_content_types, vec!["image/jpeg", "image/png"]);
            assert_eq!(config.images.max_size_bytes, 5 * 1024 * 1024);
            assert_eq!(config.images.staging, ImageStaging::Inline);
            assert_eq!(config.response.shape, ResponseShape::Message);
            assert!(!config.input.require_text);

            Ok(())
        });
    }

    #[test]
    fn test_yaml_values() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
port: 8080
completion:
  base_url: http://localhost:9999/v1
  model: gpt-3.5-turbo
  timeout: 30s
images:
  max_size_bytes: 1024
  max_request_bytes: 4096
  allowed_content_types: ["image/png"]
input:
  require_text: true
response:
  shape: full
cors:
  allowed_origins: ["*", "https://gallery.example.com"]
"#,
            )?;

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.port, 8080);
            assert_eq!(config.completion.base_url.as_str(), "http://localhost:9999/v1");
            assert_eq!(config.completion.model, "gpt-3.5-turbo");
            assert_eq!(config.completion.timeout, Some(Duration::from_secs(30)));
            assert_eq!(config.images.max_size_bytes, 1024);
            assert_eq!(config.images.allowed_content_types, vec!["image/png"]);
            assert!(config.input.require_text);
            assert_eq!(config.response.shape, ResponseShape::Full);
            assert!(matches!(config.cors.allowed_origins[0], CorsOrigin::Wildcard));
            assert!(matches!(&config.cors.allowed_origins[1], CorsOrigin::Url(u) if u.host_str() == Some("gallery.example.com")));

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "port: 8080\n")?;
            jail.set_env("EASEL_PORT", "9090");
            jail.set_env("EASEL_IMAGES__STAGING", "blob");
            jail.set_env("EASEL_IMAGES__BLOB__TOKEN", "blob-token");
            jail.set_env("EASEL_CONFIG", "test.yaml");

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.port, 9090);
            assert_eq!(config.images.staging, ImageStaging::Blob);
            assert_eq!(config.images.blob.token.as_deref(), Some("blob-token"));

            Ok(())
        });
    }

    #[test]
    fn test_conventional_credential_variables() {
        Jail::expect_with(|jail| {
            jail.set_env("OPENAI_API_KEY", "sk-from-env");
            jail.set_env("BLOB_READ_WRITE_TOKEN", "vercel_blob_rw_test");

            let config = Config::load(&args("missing.yaml"))?;

            assert_eq!(config.completion.api_key.as_deref(), Some("sk-from-env"));
            assert_eq!(config.images.blob.token.as_deref(), Some("vercel_blob_rw_test"));

            Ok(())
        });
    }

    #[test]
    fn test_unknown_field_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "completion:\n  modle: gpt-4o\n")?;

            let result = Config::load(&args("test.yaml"));
            assert!(result.is_err());

            Ok(())
        });
    }

    #[test]
    fn test_blob_staging_requires_token() {
        let mut config = Config::default();
        config.images.staging = ImageStaging::Blob;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("no blob token is configured"));

        config.images.blob.token = Some("token".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blob_token_not_required_when_images_disabled() {
        let mut config = Config::default();
        config.images.enabled = false;
        config.images.staging = ImageStaging::Blob;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_request_limit_must_cover_image_limit() {
        let mut config = Config::default();
        config.images.max_size_bytes = 10;
        config.images.max_request_bytes = 5;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cannot be smaller than"));
    }

    #[test]
    fn test_empty_model_rejected() {
        let mut config = Config::default();
        config.completion.model = "  ".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let mut config = Config::default();
        config.completion.api_key = Some("sk-secret".to_string());
        config.images.blob.token = Some("blob-secret".to_string());

        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("blob-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
