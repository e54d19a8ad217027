//! Logic for loading configuration in to an object model
mod expansion;

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use derivative::Derivative;
use displaydoc::Display;
use schemars::JsonSchema;
use schemars::schema::RootSchema;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

pub(crate) use self::expansion::Expansion;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not read configuration file '{path}': {error}
    CannotReadFile { path: String, error: std::io::Error },
    /// could not expand variable: {key}, {cause}
    CannotExpandVariable { key: String, cause: String },
    /// could not expand variable: {key}. Variables must be prefixed with one of '{supported_modes}' followed by '.' e.g. 'env.'
    UnknownExpansionMode {
        key: String,
        supported_modes: String,
    },
    /// the GATEWAY_CONFIG_ENV_PREFIX environment variable is not valid unicode
    InvalidExpansionModeConfig,
    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
    /// could not parse configuration: {0}
    ParseConfigError(serde_yaml::Error),
    /// could not deserialize configuration: {0}
    DeserializeConfigError(serde_json::Error),
}

/// The configuration for the gateway.
///
/// Can be created through `serde::Deserialize` from various formats,
/// or inline in Rust code with `serde_json::json!` and `serde_json::from_value`.
#[derive(Clone, Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Configuration options pertaining to the http server component.
    #[serde(default)]
    pub server: Server,

    /// The upstream GraphQL endpoint every operation is forwarded to.
    pub upstream: Upstream,
}

/// The path answered by the health check.
pub(crate) const HEALTH_CHECK_PATH: &str = "/health";

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_path() -> String {
    String::from("/graphql")
}

fn default_true() -> bool {
    true
}

fn default_upstream_name() -> String {
    String::from("upstream")
}

fn default_admin_secret_header() -> String {
    String::from("x-hasura-admin-secret")
}

#[buildstructor::buildstructor]
impl Configuration {
    #[builder]
    pub fn new(server: Option<Server>, upstream: Upstream) -> Self {
        Self {
            server: server.unwrap_or_default(),
            upstream,
        }
    }

    /// Loads the configuration file at `path`, then applies `overrides`.
    ///
    /// Without a file, the configuration is built from the overrides alone.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigurationError> {
        let raw = match path {
            Some(path) => {
                fs::read_to_string(path).map_err(|error| ConfigurationError::CannotReadFile {
                    path: path.display().to_string(),
                    error,
                })?
            }
            None => String::new(),
        };
        Self::from_yaml(&raw, &Expansion::from_env()?, overrides)
    }

    pub(crate) fn from_yaml(
        raw: &str,
        expansion: &Expansion,
        overrides: &Overrides,
    ) -> Result<Self, ConfigurationError> {
        if raw.trim().is_empty() {
            return Self::from_value(Value::Object(Default::default()), expansion, overrides);
        }
        let value: Value = match serde_yaml::from_str(raw) {
            Ok(Value::Null) => Value::Object(Default::default()),
            Ok(value) => value,
            Err(error) => return Err(ConfigurationError::ParseConfigError(error)),
        };
        Self::from_value(value, expansion, overrides)
    }

    fn from_value(
        value: Value,
        expansion: &Expansion,
        overrides: &Overrides,
    ) -> Result<Self, ConfigurationError> {
        let mut value = expansion.expand(&value)?;
        overrides.apply(&mut value)?;
        let configuration: Configuration =
            serde_json::from_value(value).map_err(ConfigurationError::DeserializeConfigError)?;
        configuration.validate()?;
        Ok(configuration)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.server.path.starts_with('/') {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "invalid 'server.path'",
                error: format!("'{}' must start with a '/'", self.server.path),
            });
        }
        if self.server.health_check && self.server.path == HEALTH_CHECK_PATH {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "invalid 'server.path'",
                error: format!("'{HEALTH_CHECK_PATH}' is reserved for the health check"),
            });
        }
        if !matches!(self.upstream.url.scheme(), "http" | "https") {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "invalid 'upstream.url'",
                error: format!("unsupported scheme '{}'", self.upstream.url.scheme()),
            });
        }
        Ok(())
    }
}

/// Parse configuration from a string in YAML syntax
impl FromStr for Configuration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_yaml(s, &Expansion::from_env()?, &Overrides::default())
    }
}

/// Generate a JSON schema for the configuration.
pub fn generate_config_schema() -> RootSchema {
    schemars::schema_for!(Configuration)
}

/// Configuration options pertaining to the http server component.
#[derive(Clone, Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Server {
    /// The socket address and port to listen on
    /// Defaults to 127.0.0.1:3000
    #[serde(default = "default_listen")]
    #[schemars(with = "String", default = "default_listen")]
    pub listen: SocketAddr,

    /// The HTTP path of the GraphQL endpoint
    /// Defaults to /graphql
    #[serde(default = "default_path")]
    pub path: String,

    /// Serve GraphiQL on GET requests to the GraphQL endpoint
    /// enabled by default
    #[serde(default = "default_true")]
    pub landing_page: bool,

    /// Answer GET /health
    /// enabled by default
    #[serde(default = "default_true")]
    pub health_check: bool,
}

#[buildstructor::buildstructor]
impl Server {
    #[builder]
    pub fn new(
        listen: Option<SocketAddr>,
        path: Option<String>,
        landing_page: Option<bool>,
        health_check: Option<bool>,
    ) -> Self {
        Self {
            listen: listen.unwrap_or_else(default_listen),
            path: path.unwrap_or_else(default_path),
            landing_page: landing_page.unwrap_or_else(default_true),
            health_check: health_check.unwrap_or_else(default_true),
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Configuration of the upstream GraphQL endpoint.
#[derive(Clone, Derivative, Deserialize, JsonSchema)]
#[derivative(Debug)]
#[serde(deny_unknown_fields)]
pub struct Upstream {
    /// Name of the upstream in logs and error extensions
    /// Defaults to 'upstream'
    #[serde(default = "default_upstream_name")]
    pub name: String,

    /// The upstream GraphQL endpoint URL
    pub url: Url,

    /// The static admin credential sent with every upstream request
    #[derivative(Debug = "ignore")]
    pub admin_secret: String,

    /// The header carrying the admin credential
    /// Defaults to 'x-hasura-admin-secret'
    #[serde(default = "default_admin_secret_header")]
    pub admin_secret_header: String,

    /// Upstream request timeout in human-readable format; no timeout when unset
    #[serde(default, with = "humantime_serde")]
    #[schemars(with = "Option<String>")]
    pub timeout: Option<Duration>,
}

#[buildstructor::buildstructor]
impl Upstream {
    #[builder]
    pub fn new(
        name: Option<String>,
        url: Url,
        admin_secret: String,
        admin_secret_header: Option<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            name: name.unwrap_or_else(default_upstream_name),
            url,
            admin_secret,
            admin_secret_header: admin_secret_header.unwrap_or_else(default_admin_secret_header),
            timeout,
        }
    }
}

/// Values given on the command line, taking precedence over the configuration file.
#[derive(Clone, Derivative, Default)]
#[derivative(Debug)]
pub struct Overrides {
    pub listen: Option<SocketAddr>,
    pub upstream_url: Option<Url>,
    #[derivative(Debug = "ignore")]
    pub upstream_admin_secret: Option<String>,
}

impl Overrides {
    fn apply(&self, configuration: &mut Value) -> Result<(), ConfigurationError> {
        let root = configuration.as_object_mut().ok_or_else(|| {
            ConfigurationError::InvalidConfiguration {
                message: "could not apply overrides",
                error: "the configuration must be a map".to_string(),
            }
        })?;
        if let Some(listen) = self.listen {
            Self::section(root, "server")?.insert("listen".into(), listen.to_string().into());
        }
        if let Some(url) = &self.upstream_url {
            Self::section(root, "upstream")?.insert("url".into(), url.as_str().into());
        }
        if let Some(secret) = &self.upstream_admin_secret {
            Self::section(root, "upstream")?.insert("admin_secret".into(), secret.clone().into());
        }
        Ok(())
    }

    fn section<'a>(
        root: &'a mut serde_json::Map<String, Value>,
        name: &'static str,
    ) -> Result<&'a mut serde_json::Map<String, Value>, ConfigurationError> {
        root.entry(name)
            .or_insert_with(|| Value::Object(Default::default()))
            .as_object_mut()
            .ok_or_else(|| ConfigurationError::InvalidConfiguration {
                message: "could not apply overrides",
                error: format!("'{name}' must be a map"),
            })
    }
}
