//! Environment variable expansion in the configuration file

#[cfg(test)]
use std::collections::HashMap;
use std::borrow::Cow;
use std::env;
use std::env::VarError;
use std::fs;

use serde_json::Value;

use super::ConfigurationError;

const PREFIX_ENV: &str = "GATEWAY_CONFIG_ENV_PREFIX";

/// Expands `${env.NAME}` and `${file.PATH}` in every string of a configuration.
#[derive(Clone, Debug)]
pub(crate) struct Expansion {
    prefix: Option<String>,
    supported_modes: Vec<String>,
    #[cfg(test)]
    mocked_env_vars: HashMap<String, String>,
}

impl Expansion {
    pub(crate) fn from_env() -> Result<Self, ConfigurationError> {
        let prefix = match env::var(PREFIX_ENV) {
            Ok(v) => Some(v),
            Err(VarError::NotPresent) => None,
            Err(VarError::NotUnicode(_)) => Err(ConfigurationError::InvalidExpansionModeConfig)?,
        };
        Ok(Self {
            prefix,
            supported_modes: vec!["env".to_string(), "file".to_string()],
            #[cfg(test)]
            mocked_env_vars: HashMap::new(),
        })
    }

    #[cfg(test)]
    pub(crate) fn mocked(prefix: Option<&str>, vars: &[(&str, &str)]) -> Self {
        Self {
            prefix: prefix.map(str::to_string),
            supported_modes: vec!["env".to_string(), "file".to_string()],
            mocked_env_vars: vars
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        }
    }

    fn context_fn(&self) -> impl Fn(&str) -> Result<Option<String>, ConfigurationError> + '_ {
        move |key: &str| match key.split_once('.') {
            Some(("env", name)) => self.expand_env(name),
            Some(("file", path)) => Self::read_file(path),
            _ => Err(ConfigurationError::UnknownExpansionMode {
                key: key.to_string(),
                supported_modes: self.supported_modes.join("|"),
            }),
        }
    }

    // A missing file leaves the variable unexpanded.
    fn read_file(path: &str) -> Result<Option<String>, ConfigurationError> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Some(contents)),
            Err(cause) if cause.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(cause) => Err(ConfigurationError::CannotExpandVariable {
                key: path.to_string(),
                cause: cause.to_string(),
            }),
        }
    }

    fn expand_env(&self, key: &str) -> Result<Option<String>, ConfigurationError> {
        match self.prefix.as_ref() {
            None => self.get_env(key),
            Some(prefix) => self.get_env(&format!("{prefix}_{key}")),
        }
        .map(Some)
        .map_err(|cause| ConfigurationError::CannotExpandVariable {
            key: key.to_string(),
            cause: format!("{cause}"),
        })
    }

    fn get_env(&self, name: &str) -> Result<String, VarError> {
        #[cfg(test)]
        if let Some(value) = self.mocked_env_vars.get(name) {
            return Ok(value.clone());
        }
        env::var(name)
    }

    pub(crate) fn expand(&self, configuration: &Value) -> Result<Value, ConfigurationError> {
        let mut configuration = configuration.clone();
        self.visit(&mut configuration)?;
        Ok(configuration)
    }

    fn visit(&self, value: &mut Value) -> Result<(), ConfigurationError> {
        match value {
            Value::String(text) => {
                let expanded = shellexpand::env_with_context(text.as_str(), self.context_fn())
                    .map_err(|e| e.cause)?;
                if let Cow::Owned(expanded) = expanded {
                    *text = expanded;
                }
            }
            Value::Array(items) => items.iter_mut().try_for_each(|item| self.visit(item))?,
            Value::Object(fields) => fields.values_mut().try_for_each(|field| self.visit(field))?,
            _ => {}
        }
        Ok(())
    }
}
