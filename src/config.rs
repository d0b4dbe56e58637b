// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::{Deserialize, Serialize};
use std::env;

use crate::core::constants::config;
use crate::core::errors::WardenError;

const DEFAULT_GUARD_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub guard_token: String,
    /// Resolved guard endpoint (template placeholders already substituted)
    pub guard_url: String,
    pub app_id: Option<String>,
    pub app_name: Option<String>,
    /// Client-layer timeout for guard calls; the pipeline itself imposes none
    pub guard_timeout_secs: u64,
    pub log_level: String,
    pub log_format: String, // "json" or "text"
}

impl Config {
    pub fn from_env() -> Result<Self, WardenError> {
        let guard_token = require(config::ENV_GUARD_TOKEN)?;
        let template = require(config::ENV_GUARD_URL_TEMPLATE)?;
        let app_id = env::var(config::ENV_APP_ID).ok();
        let guard_url = resolve_url_template(&template, app_id.as_deref())?;
        let guard_timeout_secs = match env::var(config::ENV_GUARD_TIMEOUT_SECS) {
            Ok(raw) => raw.parse::<u64>().map_err(|_| {
                WardenError::ConfigurationError(format!(
                    "{} must be an integer number of seconds, got '{}'",
                    config::ENV_GUARD_TIMEOUT_SECS,
                    raw
                ))
            })?,
            Err(_) => DEFAULT_GUARD_TIMEOUT_SECS,
        };

        Ok(Self {
            guard_token,
            guard_url,
            app_id,
            app_name: env::var(config::ENV_APP_NAME).ok(),
            guard_timeout_secs,
            log_level: env::var(config::ENV_LOG_LEVEL).unwrap_or_else(|_| "info".to_string()),
            log_format: env::var(config::ENV_LOG_FORMAT).unwrap_or_else(|_| "text".to_string()),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            guard_token: String::new(),
            guard_url: String::new(),
            app_id: None,
            app_name: None,
            guard_timeout_secs: DEFAULT_GUARD_TIMEOUT_SECS,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

fn require(name: &str) -> Result<String, WardenError> {
    env::var(name)
        .map_err(|_| WardenError::ConfigurationError(format!("Missing environment variable: {}", name)))
}

/// Substitute the `{app_id}` placeholder, if present. A template that names
/// the placeholder without an app id configured is a fatal misconfiguration.
fn resolve_url_template(template: &str, app_id: Option<&str>) -> Result<String, WardenError> {
    if !template.contains("{app_id}") {
        return Ok(template.to_string());
    }
    match app_id {
        Some(id) => Ok(template.replace("{app_id}", id)),
        None => Err(WardenError::ConfigurationError(format!(
            "{} contains an {{app_id}} placeholder but {} is not set",
            config::ENV_GUARD_URL_TEMPLATE,
            config::ENV_APP_ID
        ))),
    }
}
