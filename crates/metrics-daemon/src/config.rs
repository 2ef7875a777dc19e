// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use metrics_store::errors::ConfigError;
use metrics_store::StoreConfig;
use std::env;

const DEFAULT_ADDRESS: &str = "localhost:8080";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Collector server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `host:port` to listen on.
    pub address: String,
    /// Shared secret for verifying `HashSHA256` request signatures.
    pub key: Option<String>,
    pub log_level: String,
    pub store: StoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            key: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            store: StoreConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let address = env::var("ADDRESS")
            .map(|a| a.trim().to_string())
            .unwrap_or_else(|_| DEFAULT_ADDRESS.to_string());
        let key = env::var("KEY").ok().filter(|k| !k.is_empty());
        let log_level = env::var("LOG_LEVEL")
            .map(|l| l.to_lowercase())
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

        let config = Self {
            address,
            key,
            log_level,
            store: StoreConfig::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.is_empty() || !self.address.contains(':') {
            return Err(ConfigError::InvalidConfig(format!(
                "ADDRESS must be host:port, got '{}'",
                self.address
            )));
        }
        self.store.validate()
    }

    /// Address handed to the listener; a bare `:port` binds every interface.
    pub fn bind_address(&self) -> String {
        match self.address.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => self.address.clone(),
        }
    }
}
