use crate::config::types::{
    CollectionConfig, CollectionKind, Config, CrawlerConfig, OutputConfig, UserAgentConfig,
};
use crate::ConfigError;
use regex::Regex;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_collections(&config.collections)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.network_concurrency < 1 || config.network_concurrency > 256 {
        return Err(ConfigError::Validation(format!(
            "network_concurrency must be between 1 and 256, got {}",
            config.network_concurrency
        )));
    }

    validate_fan_out_limit(config.fan_out_limit)?;

    if config.max_retries > 20 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= 20, got {}",
            config.max_retries
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_fan_out_limit(limit: usize) -> Result<(), ConfigError> {
    if limit < 1 {
        return Err(ConfigError::Validation(format!(
            "fan_out_limit must be >= 1, got {}",
            limit
        )));
    }
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates collection entries
fn validate_collections(collections: &[CollectionConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for collection in collections {
        validate_table_name(&collection.name)?;

        if !seen.insert(collection.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate collection name '{}'",
                collection.name
            )));
        }

        validate_url_template(collection)?;
        validate_max_source(collection)?;

        if let Some(limit) = collection.fan_out_limit {
            validate_fan_out_limit(limit)?;
        }
    }

    Ok(())
}

/// Collection names double as SQL table names
fn validate_table_name(name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if !valid {
        return Err(ConfigError::Validation(format!(
            "Collection name '{}' must match [A-Za-z_][A-Za-z0-9_]*",
            name
        )));
    }

    Ok(())
}

fn validate_url_template(collection: &CollectionConfig) -> Result<(), ConfigError> {
    if !collection.url.contains("{id}") {
        return Err(ConfigError::Validation(format!(
            "URL template for '{}' must contain {{id}}",
            collection.name
        )));
    }

    if collection.kind == CollectionKind::Paginated && !collection.url.contains("{page}") {
        return Err(ConfigError::Validation(format!(
            "URL template for paginated collection '{}' must contain {{page}}",
            collection.name
        )));
    }

    Url::parse(&collection.url_for(1, 1)).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid URL template '{}': {}", collection.url, e))
    })?;

    Ok(())
}

/// Exactly one of a fixed ceiling or a discovery page must be configured
fn validate_max_source(collection: &CollectionConfig) -> Result<(), ConfigError> {
    match (
        collection.max_id,
        &collection.discovery_url,
        &collection.id_pattern,
    ) {
        (Some(max_id), None, None) => {
            if max_id < 1 {
                return Err(ConfigError::Validation(format!(
                    "max_id for '{}' must be >= 1, got {}",
                    collection.name, max_id
                )));
            }
            Ok(())
        }
        (None, Some(url), Some(pattern)) => {
            Url::parse(url).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid discovery_url '{}': {}", url, e))
            })?;
            let regex = Regex::new(pattern).map_err(|e| {
                ConfigError::InvalidPattern(format!("'{}' does not compile: {}", pattern, e))
            })?;
            if regex.captures_len() < 2 {
                return Err(ConfigError::InvalidPattern(format!(
                    "'{}' must capture the id in a group",
                    pattern
                )));
            }
            Ok(())
        }
        _ => Err(ConfigError::Validation(format!(
            "Collection '{}' needs either max-id or both discovery-url and id-pattern",
            collection.name
        ))),
    }
}
