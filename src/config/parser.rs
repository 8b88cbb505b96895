use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Reads, parses and validates a harvest configuration
///
/// ```no_run
/// use comment_harvester::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// for collection in &config.collections {
///     println!("{} -> {}", collection.name, collection.url);
/// }
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    parse_config(&std::fs::read_to_string(path)?)
}

/// Parses and validates configuration text
pub fn parse_config(text: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(text)?;
    validate(&config)?;
    Ok(config)
}

/// Hex SHA-256 of the configuration file as it sits on disk
///
/// Logged at startup so a database can be traced back to the configuration
/// that filled it.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    Ok(hash_text(&std::fs::read_to_string(path)?))
}

fn hash_text(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Loads the configuration together with the hash of the exact text parsed
///
/// The file is read once, so the hash always matches the returned config.
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let config = parse_config(&text)?;
    Ok((config, hash_text(&text)))
}
