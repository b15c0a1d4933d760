use crate::config::types::{Config, CrawlerConfig, ManifestConfig, OutputConfig, RetryConfig};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_retry_config(&config.retry)?;
    validate_user_agent(&config.user_agent.value)?;
    validate_output_config(&config.output)?;
    validate_manifest_config(&config.manifest)?;
    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 64, got {}",
            config.concurrency
        )));
    }

    if config.request_timeout < 1 {
        return Err(ConfigError::Validation(
            "request-timeout must be at least 1 second".to_string(),
        ));
    }

    if config.chunk_size == 0 {
        return Err(ConfigError::Validation(
            "chunk-size must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    Ok(())
}

fn validate_user_agent(value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent value cannot be empty".to_string(),
        ));
    }

    // Header values cannot carry line breaks
    if value.contains(['\r', '\n']) {
        return Err(ConfigError::Validation(
            "user-agent value cannot contain line breaks".to_string(),
        ));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.destination_root.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "destination-root cannot be empty".to_string(),
        ));
    }

    validate_file_name("metadata-file", &config.metadata_file)?;
    validate_file_name("entry-file", &config.entry_file)?;

    if config.metadata_file == config.entry_file {
        return Err(ConfigError::Validation(
            "metadata-file and entry-file must differ".to_string(),
        ));
    }

    Ok(())
}

fn validate_manifest_config(config: &ManifestConfig) -> Result<(), ConfigError> {
    validate_file_name("manifest file-name", &config.file_name)?;

    for prefix in &config.resource_prefixes {
        if prefix.is_empty() || prefix.contains('/') {
            return Err(ConfigError::Validation(format!(
                "resource prefix '{}' must be a single non-empty folder name",
                prefix
            )));
        }
    }

    Ok(())
}

/// A bare file name: non-empty, no separators, no parent references
fn validate_file_name(field: &str, name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(ConfigError::Validation(format!(
            "{} must be a plain file name, got '{}'",
            field, name
        )));
    }
    Ok(())
}
