use crate::config::types::{
    Config, CrawlerConfig, FetchConfig, OutputConfig, SpiderConfig, SpiderKind, UserAgentConfig,
    WebentityConfig,
};
use crate::job::CrawlTarget;
use crate::ConfigError;
use regex::Regex;
use url::Url;

const WEBENTITY_STATUSES: &[&str] = &["in", "out", "undecided"];

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_fetch_config(&config.fetch)?;
    validate_output_config(&config.output)?;
    validate_spiders(config)?;

    for target in parse_seeds(&config.seeds)? {
        if config.is_multi_spider() {
            match target.spider() {
                Some(name) if config.spiders.contains_key(name) => {}
                Some(name) => {
                    return Err(ConfigError::Validation(format!(
                        "Seed '{}' names unknown spider '{}'",
                        target.url(),
                        name
                    )))
                }
                None => {
                    return Err(ConfigError::Validation(format!(
                        "Seed '{}' must name a spider in a multi-spider crawl",
                        target.url()
                    )))
                }
            }
        }
    }

    if config.crawler.resume && config.output.database_path.is_none() {
        return Err(ConfigError::Validation(
            "resume requires output.database-path".to_string(),
        ));
    }

    Ok(())
}

/// Converts seed entries into crawl targets
///
/// Seeds must be absolute HTTP(S) URLs.
pub fn parse_seeds(values: &[toml::Value]) -> Result<Vec<CrawlTarget>, ConfigError> {
    values
        .iter()
        .map(|value| {
            let json = serde_json::to_value(value)
                .map_err(|e| ConfigError::Validation(format!("Invalid seed: {}", e)))?;
            let target = CrawlTarget::from_value(json)
                .map_err(|e| ConfigError::Validation(format!("Invalid seed: {}", e)))?;
            validate_http_url(target.url(), "seed URL")?;
            Ok(target)
        })
        .collect()
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_workers < 1 || config.max_workers > 256 {
        return Err(ConfigError::Validation(format!(
            "max_workers must be between 1 and 256, got {}",
            config.max_workers
        )));
    }

    if config.domain_parallelism < 1 {
        return Err(ConfigError::Validation(format!(
            "domain_parallelism must be >= 1, got {}",
            config.domain_parallelism
        )));
    }

    for (domain, parallelism) in &config.domain_parallelism_overrides {
        if *parallelism < 1 {
            return Err(ConfigError::Validation(format!(
                "domain_parallelism override for '{}' must be >= 1, got {}",
                domain, parallelism
            )));
        }
    }

    if config.cleanup_interval < 1 {
        return Err(ConfigError::Validation(format!(
            "cleanup_interval must be >= 1, got {}",
            config.cleanup_interval
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

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.timeout < 1 {
        return Err(ConfigError::Validation(
            "fetch timeout must be >= 1 second".to_string(),
        ));
    }

    if config.connect_timeout < 1 || config.connect_timeout > config.timeout {
        return Err(ConfigError::Validation(format!(
            "connect_timeout must be between 1 and timeout ({}s), got {}s",
            config.timeout, config.connect_timeout
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if matches!(&config.database_path, Some(path) if path.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if matches!(&config.results_path, Some(path) if path.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "results_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_spiders(config: &Config) -> Result<(), ConfigError> {
    if config.spider.is_some() && !config.spiders.is_empty() {
        return Err(ConfigError::Validation(
            "use either [spider] or [spiders.<name>], not both".to_string(),
        ));
    }

    if let Some(spider) = &config.spider {
        validate_spider_config("spider", spider)?;
    }

    for (name, spider) in &config.spiders {
        if name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "spider names cannot be empty".to_string(),
            ));
        }
        validate_spider_config(name, spider)?;
    }

    Ok(())
}

fn validate_spider_config(name: &str, config: &SpiderConfig) -> Result<(), ConfigError> {
    parse_seeds(&config.seeds)?;

    match config.kind {
        SpiderKind::Links => Ok(()),
        SpiderKind::Regex => {
            let pattern = config.pattern.as_deref().ok_or_else(|| {
                ConfigError::Validation(format!("regex spider '{}' requires a pattern", name))
            })?;
            validate_regex(pattern)?;

            if let Some(follow) = &config.follow_pattern {
                validate_regex(follow)?;
            }
            Ok(())
        }
        SpiderKind::Prefix => {
            if config.webentities.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "prefix spider '{}' requires at least one webentity",
                    name
                )));
            }
            config.webentities.iter().try_for_each(validate_webentity)
        }
    }
}

fn validate_regex(pattern: &str) -> Result<(), ConfigError> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", pattern, e)))
}

fn validate_webentity(entity: &WebentityConfig) -> Result<(), ConfigError> {
    if entity.name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "webentity name cannot be empty".to_string(),
        ));
    }

    if !WEBENTITY_STATUSES.contains(&entity.status.as_str()) {
        return Err(ConfigError::Validation(format!(
            "webentity '{}' has status '{}', expected one of {:?}",
            entity.name, entity.status, WEBENTITY_STATUSES
        )));
    }

    if entity.prefixes.is_empty() {
        return Err(ConfigError::Validation(format!(
            "webentity '{}' must have at least one prefix",
            entity.name
        )));
    }

    for prefix in &entity.prefixes {
        validate_http_url(prefix, "webentity prefix")?;
    }

    Ok(())
}

fn validate_http_url(raw: &str, what: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", what, raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "{} '{}' must use HTTP or HTTPS",
            what, raw
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Must contain a single @ with text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
