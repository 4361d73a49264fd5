use crate::config::types::{ClientConfig, Config, CrawlerConfig, OutputConfig, SaveFormat};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_seeds(config)?;
    validate_output_config(&config.output)?;
    validate_client_config(&config.client)?;
    validate_filter_config(config)?;
    Ok(())
}

/// The comment filter reads the run's comment file, so it needs a file export
fn validate_filter_config(config: &Config) -> Result<(), ConfigError> {
    if config.filter.enabled && !config.output.format.is_file_based() {
        return Err(ConfigError::Validation(format!(
            "filter.enabled requires csv or json output, not {}",
            config.output.format.as_str()
        )));
    }
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_items < 1 {
        return Err(ConfigError::Validation(format!(
            "max_items must be >= 1, got {}",
            config.max_items
        )));
    }

    if config.max_concurrency < 1 || config.max_concurrency > 16 {
        return Err(ConfigError::Validation(format!(
            "max_concurrency must be between 1 and 16, got {}",
            config.max_concurrency
        )));
    }

    if !config.crawl_interval_secs.is_finite() || config.crawl_interval_secs < 0.0 {
        return Err(ConfigError::Validation(format!(
            "crawl_interval_secs must be a non-negative number, got {}",
            config.crawl_interval_secs
        )));
    }

    if config.start_page < 1 {
        return Err(ConfigError::Validation(
            "start_page is 1-based and must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates that the selected mode has something to work on
fn validate_seeds(config: &Config) -> Result<(), ConfigError> {
    let seeds = config.seeds_for_mode();
    if seeds.iter().all(|s| s.trim().is_empty()) {
        return Err(ConfigError::Validation(format!(
            "{} mode needs at least one seed",
            config.crawler.mode
        )));
    }
    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.format.is_file_based() && config.directory.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    if config.format == SaveFormat::Sqlite && config.database_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.format == SaveFormat::Mysql {
        match config.database_url.as_deref() {
            Some(url) if url.starts_with("mysql://") => {}
            Some(url) => {
                return Err(ConfigError::Validation(format!(
                    "database_url must be a mysql:// URL, got '{}'",
                    url
                )))
            }
            None => {
                return Err(ConfigError::Validation(
                    "database_url is required for the mysql format".to_string(),
                ))
            }
        }
    }

    Ok(())
}

/// Validates client retry bounds
fn validate_client_config(config: &ClientConfig) -> Result<(), ConfigError> {
    if config.sign_retries < 1 {
        return Err(ConfigError::Validation(
            "sign_retries must be >= 1".to_string(),
        ));
    }

    if config.transport_retries < 1 {
        return Err(ConfigError::Validation(
            "transport_retries must be >= 1".to_string(),
        ));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrowserConfig, FilterConfig, SeedConfig};
    use crate::model::{CrawlMode, Platform, SortOrder};

    fn base_config() -> Config {
        Config {
            crawler: CrawlerConfig {
                platform: Platform::Xhs,
                mode: CrawlMode::Search,
                max_items: 10,
                max_comments_per_item: 10,
                enable_comments: true,
                enable_sub_comments: false,
                enable_media: false,
                crawl_interval_secs: 1.0,
                max_concurrency: 1,
                start_page: 1,
                sort: SortOrder::General,
            },
            seeds: SeedConfig {
                keywords: vec!["cats".to_string()],
                ..Default::default()
            },
            output: OutputConfig::default(),
            client: ClientConfig::default(),
            browser: BrowserConfig::default(),
            filter: FilterConfig::default(),
        }
    }

    #[test]
    fn test_base_config_is_valid() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn test_concurrency_bounds() {
        let mut config = base_config();
        config.crawler.max_concurrency = 0;
        assert!(validate(&config).is_err());
        config.crawler.max_concurrency = 17;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_negative_interval_rejected() {
        let mut config = base_config();
        config.crawler.crawl_interval_secs = -1.0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_mysql_requires_url() {
        let mut config = base_config();
        config.output.format = SaveFormat::Mysql;
        assert!(validate(&config).is_err());

        config.output.database_url = Some("postgres://localhost/db".to_string());
        assert!(validate(&config).is_err());

        config.output.database_url = Some("mysql://root@localhost/harvest".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_detail_mode_needs_items() {
        let mut config = base_config();
        config.crawler.mode = CrawlMode::Detail;
        assert!(validate(&config).is_err());

        config.seeds.items = vec!["https://www.xiaohongshu.com/explore/abc".to_string()];
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_filter_needs_file_output() {
        let mut config = base_config();
        config.filter.enabled = true;
        assert!(validate(&config).is_ok());

        config.output.format = SaveFormat::Sqlite;
        assert!(validate(&config).is_err());
    }
}
