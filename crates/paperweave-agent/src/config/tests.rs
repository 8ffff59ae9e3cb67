#[cfg(test)]
mod tests {
    use super::super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn with_contact() -> Config {
        let mut config = Config::default();
        config.harvester.contact = "curator@example.org".to_string();
        config
    }

    fn field_of(err: ConfigError) -> &'static str {
        match err {
            ConfigError::Invalid { field, .. } => field,
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let c = Config::default();
        assert_eq!(c.database.url, "./data/paperweave.db");
        assert_eq!(c.harvester.base_url, "https://oaipmh.arxiv.org/oai");
        assert_eq!(c.harvester.metadata_prefix, "oai_dc");
        assert_eq!(c.harvester.rate_limit.burst, 4);
        assert_eq!(c.harvester.retry.max_attempts, 3);
        assert_eq!(c.harvester.retry.max_rate_limit_retries, 30);
        assert_eq!(c.sync.batch_size, 500);
        assert_eq!(c.schedule.time, "23:30");
        assert_eq!(c.schedule.timezone, "America/New_York");
        assert_eq!(c.bulk.workers, 4);
        assert_eq!(c.bulk.flush_threshold, 20_000);
        assert_eq!(c.bulk.sample_records, 50_000);
        assert_eq!(c.citations.chunk_size, 1000);
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let c = Config::from_toml_str(
            r#"
            [harvester]
            contact = "ops@example.org"
            set = "cs"

            [harvester.retry]
            backoff_secs = 5

            [bulk]
            workers = 8
            "#,
        )
        .unwrap();
        assert_eq!(c.harvester.contact, "ops@example.org");
        assert_eq!(c.harvester.set.as_deref(), Some("cs"));
        assert_eq!(c.harvester.retry.backoff_secs, 5);
        assert_eq!(c.harvester.retry.max_attempts, 3);
        assert_eq!(c.bulk.workers, 8);
        assert_eq!(c.bulk.corpus_label, "openalex");
        assert_eq!(c.sync.batch_size, 500);
        c.validate().unwrap();
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = Config::from_toml_str("[sync]\nbatch_size = \"lots\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_env_overrides_apply_and_blank_values_are_ignored() {
        let env: HashMap<&str, &str> = [
            ("PAPERWEAVE_CONTACT", "env@example.org"),
            ("PAPERWEAVE_DATABASE_URL", "libsql://graph.example.io"),
            ("PAPERWEAVE_DB_AUTH_TOKEN", "s3cret"),
        ]
        .into_iter()
        .collect();

        let mut c = Config::default();
        c.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.harvester.contact, "env@example.org");
        assert!(c.database.is_remote());
        assert_eq!(c.database.auth_token.as_ref().unwrap().expose_secret(), "s3cret");
        c.validate().unwrap();

        let mut c = with_contact();
        c.apply_env(|k| (k == "PAPERWEAVE_CONTACT").then(|| "   ".to_string()));
        assert_eq!(c.harvester.contact, "curator@example.org");
    }

    #[test]
    fn test_validate_requires_contact() {
        assert_eq!(field_of(Config::default().validate().unwrap_err()), "harvester.contact");
    }

    #[test]
    fn test_validate_rejects_non_http_base_url() {
        let mut c = with_contact();
        c.harvester.base_url = "ftp://oai.example.org".to_string();
        assert_eq!(field_of(c.validate().unwrap_err()), "harvester.base_url");

        c.harvester.base_url = "not a url".to_string();
        assert_eq!(field_of(c.validate().unwrap_err()), "harvester.base_url");
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut c = with_contact();
        c.harvester.rate_limit.burst = 0;
        assert_eq!(field_of(c.validate().unwrap_err()), "harvester.rate_limit");

        let mut c = with_contact();
        c.harvester.retry.max_attempts = 0;
        assert_eq!(field_of(c.validate().unwrap_err()), "harvester.retry.max_attempts");

        let mut c = with_contact();
        c.harvester.retry.max_rate_limit_wait_secs = 0;
        assert_eq!(field_of(c.validate().unwrap_err()), "harvester.retry.max_rate_limit_wait_secs");

        let mut c = with_contact();
        c.sync.batch_size = 0;
        assert_eq!(field_of(c.validate().unwrap_err()), "sync.batch_size");

        let mut c = with_contact();
        c.bulk.workers = 0;
        assert_eq!(field_of(c.validate().unwrap_err()), "bulk");

        let mut c = with_contact();
        c.citations.chunk_size = 0;
        assert_eq!(field_of(c.validate().unwrap_err()), "citations.chunk_size");
    }

    #[test]
    fn test_validate_rejects_bad_schedule() {
        let mut c = with_contact();
        c.schedule.timezone = "Mars/Olympus_Mons".to_string();
        assert!(matches!(c.validate().unwrap_err(), ConfigError::Schedule(_)));

        let mut c = with_contact();
        c.schedule.time = "25:99".to_string();
        assert!(matches!(c.validate().unwrap_err(), ConfigError::Schedule(_)));
    }

    #[test]
    fn test_remote_database_needs_token() {
        let mut c = with_contact();
        c.database.url = "libsql://graph.example.io".to_string();
        assert_eq!(field_of(c.validate().unwrap_err()), "database.url");
    }

    #[test]
    fn test_typed_views() {
        let c = with_contact();
        let retry = c.retry_policy();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.backoff, Duration::from_secs(60));
        assert_eq!(retry.rate_limit_backoff, Duration::from_millis(1000));
        assert_eq!(retry.max_rate_limit_wait, Duration::from_secs(300));
        assert_eq!(c.request_timeout(), Duration::from_secs(60));
        assert_eq!(c.default_lookback(), chrono::Duration::days(7));

        let sync = c.sync_options();
        assert_eq!(sync.batch_size, 500);
        assert!(sync.until.is_none());

        let matcher = c.matcher_options();
        assert_eq!(matcher.data_dir, PathBuf::from("./data/works"));
        assert_eq!(matcher.corpus_label, "openalex");
    }
}
