use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.database.max_connections = Some(4);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        database_max_connections: Some(16),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.database.max_connections.get(), 16);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_select_in_memory_backends() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert!(settings.database.url.is_none());
    assert!(settings.redis.url.is_none());
    assert_eq!(settings.pubsub.poll_interval, Duration::from_millis(100));
    assert_eq!(settings.logging.format, LogFormat::Compact);
}

#[test]
fn blank_urls_are_ignored() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());
    raw.redis.url = Some(" redis://127.0.0.1/ ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
    assert_eq!(settings.redis.url.as_deref(), Some("redis://127.0.0.1/"));
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["rgdps"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "rgdps",
        "serve",
        "--database-url",
        "mysql://override",
        "--redis-url",
        "redis://cache",
        "--pubsub-poll-interval-ms",
        "25",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(
                serve.overrides.database_url.as_deref(),
                Some("mysql://override")
            );
            assert_eq!(serve.overrides.redis_url.as_deref(), Some("redis://cache"));
            assert_eq!(serve.overrides.pubsub_poll_interval_ms, Some(25));
        }
    }
}

#[test]
fn cache_settings_use_correct_defaults() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.cache.user_limit, 2048);
    assert_eq!(settings.cache.friend_request_limit, 1024);
    assert_eq!(settings.cache.song_limit, 512);
    assert_eq!(settings.cache.comment_limit, 1024);
    assert_eq!(settings.cache.key_prefix, "rgdps:cache");
}

#[test]
fn zero_cache_limit_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.song_limit = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero limit");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.song_limit",
            ..
        }
    ));
}

#[test]
fn poll_interval_is_bounded() {
    for millis in [0, MAX_PUBSUB_POLL_INTERVAL_MS + 1] {
        let mut raw = RawSettings::default();
        raw.pubsub.poll_interval_ms = Some(millis);
        assert!(Settings::from_raw(raw).is_err());
    }
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "logging.level",
            ..
        })
    ));
}
