use clap::Parser;

use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.cache.default_ttl_seconds = Some(120);

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        cache_default_ttl_seconds: Some(45),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.cache.default_ttl, Duration::from_secs(45));
}

#[test]
fn cache_defaults() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    let cache = settings.cache;

    assert!(cache.enabled);
    assert_eq!(cache.default_ttl, Duration::from_secs(300));
    assert_eq!(cache.sweep_interval, Duration::from_secs(60));
    assert_eq!(cache.sweep_batch_size, 256);
    assert_eq!(cache.flight_wait_timeout, Duration::from_millis(5_000));
    assert_eq!(cache.max_body_bytes, 1024 * 1024);
    assert!(cache.warm_on_startup);
}

#[test]
fn zero_ttl_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.default_ttl_seconds = Some(0);

    match Settings::from_raw(raw) {
        Err(LoadError::Invalid { key, .. }) => assert_eq!(key, "cache.default_ttl_seconds"),
        other => panic!("expected invalid ttl, got {other:?}"),
    }
}

#[test]
fn zero_sweep_batch_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.sweep_batch_size = Some(0);

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "cache.sweep_batch_size",
            ..
        })
    ));
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
fn cache_can_be_disabled_via_cli() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        cache_enabled: Some(false),
        cache_warm_on_startup: Some(false),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(!settings.cache.enabled);
    assert!(!settings.cache.warm_on_startup);
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["roamly"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "roamly",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--cache-enabled",
        "false",
        "--cache-flight-wait-timeout-ms",
        "250",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.cache_enabled, Some(false));
            assert_eq!(serve.overrides.cache_flight_wait_timeout_ms, Some(250));
        }
    }
}
