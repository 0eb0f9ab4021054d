//! Falsification Tests: Category E - Configuration (F051-F058)
//!
//! # Toyota Way: Poka-Yoke (ポカヨケ)
//! Bad configuration is refused at load time, never discovered at call time.

use std::io::Write;
use std::time::Duration;

use tripwire_core::{BreakerRegistry, ConfigError, RegistryConfig, State, TripPolicy};
use tripwire_test::InjectedFailure;

const CONFIG: &str = r#"
[defaults]
max_requests = 2
interval = "10s"
timeout = "30s"

[[breakers]]
name = "payments"
timeout = "5s"
trip = { kind = "consecutive-failures", threshold = 2 }

[[breakers]]
name = "search"
max_requests = 4
"#;

/// F051: Per-breaker entries override only what they name
///
/// # Falsification Attempt
/// Compare an overridden breaker and a default one from the same file.
#[test]
fn f051_overrides_are_partial() {
    let config = RegistryConfig::from_toml_str(CONFIG).unwrap();
    let registry = BreakerRegistry::from_config(&config).unwrap();

    let payments = registry.get_or_create("payments");
    assert_eq!(payments.timeout(), Duration::from_secs(5));
    assert_eq!(
        payments.max_requests(),
        2,
        "F051 FALSIFIED: Unnamed field not inherited"
    );

    let search = registry.get_or_create("search");
    assert_eq!(search.max_requests(), 4);
    assert_eq!(
        search.timeout(),
        Duration::from_secs(30),
        "F051 FALSIFIED: Default timeout lost"
    );
}

/// F052: The configured trip policy is the one that runs
///
/// # Falsification Attempt
/// Two failures trip `payments` but not an unconfigured breaker.
#[test]
fn f052_trip_policy_applied() {
    let config = RegistryConfig::from_toml_str(CONFIG).unwrap();
    let registry = BreakerRegistry::from_config(&config).unwrap();

    for name in ["payments", "ledger"] {
        let breaker = registry.get_or_create(name);
        for _ in 0..2 {
            let _ = breaker.execute(|| Err::<(), _>(InjectedFailure));
        }
    }
    assert_eq!(
        registry.states(),
        vec![
            ("ledger".to_string(), State::Closed),
            ("payments".to_string(), State::Open),
        ],
        "F052 FALSIFIED: Trip policy not applied per breaker"
    );
}

/// F053: Duplicate names are refused
///
/// # Falsification Attempt
/// Configure `db` twice.
#[test]
fn f053_duplicate_names_refused() {
    let result = RegistryConfig::from_toml_str(
        "[[breakers]]\nname = \"db\"\n\n[[breakers]]\nname = \"db\"\n",
    );
    assert!(
        matches!(result, Err(ConfigError::Invalid(_))),
        "F053 FALSIFIED: Duplicate accepted"
    );
}

/// F054: Out-of-range ratios are refused
///
/// # Falsification Attempt
/// Ratio 0 and ratio above 1.
#[test]
fn f054_bad_ratio_refused() {
    for ratio in ["0.0", "1.01"] {
        let doc = format!(
            "[defaults]\ntrip = {{ kind = \"failure-ratio\", min_requests = 5, ratio = {ratio} }}\n"
        );
        assert!(
            RegistryConfig::from_toml_str(&doc).is_err(),
            "F054 FALSIFIED: Ratio {ratio} accepted"
        );
    }
}

/// F055: Names with whitespace are refused
///
/// # Falsification Attempt
/// A breaker named with a space.
#[test]
fn f055_whitespace_name_refused() {
    let result = RegistryConfig::from_toml_str("[[breakers]]\nname = \"GET /orders\"\n");
    assert!(result.is_err(), "F055 FALSIFIED: Whitespace name accepted");
}

/// F056: Unparseable durations are reported as parse errors
///
/// # Falsification Attempt
/// `timeout = "eventually"`.
#[test]
fn f056_bad_duration_is_parse_error() {
    let result = RegistryConfig::from_toml_str("[defaults]\ntimeout = \"eventually\"\n");
    assert!(
        matches!(result, Err(ConfigError::Parse(_))),
        "F056 FALSIFIED: Bad duration not a parse error"
    );
}

/// F057: Loading from disk matches parsing the same text
///
/// # Falsification Attempt
/// Write the sample to a temp file and load it.
#[test]
fn f057_load_matches_parse() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();

    let loaded = RegistryConfig::load(file.path()).unwrap();
    let parsed = RegistryConfig::from_toml_str(CONFIG).unwrap();
    assert_eq!(loaded, parsed, "F057 FALSIFIED: Load and parse disagree");
}

/// F058: An empty file yields working defaults
///
/// # Falsification Attempt
/// Build a registry from an empty document and check defaults.
#[test]
fn f058_empty_config_defaults() {
    let config = RegistryConfig::from_toml_str("").unwrap();
    assert_eq!(config.defaults.trip, TripPolicy::Default);

    let registry = BreakerRegistry::from_config(&config).unwrap();
    let breaker = registry.get_or_create("anything");
    assert_eq!(breaker.max_requests(), 1);
    assert_eq!(breaker.interval(), Some(Duration::from_secs(60)));
    assert_eq!(
        breaker.timeout(),
        Duration::from_secs(60),
        "F058 FALSIFIED: Defaults not applied"
    );
}
