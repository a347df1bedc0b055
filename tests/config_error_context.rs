//! Tests for config error context preservation
//!
//! Verifies that configuration loading errors keep the original
//! std::io::Error and toml::de::Error reachable through `source()`.

use rigchat::config::Config;
use rigchat::error::AppError;
use std::error::Error;
use std::str::FromStr;

#[test]
fn test_config_file_read_error_preserves_io_error() {
    let result = Config::from_file("/nonexistent/path/to/config.toml");
    let err = result.expect_err("Reading nonexistent file should fail");

    assert!(matches!(err, AppError::ConfigFileRead { .. }));
    assert!(
        err.to_string().contains("/nonexistent/path/to/config.toml"),
        "Error should include the file path, got: {}",
        err
    );

    let source = err.source().expect("Should have source error");
    let io_err = source
        .downcast_ref::<std::io::Error>()
        .expect("Source error should be io::Error");
    assert_eq!(io_err.kind(), std::io::ErrorKind::NotFound);
}

#[test]
fn test_config_parse_error_preserves_toml_error() {
    let invalid_toml = r#"
this is [[[[ not valid toml
it has {{{{ broken syntax
"#;

    let err = Config::from_str(invalid_toml).expect_err("Parsing invalid TOML should fail");

    assert!(matches!(err, AppError::ConfigParseFailed { .. }));
    let source = err.source().expect("Should have source error");
    assert!(
        source.is::<toml::de::Error>(),
        "Source error should be toml::de::Error, got: {:?}",
        source
    );
}

#[test]
fn test_unknown_enum_value_is_a_parse_error() {
    let err = Config::from_str(
        r#"
[security]
classification = "MAGENTA"
"#,
    )
    .expect_err("unknown classification should fail");

    assert!(matches!(err, AppError::ConfigParseFailed { .. }));
}

#[test]
fn test_streaming_limits_checked_while_parsing() {
    // batch_size and max_fps go through a validating TryFrom, so the error
    // surfaces from the TOML parser with the field's location
    for toml in [
        "[streaming]\nbatch_size = 0\n",
        "[streaming]\nbatch_size = 1001\n",
        "[streaming]\nmax_fps = 0\n",
        "[streaming]\nmax_fps = 61\n",
    ] {
        let err = Config::from_str(toml).expect_err(toml);
        assert!(
            matches!(err, AppError::ConfigParseFailed { .. }),
            "{} should fail to parse, got {:?}",
            toml,
            err
        );
    }
}

#[test]
fn test_validation_error_names_the_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[local]\nurl = \"localhost:11434\"\n").unwrap();

    let err = Config::from_file(&path).expect_err("scheme-less URL should be rejected");
    match err {
        AppError::ConfigValidationFailed { path: p, reason } => {
            assert!(p.ends_with("bad.toml"));
            assert!(reason.contains("local.url"), "got: {}", reason);
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
}
