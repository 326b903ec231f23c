use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

const SECRET_ENV: &str = "LEDGER_GATEWAY_JWT_SECRET";

fn cli() -> Command {
    let mut cmd = Command::new(cargo_bin!("ledger-gateway"));
    cmd.env_remove(SECRET_ENV).env("RUST_LOG", "error");
    cmd
}

#[test]
fn test_check_config_with_defaults() -> Result<(), Box<dyn std::error::Error>> {
    cli()
        .args(["--check-config", "--jwt-secret", "s3cret"])
        .assert()
        .success()
        .stdout(predicate::str::contains("configuration ok"))
        .stdout(predicate::str::contains("listen: 0.0.0.0:8080"))
        .stdout(predicate::str::contains("rate limit: 100/s burst 200"));
    Ok(())
}

#[test]
fn test_secret_from_environment() -> Result<(), Box<dyn std::error::Error>> {
    cli()
        .env(SECRET_ENV, "from-env")
        .arg("--check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("signing keys: cli"));
    Ok(())
}

#[test]
fn test_missing_secret_fails() -> Result<(), Box<dyn std::error::Error>> {
    cli()
        .arg("--check-config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no signing key configured"));
    Ok(())
}

#[test]
fn test_config_file_and_overrides() -> Result<(), Box<dyn std::error::Error>> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        r#"
[server]
listen = "127.0.0.1:9100"

[[auth.signing_keys]]
kid = "2024-06"
secret = "file-secret"

[circuit_breaker]
failure_threshold = 2
open_timeout_secs = 10
"#
    )?;

    cli()
        .arg("--config")
        .arg(file.path())
        .arg("--check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("listen: 127.0.0.1:9100"))
        .stdout(predicate::str::contains("signing keys: 2024-06"))
        .stdout(predicate::str::contains("threshold 2 cooldown 10s"));

    cli()
        .arg("--config")
        .arg(file.path())
        .args(["--listen", "127.0.0.1:9200", "--jwt-secret", "rotated"])
        .arg("--check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("listen: 127.0.0.1:9200"))
        .stdout(predicate::str::contains("signing keys: cli, 2024-06"));
    Ok(())
}

#[test]
fn test_invalid_config_file_fails() -> Result<(), Box<dyn std::error::Error>> {
    cli()
        .args(["--config", "does/not/exist.toml", "--check-config"])
        .assert()
        .failure();

    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "[rate_limit]\nrequests_per_second = 0")?;
    cli()
        .arg("--config")
        .arg(file.path())
        .args(["--jwt-secret", "s3cret", "--check-config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("requests_per_second cannot be 0"));
    Ok(())
}
