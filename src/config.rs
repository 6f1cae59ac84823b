use crate::AppResult;

use anyhow::bail;
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use tracing::warn;

/// Run configuration, loaded from the environment once at startup and
/// passed explicitly to the components that need it.
#[derive(Debug, Clone)]
pub struct Config {
  /// Path to the service-account JSON key file.
  pub key_path: PathBuf,
  /// Admin identity impersonated for the directory listing.
  pub admin_email: String,
  /// Organization domain whose users are enumerated.
  pub domain: String,
  /// Optional directory query filter; `None` means every user.
  pub user_query: Option<String>,
  /// Directory the CSV report is written into.
  pub report_dir: PathBuf,
}

impl Config {
  pub fn from_env() -> AppResult<Self> {
    dotenv().ok();

    let key_path = PathBuf::from(require_var("SERVICE_ACCOUNT_KEY")?);
    let admin_email = require_var("ADMIN_EMAIL")?;
    let domain = require_var("DOMAIN")?;

    let user_query = env::var("USER_QUERY").ok().filter(|q| !q.is_empty());

    let report_dir = match env::var("REPORT_DIR") {
      Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
      _ => {
        warn!("REPORT_DIR not set, writing the report to '.'");
        PathBuf::from(".")
      }
    };

    let config = Config {
      key_path,
      admin_email,
      domain,
      user_query,
      report_dir,
    };
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> AppResult<()> {
    if !self.key_path.is_file() {
      bail!(
        "SERVICE_ACCOUNT_KEY does not point to a file: {}",
        self.key_path.display()
      );
    }
    validate_email("ADMIN_EMAIL", &self.admin_email)?;
    validate_domain("DOMAIN", &self.domain)?;
    Ok(())
  }
}

fn require_var(name: &str) -> AppResult<String> {
  match env::var(name) {
    Ok(value) if !value.is_empty() => Ok(value),
    _ => bail!("Required environment variable {} is not set", name),
  }
}

fn validate_email(name: &str, value: &str) -> AppResult<()> {
  if !value.contains('@') || !value.contains('.') {
    bail!("{} does not look like an email address: {}", name, value);
  }
  Ok(())
}

fn validate_domain(name: &str, value: &str) -> AppResult<()> {
  if value.contains('@') || !value.contains('.') {
    bail!("{} does not look like a domain: {}", name, value);
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn config_with_key(key_path: PathBuf) -> Config {
    Config {
      key_path,
      admin_email: "admin@example.com".to_string(),
      domain: "example.com".to_string(),
      user_query: None,
      report_dir: PathBuf::from("."),
    }
  }

  #[test]
  fn valid_config_passes_validation() {
    let mut key = tempfile::NamedTempFile::new().unwrap();
    key.write_all(b"{}").unwrap();
    let config = config_with_key(key.path().to_path_buf());
    assert!(config.validate().is_ok());
  }

  #[test]
  fn missing_key_file_fails_validation() {
    let config = config_with_key(PathBuf::from("/no/such/key.json"));
    assert!(config.validate().is_err());
  }

  #[test]
  fn admin_email_must_look_like_an_email() {
    let mut key = tempfile::NamedTempFile::new().unwrap();
    key.write_all(b"{}").unwrap();
    let mut config = config_with_key(key.path().to_path_buf());
    config.admin_email = "example.com".to_string();
    assert!(config.validate().is_err());
  }

  #[test]
  fn domain_must_not_contain_an_at_sign() {
    let mut key = tempfile::NamedTempFile::new().unwrap();
    key.write_all(b"{}").unwrap();
    let mut config = config_with_key(key.path().to_path_buf());
    config.domain = "admin@example.com".to_string();
    assert!(config.validate().is_err());
  }
}
