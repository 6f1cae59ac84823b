use crate::AppResult;
use crate::apis::{Ep, req_build};
use crate::error_utils::parse_google_api_error;
use crate::goauth::{DRIVE_SCOPES, Gcredentials, UserSession, authorize_as};
use crate::limiters::DRIVE_LIMITER;
use crate::tracer::ContextExt;

use anyhow::bail;
use serde_json::{Value, json};
use tracing::{debug, error};

/// How many files to ask for when probing a user's Drive. The count of
/// the first page is the report's metric, not the full inventory.
pub const FILE_PROBE_PAGE_SIZE: u32 = 10;

const BYTES_PER_MB: i64 = 1_048_576;

/// Used/total quota in whole MiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageQuota {
  pub used_mb: i64,
  pub total_mb: i64,
}

/// Seam between the accumulator and the Drive API, so the report loop
/// can run against fakes in tests.
#[allow(async_fn_in_trait)]
pub trait StorageScan {
  /// Fresh delegated session for one target user. Sessions are never
  /// reused across users.
  async fn authorize_as(&self, email: &str) -> AppResult<UserSession>;
  /// Number of items on the first probe page (0 is a valid answer).
  async fn count_files(&self, session: &UserSession) -> AppResult<u64>;
  /// Quota snapshot; failure degrades the row, never errors it.
  async fn quota(&self, session: &UserSession) -> AppResult<StorageQuota>;
}

pub struct GoogleDrive {
  creds: Gcredentials,
}

impl GoogleDrive {
  pub fn new(creds: Gcredentials) -> Self {
    Self { creds }
  }
}

impl StorageScan for GoogleDrive {
  async fn authorize_as(&self, email: &str) -> AppResult<UserSession> {
    authorize_as(&self.creds, email, &DRIVE_SCOPES).await
  }

  async fn count_files(&self, session: &UserSession) -> AppResult<u64> {
    let query = json!({
      "pageSize": FILE_PROBE_PAGE_SIZE,
      "fields": "files(id)",
    });

    let au_build = req_build(
      "GET",
      Ep::Files.base_url(),
      Some(&session.bearer),
      Some(&query),
    )
    .cwl("Failed to build the file probe request")?;

    DRIVE_LIMITER.until_ready().await;

    let res = au_build
      .send()
      .await
      .cwl("Failed to send the file probe request")?;

    match res.status().as_u16() {
      200..=299 => {
        let rfin: Value =
          res.json().await.cwl("Failed to parse the file probe response")?;
        let count = rfin
          .get("files")
          .and_then(|f| f.as_array())
          .map(|arr| arr.len() as u64)
          .unwrap_or(0);
        debug!(subject = %session.subject, count, "File probe complete");
        Ok(count)
      }
      status => {
        let error_text = res
          .text()
          .await
          .unwrap_or_else(|_| "Unknown error".to_string());
        let clean_error = parse_google_api_error(&error_text);
        error!(
          subject = %session.subject,
          status = %status,
          error_body = %clean_error,
          "File probe failed"
        );
        bail!("File probe failed with status {}: {}", status, clean_error)
      }
    }
  }

  async fn quota(&self, session: &UserSession) -> AppResult<StorageQuota> {
    let query = json!({"fields": "storageQuota"});

    let au_build = req_build(
      "GET",
      Ep::About.base_url(),
      Some(&session.bearer),
      Some(&query),
    )
    .cwl("Failed to build the quota request")?;

    DRIVE_LIMITER.until_ready().await;

    let res =
      au_build.send().await.cwl("Failed to send the quota request")?;

    match res.status().as_u16() {
      200..=299 => {
        let rfin: Value =
          res.json().await.cwl("Failed to parse the quota response")?;
        parse_quota(&rfin)
      }
      status => {
        let error_text = res
          .text()
          .await
          .unwrap_or_else(|_| "Unknown error".to_string());
        let clean_error = parse_google_api_error(&error_text);
        debug!(
          subject = %session.subject,
          status = %status,
          error_body = %clean_error,
          "Quota fetch failed"
        );
        bail!("Quota fetch failed with status {}: {}", status, clean_error)
      }
    }
  }
}

/// Both fields come from the one `about.get` response. Accounts with
/// unlimited storage carry no `limit` field; that counts as a failed
/// fetch so the row keeps both storage sentinels.
fn parse_quota(body: &Value) -> AppResult<StorageQuota> {
  let quota = body
    .get("storageQuota")
    .cwl("Quota response is missing the storageQuota object")?;

  let used_bytes = quota_field(quota, "usage")?;
  let total_bytes = quota_field(quota, "limit")?;

  Ok(StorageQuota {
    used_mb: used_bytes / BYTES_PER_MB,
    total_mb: total_bytes / BYTES_PER_MB,
  })
}

// the Drive API serializes these 64-bit counters as decimal strings
fn quota_field(quota: &Value, key: &str) -> AppResult<i64> {
  let raw = quota
    .get(key)
    .and_then(|v| v.as_str())
    .cwl(&format!("Quota response is missing the '{key}' field"))?;

  let bytes: i64 = raw
    .parse()
    .cwl(&format!("Quota field '{key}' is not a number: {raw}"))?;

  if bytes < 0 {
    bail!("Quota field '{}' is negative: {}", key, bytes);
  }
  Ok(bytes)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_used_and_total_from_one_response() {
    let body = json!({
      "storageQuota": {
        "limit": "107374182400",
        "usage": "22548578304",
        "usageInDrive": "22548578304"
      }
    });
    let quota = parse_quota(&body).unwrap();
    assert_eq!(quota.used_mb, 21504);
    assert_eq!(quota.total_mb, 102400);
  }

  #[test]
  fn missing_limit_fails_the_fetch() {
    // unlimited-storage accounts omit the limit field
    let body = json!({"storageQuota": {"usage": "1048576"}});
    assert!(parse_quota(&body).is_err());
  }

  #[test]
  fn missing_storage_quota_object_fails_the_fetch() {
    let body = json!({"kind": "drive#about"});
    assert!(parse_quota(&body).is_err());
  }

  #[test]
  fn non_numeric_usage_fails_the_fetch() {
    let body =
      json!({"storageQuota": {"usage": "lots", "limit": "1048576"}});
    assert!(parse_quota(&body).is_err());
  }

  #[test]
  fn sub_megabyte_usage_rounds_down_to_zero() {
    let body = json!({"storageQuota": {"usage": "1023", "limit": "1048576"}});
    let quota = parse_quota(&body).unwrap();
    assert_eq!(quota.used_mb, 0);
    assert_eq!(quota.total_mb, 1);
  }
}
