use crate::AppResult;
use crate::directory::{UserDirectory, UserRecord};
use crate::drive::{StorageQuota, StorageScan};
use crate::sink::RowSink;
use crate::tracer::ContextExt;

use thiserror::Error;
use tracing::{info, warn};

/// Marker for "field not determined".
pub const SENTINEL: i64 = -1;

/// Every processed user lands in exactly one category, decided once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Suspended,
  Error,
  Active,
}

impl Status {
  pub fn as_str(&self) -> &'static str {
    match self {
      Status::Suspended => "SUSPENDED",
      Status::Error => "ERROR",
      Status::Active => "ACTIVE",
    }
  }
}

/// One report line, immutable once built. Metric fields hold real
/// values only on ACTIVE rows whose queries succeeded; everywhere else
/// they carry the sentinel.
#[derive(Debug, Clone)]
pub struct ReportRow {
  pub email: String,
  pub full_name: String,
  pub status: Status,
  pub file_count: i64,
  pub used_storage_mb: i64,
  pub total_storage_mb: i64,
  pub creation_date: String,
}

impl ReportRow {
  fn sentinels(user: &UserRecord, status: Status) -> Self {
    ReportRow {
      email: user.primary_email.clone(),
      full_name: user.full_name().to_string(),
      status,
      file_count: SENTINEL,
      used_storage_mb: SENTINEL,
      total_storage_mb: SENTINEL,
      creation_date: creation_date(&user.creation_time),
    }
  }

  fn active(user: &UserRecord, metrics: &UserMetrics) -> Self {
    let (used_mb, total_mb) = match metrics.quota {
      Some(q) => (q.used_mb, q.total_mb),
      None => (SENTINEL, SENTINEL),
    };
    ReportRow {
      email: user.primary_email.clone(),
      full_name: user.full_name().to_string(),
      status: Status::Active,
      file_count: metrics.file_count as i64,
      used_storage_mb: used_mb,
      total_storage_mb: total_mb,
      creation_date: creation_date(&user.creation_time),
    }
  }

  /// Fields in header order, shared by the console line and the CSV.
  pub fn record(&self) -> [String; 7] {
    [
      self.email.clone(),
      self.full_name.clone(),
      self.status.as_str().to_string(),
      self.file_count.to_string(),
      self.used_storage_mb.to_string(),
      self.total_storage_mb.to_string(),
      self.creation_date.clone(),
    ]
  }
}

// only the date portion of the directory timestamp is reported
fn creation_date(creation_time: &str) -> String {
  creation_time
    .split('T')
    .next()
    .unwrap_or_default()
    .to_string()
}

/// Four mutually exclusive running totals; they sum to the user count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
  pub active_with_files: u64,
  pub active_without_files: u64,
  pub suspended: u64,
  pub errors: u64,
}

impl Summary {
  pub fn total(&self) -> u64 {
    self.active_with_files
      + self.active_without_files
      + self.suspended
      + self.errors
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErroredUser {
  pub email: String,
  pub full_name: String,
}

/// Why one user's row collapsed to ERROR. The two causes are kept
/// apart for the log; both get the same sentinel treatment.
#[derive(Debug, Error)]
pub enum UserError {
  #[error("could not authorize as {email}")]
  Authorize { email: String },
  #[error("could not list files for {email}")]
  ListFiles { email: String },
}

#[derive(Debug, Clone)]
pub struct UserMetrics {
  pub file_count: u64,
  pub quota: Option<StorageQuota>,
}

pub struct RunReport {
  pub rows: Vec<ReportRow>,
  pub summary: Summary,
  pub errored: Vec<ErroredUser>,
}

/// Per-user step: fresh session, file probe, then best-effort quota.
/// Quota failure deliberately does not fail the step; file-probe
/// failure does, because the file count is the report's primary signal.
async fn scan_user<S: StorageScan>(
  storage: &S,
  user: &UserRecord,
) -> Result<UserMetrics, UserError> {
  let email = &user.primary_email;

  let session = match storage.authorize_as(email).await {
    Ok(session) => session,
    Err(e) => {
      warn!(user = %email, error = %e, "Authorization failed");
      return Err(UserError::Authorize { email: email.clone() });
    }
  };

  let file_count = match storage.count_files(&session).await {
    Ok(count) => count,
    Err(e) => {
      warn!(user = %email, error = %e, "File probe failed");
      return Err(UserError::ListFiles { email: email.clone() });
    }
  };

  let quota = match storage.quota(&session).await {
    Ok(q) => Some(q),
    Err(e) => {
      warn!(user = %email, error = %e, "Quota fetch failed, keeping sentinels");
      None
    }
  };

  Ok(UserMetrics { file_count, quota })
}

/// Drives the whole report: one fatal listing, then a sequential pass
/// over every user in server order, emitting each row to `sink` as it
/// is built and buffering it for the CSV pass.
pub async fn run_report<D, S, K>(
  directory: &D,
  storage: &S,
  sink: &mut K,
) -> AppResult<RunReport>
where
  D: UserDirectory,
  S: StorageScan,
  K: RowSink,
{
  info!("RETRIEVING USERS...");
  let users = directory
    .list_users()
    .await
    .cwl("Unable to retrieve the domain users")?;
  info!("Retrieved {} users in the domain", users.len());

  info!("RETRIEVING FILES OF EACH USER...");

  let mut rows = Vec::with_capacity(users.len());
  let mut summary = Summary::default();
  let mut errored = Vec::new();

  for user in &users {
    let row = if user.suspended {
      summary.suspended += 1;
      ReportRow::sentinels(user, Status::Suspended)
    } else {
      match scan_user(storage, user).await {
        Ok(metrics) => {
          if metrics.file_count > 0 {
            summary.active_with_files += 1;
          } else {
            summary.active_without_files += 1;
          }
          ReportRow::active(user, &metrics)
        }
        Err(user_error) => {
          warn!(error = %user_error, "Marking user as errored");
          summary.errors += 1;
          errored.push(ErroredUser {
            email: user.primary_email.clone(),
            full_name: user.full_name().to_string(),
          });
          ReportRow::sentinels(user, Status::Error)
        }
      }
    };

    sink.write_row(&row);
    rows.push(row);
  }

  Ok(RunReport {
    rows,
    summary,
    errored,
  })
}
