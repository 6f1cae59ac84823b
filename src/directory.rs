use crate::AppResult;
use crate::apis::{Ep, list_all};
use crate::goauth::UserSession;
use crate::limiters::DIRECTORY_LIMITER;
use crate::tracer::ContextExt;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

/// One directory account, as returned by the users listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
  pub primary_email: String,
  #[serde(default)]
  pub name: UserName,
  #[serde(default)]
  pub suspended: bool,
  #[serde(default)]
  pub creation_time: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserName {
  #[serde(default)]
  pub full_name: String,
}

impl UserRecord {
  pub fn full_name(&self) -> &str {
    &self.name.full_name
  }
}

fn parse_user(item: Value) -> Option<UserRecord> {
  match serde_json::from_value::<UserRecord>(item) {
    Ok(user) => Some(user),
    Err(e) => {
      warn!(error = %e, "Skipping directory item that is not a user record");
      None
    }
  }
}

/// Seam between the accumulator and the directory service.
#[allow(async_fn_in_trait)]
pub trait UserDirectory {
  async fn list_users(&self) -> AppResult<Vec<UserRecord>>;
}

/// Directory API backed by the admin session. The session is obtained
/// once and only ever used for the single initial listing.
pub struct GoogleDirectory {
  admin_session: UserSession,
  domain: String,
  query: Option<String>,
}

impl GoogleDirectory {
  pub fn new(
    admin_session: UserSession,
    domain: String,
    query: Option<String>,
  ) -> Self {
    Self {
      admin_session,
      domain,
      query,
    }
  }
}

impl UserDirectory for GoogleDirectory {
  async fn list_users(&self) -> AppResult<Vec<UserRecord>> {
    list_domain_users(&self.admin_session, &self.domain, self.query.as_deref())
      .await
  }
}

/// Lists every user of `domain` matching the optional `query`, in the
/// server's ascending order. Failure here is fatal to the run.
pub async fn list_domain_users(
  admin_session: &UserSession,
  domain: &str,
  query: Option<&str>,
) -> AppResult<Vec<UserRecord>> {
  let mut qrys = json!({
    "domain": domain,
    "maxResults": "500",
    "orderBy": "email",
    "sortOrder": "ASCENDING",
  });
  if let Some(q) = query {
    qrys["query"] = json!(q);
  }

  let items = list_all(Ep::Users, &admin_session.bearer, &qrys, &DIRECTORY_LIMITER)
    .await
    .cwl("Unable to retrieve the domain users")?;

  debug!("Directory listing returned {} raw items", items.len());

  Ok(items.into_iter().filter_map(parse_user).collect())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_a_full_user_record() {
    let item = json!({
      "primaryEmail": "ada@example.com",
      "name": {"fullName": "Ada Lovelace"},
      "suspended": false,
      "creationTime": "2020-01-01T10:15:30.000Z"
    });
    let user = parse_user(item).unwrap();
    assert_eq!(user.primary_email, "ada@example.com");
    assert_eq!(user.full_name(), "Ada Lovelace");
    assert!(!user.suspended);
    assert_eq!(user.creation_time, "2020-01-01T10:15:30.000Z");
  }

  #[test]
  fn missing_optional_fields_use_defaults() {
    let item = json!({"primaryEmail": "bare@example.com"});
    let user = parse_user(item).unwrap();
    assert_eq!(user.primary_email, "bare@example.com");
    assert_eq!(user.full_name(), "");
    assert!(!user.suspended);
  }

  #[test]
  fn item_without_an_email_is_skipped() {
    let item = json!({"name": {"fullName": "No Email"}});
    assert!(parse_user(item).is_none());
  }
}
