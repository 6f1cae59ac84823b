use crate::AppResult;
use crate::error_utils::parse_google_api_error;
use crate::limiters::DirectLimiter;
use crate::tracer::ContextExt;

use anyhow::bail;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{debug, error};

/// Google REST collections used by the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ep {
  Users,
  Files,
  About,
}

impl Ep {
  pub fn base_url(&self) -> &'static str {
    match self {
      Ep::Users => "https://admin.googleapis.com/admin/directory/v1/users",
      Ep::Files => "https://www.googleapis.com/drive/v3/files",
      Ep::About => "https://www.googleapis.com/drive/v3/about",
    }
  }

  /// JSON key under which a listing response carries its items.
  pub fn res_obs(&self) -> &'static str {
    match self {
      Ep::Users => "users",
      Ep::Files => "files",
      Ep::About => "",
    }
  }
}

pub static CL: LazyLock<Client> = LazyLock::new(|| {
  Client::builder()
    .tcp_keepalive(std::time::Duration::from_secs(60))
    .tcp_nodelay(true)
    .timeout(std::time::Duration::from_secs(45))
    .build()
    .expect("Failed to create HTTP client")
});

pub fn req_build(
  method_str: &str,
  url: &str,
  bearer: Option<&str>,
  base_query_params: Option<&Value>,
) -> AppResult<RequestBuilder> {
  let method = match method_str.to_uppercase().as_str() {
    "GET" => Method::GET,
    "POST" => Method::POST,
    _ => {
      error!("Unsupported HTTP method string: {}", method_str);
      bail!("Unsupported HTTP method string");
    }
  };

  let mut builder = CL.request(method, url);

  if let Some(token) = bearer {
    builder = builder.header("Authorization", token);
  }

  if let Some(params) = base_query_params {
    let obj = params
      .as_object()
      .cwl("Query parameters must be a JSON object")?;

    let query_pairs: Vec<(String, String)> = obj
      .iter()
      .map(|(k, v)| {
        let value_str = match v {
          Value::String(s) => s.clone(),
          other => other.to_string(),
        };
        (k.clone(), value_str)
      })
      .collect();

    builder = builder.query(&query_pairs);
  }

  Ok(builder)
}

/// One page of a listing response.
#[derive(Debug, Default)]
pub struct Page {
  pub items: Vec<Value>,
  pub next: Option<String>,
}

/// Extracts the item array under `key` (absent array means an empty
/// page) and the continuation token.
pub fn parse_page(body: &Value, key: &str) -> Page {
  let items = body
    .get(key)
    .and_then(|v| v.as_array())
    .cloned()
    .unwrap_or_default();

  let next = body
    .get("nextPageToken")
    .and_then(|t| t.as_str())
    .map(String::from);

  Page { items, next }
}

/// Generic pagination driver: calls `fetch` with the advancing cursor
/// until a page comes back with an absent or empty token. The filter is
/// the caller's business and stays constant inside `fetch`. Any page
/// failure aborts the whole listing; the partial result is discarded.
pub async fn collect_pages<F>(mut fetch: F) -> AppResult<Vec<Value>>
where
  F: AsyncFnMut(Option<String>) -> AppResult<Page>,
{
  let mut all_records = Vec::new();
  let mut cursor: Option<String> = None;

  loop {
    let page = fetch(cursor.take()).await?;

    debug!("Listing page returned {} records", page.items.len());
    all_records.extend(page.items);

    match page.next {
      Some(tok) if !tok.is_empty() => cursor = Some(tok),
      _ => break,
    }
  }

  Ok(all_records)
}

/// Fetches every item of `ep` matching `base_query`, following
/// `nextPageToken` until the server stops returning one. Requests are
/// paced through `limiter` and authorized with `bearer`.
pub async fn list_all(
  ep: Ep,
  bearer: &str,
  base_query: &Value,
  limiter: &DirectLimiter,
) -> AppResult<Vec<Value>> {
  let url = ep.base_url();

  collect_pages(async |cursor: Option<String>| {
    let mut query_params = base_query.clone();
    if let Some(ref token) = cursor {
      query_params["pageToken"] = Value::String(token.clone());
    }

    debug!("Making API request to URL: {}", url);

    let au_build = req_build("GET", url, Some(bearer), Some(&query_params))
      .cwl("Could not build the listing request")?;

    limiter.until_ready().await;

    let res = au_build
      .send()
      .await
      .cwl("Failed to send HTTP request to Google API")?;

    match res.status().as_u16() {
      200..=299 => {
        let rfin: Value =
          res.json().await.cwl("Failed to parse listing response")?;
        Ok(parse_page(&rfin, ep.res_obs()))
      }
      status => {
        let error_text = res
          .text()
          .await
          .unwrap_or_else(|_| "Unknown error".to_string());
        let clean_error = parse_google_api_error(&error_text);
        error!(
          url = %url,
          status = %status,
          error_body = %clean_error,
          "Google API listing request failed"
        );
        bail!("Listing request failed with status {}: {}", status, clean_error)
      }
    }
  })
  .await
}
