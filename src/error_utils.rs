use serde_json::Value;

/// Parse a Google API error body and extract clean error information.
/// Falls back to the raw text when the body is not the standard
/// `{"error": {code, status, message}}` shape.
pub fn parse_google_api_error(error_text: &str) -> String {
  if let Ok(error_json) = serde_json::from_str::<Value>(error_text)
    && let Some(error_obj) = error_json.get("error")
  {
    let code = error_obj
      .get("code")
      .and_then(|c| c.as_u64())
      .map(|c| format!("Code: {}", c))
      .unwrap_or_default();

    let status = error_obj
      .get("status")
      .and_then(|s| s.as_str())
      .map(|s| format!("Status: {}", s))
      .unwrap_or_default();

    let message = error_obj
      .get("message")
      .and_then(|m| m.as_str())
      .map(|m| format!("Message: {}", m))
      .unwrap_or_default();

    let parts: Vec<String> = [code, status, message]
      .into_iter()
      .filter(|s| !s.is_empty())
      .collect();

    if !parts.is_empty() {
      return parts.join(" - ");
    }
  }

  error_text.to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extracts_code_status_and_message() {
    let body = r#"{"error":{"code":403,"status":"PERMISSION_DENIED","message":"Not authorized to access this resource"}}"#;
    let parsed = parse_google_api_error(body);
    assert_eq!(
      parsed,
      "Code: 403 - Status: PERMISSION_DENIED - \
       Message: Not authorized to access this resource"
    );
  }

  #[test]
  fn partial_error_object_keeps_present_fields() {
    let body = r#"{"error":{"message":"quota exceeded"}}"#;
    assert_eq!(parse_google_api_error(body), "Message: quota exceeded");
  }

  #[test]
  fn non_json_body_passes_through() {
    assert_eq!(parse_google_api_error("<html>502</html>"), "<html>502</html>");
  }
}
