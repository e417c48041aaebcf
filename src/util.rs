//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings, on a char boundary.
pub fn trunc_for_log(s: &str, max_chars: usize) -> String {
  let count = s.chars().count();
  if count <= max_chars {
    s.to_string()
  } else {
    format!("{}… ({} chars total)", s.chars().take(max_chars).collect::<String>(), count)
  }
}

/// Extract a bearer token from an `Authorization` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
  let rest = header.strip_prefix("Bearer ").or_else(|| header.strip_prefix("bearer "))?;
  let token = rest.trim();
  if token.is_empty() { None } else { Some(token) }
}
