//! Pull the payload out of a model reply
//!
//! Models wrap answers in markdown fences or add prose around them. These
//! helpers never fail: when no payload is recognisable the trimmed text comes
//! back unchanged and validation reports what is wrong with it.

/// The outermost `{ ... }` span of a reply, with code fences removed
pub fn extract_json(text: &str) -> String {
    let mut stripped = text.trim();
    if stripped.starts_with("```") {
        stripped = stripped.trim_matches('`').trim();
        if stripped.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("json")) {
            stripped = stripped[4..].trim();
        }
    }
    match (stripped.find('{'), stripped.rfind('}')) {
        (Some(start), Some(end)) if end > start => stripped[start..=end].to_string(),
        _ => stripped.to_string(),
    }
}

/// Source code of a reply, with the opening fence line and closing fences removed
pub fn extract_javascript(text: &str) -> String {
    let stripped = text.trim();
    if !stripped.starts_with("```") {
        return stripped.to_string();
    }
    let mut lines: Vec<&str> = stripped.lines().skip(1).collect();
    while lines.last().is_some_and(|line| line.trim().starts_with("```")) {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        assert_eq!(extract_json("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_fenced() {
        assert_eq!(extract_json("```json\n{\"a\": {\"b\": 2}}\n```"), "{\"a\": {\"b\": 2}}");
        assert_eq!(extract_json("```JSON\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_with_prose() {
        assert_eq!(extract_json("Here is the plan: {\"a\": 1} hope it helps"), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_without_object_returns_text() {
        assert_eq!(extract_json("  no json here "), "no json here");
        assert_eq!(extract_json("} backwards {"), "} backwards {");
    }

    #[test]
    fn test_extract_javascript_fenced() {
        let reply = "```javascript\nfunction a() {}\nconst b = 1;\n```\n```";
        assert_eq!(extract_javascript(reply), "function a() {}\nconst b = 1;");
    }

    #[test]
    fn test_extract_javascript_plain() {
        assert_eq!(extract_javascript("\n  const x = 1;\n"), "const x = 1;");
    }
}
