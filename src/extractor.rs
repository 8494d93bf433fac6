//! Locate the first complete JSON object embedded in free text
//!
//! Model replies wrap the object in prose or fenced code blocks. The scan
//! counts brace depth while tracking string and escape state, so braces in
//! string values do not move the balance.

/// Return the first brace-balanced object literal in `text`, or `None`.
///
/// A `{` that never closes is skipped and the scan resumes at the next `{`.
pub fn extract_object(text: &str) -> Option<&str> {
    let mut from = 0;
    while let Some(offset) = text[from..].find('{') {
        let start = from + offset;
        if let Some(end) = balanced_end(&text[start..]) {
            return Some(&text[start..start + end]);
        }
        from = start + 1;
    }
    None
}

/// Byte length of the balanced object at the head of `s` (which starts with `{`)
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested(depth: usize) -> String {
        let mut obj = r#"{"leaf": 1}"#.to_string();
        for level in 0..depth {
            obj = format!(r#"{{"level{}": {}, "n": [1, 2]}}"#, level, obj);
        }
        obj
    }

    #[test]
    fn test_extracts_nested_objects_unmodified() {
        for depth in 0..=5 {
            let obj = nested(depth);
            let text = format!("Sure! Here it is:\n{}\nLet me know.", obj);
            assert_eq!(extract_object(&text), Some(obj.as_str()), "depth {}", depth);
        }
    }

    #[test]
    fn test_no_brace_is_not_found() {
        assert_eq!(extract_object("I cannot draw that chart."), None);
        assert_eq!(extract_object(""), None);
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let obj = r#"{"title": "Sales {by} region }", "mark": "bar"}"#;
        let text = format!("prefix {} suffix }}", obj);
        assert_eq!(extract_object(&text), Some(obj));
    }

    #[test]
    fn test_escaped_quotes_inside_strings() {
        let obj = r#"{"title": "a \"quoted\" } brace", "mark": "line"}"#;
        assert_eq!(extract_object(obj), Some(obj));
    }

    #[test]
    fn test_fenced_code_block() {
        let text = "```json\n{\"mark\": \"arc\", \"encoding\": {\"theta\": {\"field\": \"v\"}}}\n```";
        let got = extract_object(text).unwrap();
        assert!(got.starts_with('{') && got.ends_with('}'));
        assert!(serde_json::from_str::<serde_json::Value>(got).is_ok());
    }

    #[test]
    fn test_unclosed_brace_falls_through_to_next_object() {
        let text = r#"use { carefully. {"mark": "bar"}"#;
        // the first `{` never closes, the inner object does
        assert_eq!(extract_object(text), Some(r#"{"mark": "bar"}"#));

        let text = r#"stray } then {"mark": "bar"} and {"mark": "line"}"#;
        assert_eq!(extract_object(text), Some(r#"{"mark": "bar"}"#));
    }

    #[test]
    fn test_multibyte_text_around_object() {
        let text = "Voilà, ₹ chart: {\"title\": \"Ventes ₹\"} ✓";
        assert_eq!(extract_object(text), Some("{\"title\": \"Ventes ₹\"}"));
    }
}
