//! Probing helpers for the response shapes returned by the Responses and
//! Chat Completions endpoints.

use gptcli_core::llm::Usage;
use serde_json::Value;

fn first_u64(obj: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_u64))
}

/// Reads token usage from a response body or a stream completion event.
/// Both `response.usage` and top-level `usage` are probed.
pub fn extract_usage(v: &Value) -> Option<Usage> {
    let usage = v
        .get("response")
        .and_then(|r| r.get("usage"))
        .filter(|u| u.is_object())
        .or_else(|| v.get("usage").filter(|u| u.is_object()))?;
    let input = first_u64(usage, &["input_tokens", "prompt_tokens"]).unwrap_or(0);
    let output = first_u64(usage, &["output_tokens", "completion_tokens"]).unwrap_or(0);
    let total = first_u64(usage, &["total_tokens"]);
    Some(Usage::new(input, output, total))
}

/// Reply text from either API shape; empty when nothing matches.
pub fn extract_output_text(v: &Value) -> String {
    let v = match v.get("response") {
        Some(r) if r.is_object() && v.get("output").is_none() => r,
        _ => v,
    };
    match v.get("output_text") {
        Some(Value::String(s)) if !s.is_empty() => return s.clone(),
        Some(Value::Array(parts)) => {
            let joined: String = parts.iter().filter_map(Value::as_str).collect();
            if !joined.is_empty() {
                return joined;
            }
        }
        _ => {}
    }
    if let Some(items) = v.get("output").and_then(Value::as_array) {
        let mut out = String::new();
        for item in items {
            let Some(parts) = item.get("content").and_then(Value::as_array) else {
                continue;
            };
            for part in parts {
                if let Some(t) = part.get("text").and_then(Value::as_str) {
                    out.push_str(t);
                }
            }
        }
        if !out.is_empty() {
            return out;
        }
    }
    v["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn usage_from_responses_shape() {
        let v = json!({"usage": {"input_tokens": 100, "output_tokens": 200, "total_tokens": 300}});
        assert_eq!(extract_usage(&v), Some(Usage::new(100, 200, Some(300))));
    }

    #[test]
    fn usage_from_chat_shape_with_missing_total() {
        let v = json!({"usage": {"prompt_tokens": 7, "completion_tokens": 5}});
        let u = extract_usage(&v).unwrap();
        assert_eq!((u.input_tokens, u.output_tokens, u.total_tokens), (7, 5, 12));
    }

    #[test]
    fn usage_nested_in_completion_event() {
        let v = json!({
            "type": "response.completed",
            "response": {"usage": {"input_tokens": 1, "output_tokens": 2}}
        });
        assert_eq!(extract_usage(&v).unwrap().total_tokens, 3);
        assert_eq!(extract_usage(&json!({"usage": null})), None);
        assert_eq!(extract_usage(&json!({})), None);
    }

    #[test]
    fn text_probes_each_shape() {
        assert_eq!(extract_output_text(&json!({"output_text": "hi"})), "hi");
        assert_eq!(extract_output_text(&json!({"output_text": ["a", "b"]})), "ab");
        let v = json!({"output": [
            {"type": "reasoning", "summary": []},
            {"type": "message", "content": [
                {"type": "output_text", "text": "Hello, "},
                {"type": "output_text", "text": "world"}
            ]}
        ]});
        assert_eq!(extract_output_text(&v), "Hello, world");
        let v = json!({"choices": [{"message": {"role": "assistant", "content": "yo"}}]});
        assert_eq!(extract_output_text(&v), "yo");
        assert_eq!(extract_output_text(&json!({"unexpected": true})), "");
    }
}
