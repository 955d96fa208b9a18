//! Pure extraction strategies and payload selection.
//!
//! Each strategy is a plain `fn(&str) -> Option<Value>` with no state, so the
//! extractor can walk them in a fixed order and stop at the first hit.

use std::collections::HashSet;

use serde_json::{Map, Value};

use switchboard_types::extraction::SchemaHints;

const FENCE: &str = "```";

/// Key used when an array is wrapped under the root field and the hints
/// name no array field.
const DEFAULT_ARRAY_KEY: &str = "actions";

/// Signature shared by every strategy.
pub type Strategy = fn(&str) -> Option<Value>;

fn parse(candidate: &str) -> Option<Value> {
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// First fenced code block (```` ```json ```` or bare ```` ``` ````) whose
/// interior parses as JSON.
pub fn fenced_block(text: &str) -> Option<Value> {
    let mut rest = text;
    while let Some(open) = rest.find(FENCE) {
        let after = &rest[open + FENCE.len()..];
        let body = match after.find('\n') {
            Some(newline) if is_info_string(&after[..newline]) => &after[newline + 1..],
            _ => after,
        };
        let close = body.find(FENCE)?;

        if let Some(value) = parse(&body[..close]) {
            return Some(value);
        }
        rest = &body[close + FENCE.len()..];
    }
    None
}

fn is_info_string(line: &str) -> bool {
    line.trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Span from the first `{` to the last `}`.
pub fn brace_span(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    parse(&text[start..=end])
}

/// First balanced `{…}` or `[…]` span anywhere in the text that parses.
///
/// Bracket depth is tracked while respecting JSON string literals
/// (including escapes), so `{"msg": "use { and ] freely"}` is one span.
pub fn balanced_rescan(text: &str) -> Option<Value> {
    // Openers left open by a failed scan fail the same way from their own
    // position, so they are never scanned again.
    let mut dead: HashSet<usize> = HashSet::new();

    for (start, ch) in text.char_indices() {
        if !matches!(ch, '{' | '[') || dead.contains(&start) {
            continue;
        }
        match balanced_span(&text[start..]) {
            Ok(span) => {
                if let Some(value) = parse(span) {
                    return Some(value);
                }
            }
            Err(open) => dead.extend(open.into_iter().map(|offset| start + offset)),
        }
    }
    None
}

/// The balanced span opening at the start of `text`, or the offsets of the
/// openers (outside string literals) still open when the scan gave up.
fn balanced_span(text: &str) -> Result<&str, Vec<usize>> {
    let mut open: Vec<(char, usize)> = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for (idx, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => open.push(('}', idx)),
            '[' if !in_string => open.push((']', idx)),
            '}' | ']' if !in_string => {
                if open.last().map(|(closer, _)| *closer) != Some(ch) {
                    break;
                }
                open.pop();
                if open.is_empty() {
                    return Ok(&text[..=idx]);
                }
            }
            _ => {}
        }
    }

    Err(open.into_iter().map(|(_, idx)| idx).collect())
}

/// Choose the payload out of a parsed value.
///
/// Returns `None` for scalars so the next strategy gets a chance. Objects and
/// arrays are always accepted; when `hints` name a root field the result is
/// normalised to `{root: …}` wherever a match is found.
pub fn select_payload(value: Value, hints: &SchemaHints) -> Option<Value> {
    let Some(root) = hints.root_field.as_deref() else {
        return matches!(value, Value::Object(_) | Value::Array(_)).then_some(value);
    };

    match value {
        Value::Object(fields) => Some(select_from_object(fields, root, hints)),
        Value::Array(items) => Some(wrap_array(root, hints, items)),
        _ => None,
    }
}

fn select_from_object(mut fields: Map<String, Value>, root: &str, hints: &SchemaHints) -> Value {
    if fields.contains_key(root) {
        return Value::Object(fields);
    }

    let synonym = std::iter::once(root)
        .chain(hints.synonyms.iter().map(String::as_str))
        .find_map(|name| find_key(&fields, name));
    if let Some(key) = synonym
        && let Some(payload) = fields.remove(&key)
    {
        tracing::debug!(found = %key, expected = root, "Payload found under synonym");
        return single_field(root, payload);
    }

    let array_key = hints
        .array_fields
        .iter()
        .find_map(|name| find_key(&fields, name))
        .filter(|key| fields.get(key).is_some_and(Value::is_array))
        .or_else(|| {
            fields
                .iter()
                .find(|(_, v)| v.is_array())
                .map(|(k, _)| k.clone())
        });
    if let Some(key) = array_key
        && let Some(Value::Array(items)) = fields.remove(&key)
    {
        tracing::debug!(found = %key, expected = root, "Array adopted as payload");
        return wrap_array(root, hints, items);
    }

    Value::Object(fields)
}

/// Case-insensitive key lookup returning the key as stored.
fn find_key(fields: &Map<String, Value>, name: &str) -> Option<String> {
    fields
        .keys()
        .find(|key| key.eq_ignore_ascii_case(name))
        .cloned()
}

fn wrap_array(root: &str, hints: &SchemaHints, items: Vec<Value>) -> Value {
    let key = hints
        .array_fields
        .first()
        .map(String::as_str)
        .unwrap_or(DEFAULT_ARRAY_KEY);
    let mut inner = Map::new();
    inner.insert(key.to_string(), Value::Array(items));
    single_field(root, Value::Object(inner))
}

fn single_field(name: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(name.to_string(), value);
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fenced_json_block() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nthanks";
        assert_eq!(fenced_block(text), Some(json!({"a": 1})));
    }

    #[test]
    fn test_bare_fence_and_inline_fence() {
        assert_eq!(fenced_block("```\n[1, 2]\n```"), Some(json!([1, 2])));
        assert_eq!(fenced_block("```{\"b\": true}```"), Some(json!({"b": true})));
    }

    #[test]
    fn test_skips_unparseable_fence() {
        let text = "```text\nnot json\n```\n```json\n{\"ok\": 1}\n```";
        assert_eq!(fenced_block(text), Some(json!({"ok": 1})));
        assert_eq!(fenced_block("```json\n{\"open\": "), None);
    }

    #[test]
    fn test_brace_span() {
        let text = "Sure! {\"x\": {\"y\": 2}} Let me know.";
        assert_eq!(brace_span(text), Some(json!({"x": {"y": 2}})));
        assert_eq!(brace_span("} backwards {"), None);
    }

    #[test]
    fn test_brace_span_fails_on_two_objects() {
        assert_eq!(brace_span("{\"a\":1} and {\"b\":2}"), None);
    }

    #[test]
    fn test_rescan_finds_first_balanced_span() {
        let text = "{\"a\":1} and {\"b\":2}";
        assert_eq!(balanced_rescan(text), Some(json!({"a": 1})));
    }

    #[test]
    fn test_rescan_is_string_aware() {
        let text = r#"note: {"msg": "use { and ] freely", "n": [1, {"k": "\"q\""}]} trailing }"#;
        assert_eq!(
            balanced_rescan(text),
            Some(json!({"msg": "use { and ] freely", "n": [1, {"k": "\"q\""}]}))
        );
    }

    #[test]
    fn test_rescan_skips_broken_prefix() {
        let text = "{broken [ {\"fine\": [1]}";
        assert_eq!(balanced_rescan(text), Some(json!({"fine": [1]})));
    }

    #[test]
    fn test_rescan_after_many_unclosed_openers() {
        let text = format!("{}{{\"ok\": true}}", "{".repeat(50_000));
        assert_eq!(balanced_rescan(&text), Some(json!({"ok": true})));

        let text = format!("{} }} [1, 2]", "[".repeat(50_000));
        assert_eq!(balanced_rescan(&text), Some(json!([1, 2])));

        assert_eq!(balanced_rescan(&"{[".repeat(50_000)), None);
    }

    #[test]
    fn test_select_without_hints_rejects_scalars() {
        let hints = SchemaHints::any();
        assert_eq!(select_payload(json!("text"), &hints), None);
        assert_eq!(select_payload(json!({"k": 1}), &hints), Some(json!({"k": 1})));
        assert_eq!(select_payload(json!([1]), &hints), Some(json!([1])));
    }

    #[test]
    fn test_select_root_field_kept() {
        let hints = SchemaHints::action_plan();
        let value = json!({"actionPlan": {"actions": []}, "note": "x"});
        assert_eq!(select_payload(value.clone(), &hints), Some(value));
    }

    #[test]
    fn test_select_synonym_case_insensitive() {
        let hints = SchemaHints::action_plan();
        let value = json!({"Action_Plan": {"actions": [1]}});
        assert_eq!(
            select_payload(value, &hints),
            Some(json!({"actionPlan": {"actions": [1]}}))
        );
        let value = json!({"ACTIONPLAN": {"actions": [2]}});
        assert_eq!(
            select_payload(value, &hints),
            Some(json!({"actionPlan": {"actions": [2]}}))
        );
    }

    #[test]
    fn test_select_hinted_array_wrapped() {
        let hints = SchemaHints::action_plan();
        let value = json!({"Steps": [{"name": "a"}], "other": [9]});
        assert_eq!(
            select_payload(value, &hints),
            Some(json!({"actionPlan": {"actions": [{"name": "a"}]}}))
        );
    }

    #[test]
    fn test_select_any_array_adopted() {
        let hints = SchemaHints::action_plan();
        let value = json!({"summary": "x", "calls": [{"name": "a"}]});
        assert_eq!(
            select_payload(value, &hints),
            Some(json!({"actionPlan": {"actions": [{"name": "a"}]}}))
        );
    }

    #[test]
    fn test_select_top_level_array_wrapped() {
        let hints = SchemaHints::action_plan();
        assert_eq!(
            select_payload(json!([{"name": "a"}]), &hints),
            Some(json!({"actionPlan": {"actions": [{"name": "a"}]}}))
        );
    }

    #[test]
    fn test_select_unmatched_object_accepted() {
        let hints = SchemaHints::action_plan();
        let value = json!({"summary": "nothing to do"});
        assert_eq!(select_payload(value.clone(), &hints), Some(value));
        assert_eq!(select_payload(json!(42), &hints), None);
    }
}
