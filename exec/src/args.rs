//! Argument normalization (§4.6 "Argument normalization"): the wire-level
//! `RawArgs` (absent / bare string / loosely-typed JSON list) becomes a
//! `Vec<String>` suitable for `sys.argv[1:]` inside the REPL or a shell-quoted
//! tail for a one-shot command.

use cellbox_protocol::http::RawArgs;

pub fn normalize(args: Option<RawArgs>) -> Vec<String> {
    match args {
        None => Vec::new(),
        Some(RawArgs::Single(s)) => {
            if s.trim().is_empty() {
                Vec::new()
            } else {
                vec![s]
            }
        }
        Some(RawArgs::List(values)) => values
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::String(s) if !s.is_empty() => Some(s),
                serde_json::Value::String(_) => None,
                serde_json::Value::Null => None,
                other => {
                    let s = value_to_string(&other);
                    if s.is_empty() {
                        None
                    } else {
                        Some(s)
                    }
                }
            })
            .collect(),
    }
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Shell-quotes a normalized argument list for appending to a one-shot
/// command line (§4.6: "appended (shell-quoted) to the command for non-REPL
/// one-shot executions").
pub fn shell_quote_tail(args: &[String]) -> String {
    args.iter().map(|a| shlex::try_quote(a).unwrap_or_default().into_owned()).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_args_normalize_to_empty() {
        assert_eq!(normalize(None), Vec::<String>::new());
    }

    #[test]
    fn whitespace_only_string_normalizes_to_empty() {
        assert_eq!(normalize(Some(RawArgs::Single("   ".to_string()))), Vec::<String>::new());
    }

    #[test]
    fn bare_string_becomes_single_element_list() {
        assert_eq!(normalize(Some(RawArgs::Single("hello".to_string()))), vec!["hello".to_string()]);
    }

    #[test]
    fn list_keeps_only_non_empty_string_convertible_elements() {
        let values = vec![
            serde_json::json!("a"),
            serde_json::json!(""),
            serde_json::json!(null),
            serde_json::json!(42),
            serde_json::json!(true),
        ];
        let normalized = normalize(Some(RawArgs::List(values)));
        assert_eq!(normalized, vec!["a".to_string(), "42".to_string(), "true".to_string()]);
    }

    #[test]
    fn shell_quote_tail_joins_with_spaces() {
        let args = vec!["a b".to_string(), "c".to_string()];
        let quoted = shell_quote_tail(&args);
        assert!(quoted.contains("c"));
        assert!(quoted.contains("a b"));
    }
}
