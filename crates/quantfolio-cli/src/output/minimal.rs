use serde_json::Value;

use super::{payload, render_cell};

/// Headline figure per command, in priority order.
const HEADLINE_KEYS: [&str; 10] = [
    "sharpe_ratio",
    "implied_volatility",
    "historical_var",
    "parametric_var",
    "max_drawdown",
    "worst_scenario",
    "final_value",
    "volatility",
    "expected_return",
    "max_return",
];

/// Print only the headline answer.
///
/// Arrays print one headline per element, so `compare` and `option-chain`
/// stay line-oriented.
pub fn print_minimal(value: &Value) {
    match payload(value) {
        Value::Array(items) => {
            for item in items {
                println!("{}", headline(item));
            }
        }
        other => println!("{}", headline(other)),
    }
}

fn headline(value: &Value) -> String {
    let Value::Object(map) = value else {
        return render_cell(value, "null");
    };
    if let Some(val) = HEADLINE_KEYS
        .iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_null())
    {
        return render_cell(val, "null");
    }
    // Option contracts are identified by their premium
    if let Some(premium) = map.get("premium") {
        return render_cell(premium, "null");
    }
    match map.iter().next() {
        Some((key, val)) => format!("{key}: {}", render_cell(val, "null")),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_headline_prefers_sharpe() {
        let v = json!({"volatility": 0.1, "sharpe_ratio": {"status": "defined", "value": 0.8}});
        assert_eq!(headline(&v), "0.8");
    }

    #[test]
    fn test_headline_skips_null_and_falls_back() {
        let v = json!({"historical_var": null, "parametric_var": 0.02});
        assert_eq!(headline(&v), "0.02");
        let v = json!({"observations": 12});
        assert_eq!(headline(&v), "observations: 12");
    }
}
