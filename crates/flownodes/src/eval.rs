use flowcore::{lookup_path, NodeError, VarMap};
use serde_json::Value as Json;

/// Expression evaluation used by condition and for-each nodes.
///
/// The engine ships [`PathEvaluator`]; a richer language is plugged in by
/// implementing this trait.
pub trait Evaluator: Send + Sync {
    fn eval(&self, expr: &str, vars: &VarMap) -> Result<Json, NodeError>;

    fn eval_bool(&self, expr: &str, vars: &VarMap) -> Result<bool, NodeError> {
        self.eval(expr, vars).map(|v| truthy(&v))
    }
}

/// JSON truthiness: null, false, 0, "" and empty collections are false.
pub fn truthy(value: &Json) -> bool {
    match value {
        Json::Null => false,
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Json::String(s) => !s.is_empty(),
        Json::Array(items) => !items.is_empty(),
        Json::Object(map) => !map.is_empty(),
    }
}

/// Literals, dotted variable paths and a single `==` / `!=` comparison.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathEvaluator;

impl PathEvaluator {
    fn operand(&self, token: &str, vars: &VarMap) -> Result<Json, NodeError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(NodeError::Evaluation("empty operand".to_string()));
        }
        match token {
            "true" => return Ok(Json::Bool(true)),
            "false" => return Ok(Json::Bool(false)),
            "null" => return Ok(Json::Null),
            _ => {}
        }
        if let Some(text) = quoted(token) {
            return Ok(Json::String(text.to_string()));
        }
        if let Ok(number) = token.parse::<i64>() {
            return Ok(Json::from(number));
        }
        if let Ok(number) = token.parse::<f64>() {
            return Ok(Json::from(number));
        }
        lookup_path(vars, token)
            .cloned()
            .ok_or_else(|| NodeError::MissingVariable(token.to_string()))
    }
}

impl Evaluator for PathEvaluator {
    fn eval(&self, expr: &str, vars: &VarMap) -> Result<Json, NodeError> {
        if let Some((lhs, rhs)) = expr.split_once("!=") {
            let equal = loosely_equal(&self.operand(lhs, vars)?, &self.operand(rhs, vars)?);
            return Ok(Json::Bool(!equal));
        }
        if let Some((lhs, rhs)) = expr.split_once("==") {
            let equal = loosely_equal(&self.operand(lhs, vars)?, &self.operand(rhs, vars)?);
            return Ok(Json::Bool(equal));
        }
        self.operand(expr, vars)
    }
}

fn quoted(token: &str) -> Option<&str> {
    ['"', '\''].into_iter().find_map(|q| {
        token
            .strip_prefix(q)
            .and_then(|rest| rest.strip_suffix(q))
    })
}

/// Numbers compare by value so `200 == 200.0` holds.
fn loosely_equal(a: &Json, b: &Json) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> VarMap {
        VarMap::from([
            ("req".to_string(), json!({"response": {"status": 200, "body": "ok"}})),
            ("flag".to_string(), json!(false)),
        ])
    }

    #[test]
    fn evaluates_paths_and_literals() {
        let ev = PathEvaluator;
        assert_eq!(ev.eval("req.response.status", &vars()).unwrap(), json!(200));
        assert_eq!(ev.eval("'text'", &vars()).unwrap(), json!("text"));
        assert!(!ev.eval_bool("flag", &vars()).unwrap());
        assert!(ev.eval_bool("true", &vars()).unwrap());
    }

    #[test]
    fn evaluates_comparisons() {
        let ev = PathEvaluator;
        assert!(ev.eval_bool("req.response.status == 200", &vars()).unwrap());
        assert!(ev.eval_bool("req.response.body != 'fail'", &vars()).unwrap());
        assert!(!ev.eval_bool("req.response.status == 404", &vars()).unwrap());
    }

    #[test]
    fn missing_variable_is_an_error() {
        let err = PathEvaluator.eval("nope.x", &vars()).unwrap_err();
        assert_eq!(err, NodeError::MissingVariable("nope.x".to_string()));
    }
}
