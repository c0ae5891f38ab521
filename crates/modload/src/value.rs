//! conversion of evaluated values into Postgres literals
//!
//! Parameter defaults and query arguments are handed to the database as SQL text. The canonical form is
//! - string: single quoted, embedded quotes doubled (`'it''s'`)
//! - number: as written (`42`, `1.5`)
//! - bool: `true` / `false`
//! - null: `null`
//! - list/object: a quoted JSON document cast to `jsonb` (`'["a",1]'::jsonb`)
use crate::modconfig::QueryArgs;
use std::collections::BTreeMap;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("value cannot be represented as JSON: {0}")]
    Json(String),
    #[error("'args' must be either a map or a list, got {0}")]
    InvalidArgs(&'static str),
}

/// Converts `value` into a Postgres literal
pub fn to_postgres_literal(value: &hcl::Value) -> Result<String, ValueError> {
    Ok(match value {
        hcl::Value::Null => "null".to_string(),
        hcl::Value::Bool(b) => b.to_string(),
        hcl::Value::Number(n) => n.to_string(),
        hcl::Value::String(s) => quote(s),
        hcl::Value::Array(_) | hcl::Value::Object(_) => {
            let json =
                serde_json::to_string(value).map_err(|e| ValueError::Json(e.to_string()))?;
            format!("{}::jsonb", quote(&json))
        }
    })
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Converts the value of an `args` attribute
pub fn to_query_args(value: &hcl::Value) -> Result<QueryArgs, ValueError> {
    match value {
        hcl::Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), to_postgres_literal(v)?)))
            .collect::<Result<BTreeMap<_, _>, ValueError>>()
            .map(QueryArgs::Named),
        hcl::Value::Array(items) => items
            .iter()
            .map(to_postgres_literal)
            .collect::<Result<Vec<_>, _>>()
            .map(QueryArgs::Positional),
        hcl::Value::Null => Err(ValueError::InvalidArgs("null")),
        hcl::Value::Bool(_) => Err(ValueError::InvalidArgs("bool")),
        hcl::Value::Number(_) => Err(ValueError::InvalidArgs("number")),
        hcl::Value::String(_) => Err(ValueError::InvalidArgs("string")),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scalars() {
        assert_eq!(to_postgres_literal(&"it's".into()).unwrap(), "'it''s'");
        assert_eq!(to_postgres_literal(&42.into()).unwrap(), "42");
        assert_eq!(to_postgres_literal(&false.into()).unwrap(), "false");
        assert_eq!(to_postgres_literal(&hcl::Value::Null).unwrap(), "null");
    }

    #[test]
    fn collections_become_jsonb() {
        let value = hcl::Value::Array(vec!["a".into(), 1.into()]);
        assert_eq!(to_postgres_literal(&value).unwrap(), r#"'["a",1]'::jsonb"#);
    }

    #[test]
    fn args_from_map_and_list() {
        let mut map = hcl::value::Map::new();
        map.insert("region".to_string(), hcl::Value::from("us-east-1"));
        assert_eq!(
            to_query_args(&hcl::Value::Object(map)).unwrap(),
            QueryArgs::Named(BTreeMap::from([(
                "region".to_string(),
                "'us-east-1'".to_string()
            )]))
        );
        assert_eq!(
            to_query_args(&hcl::Value::Array(vec![true.into()])).unwrap(),
            QueryArgs::Positional(vec!["true".to_string()])
        );
        assert_eq!(
            to_query_args(&"x".into()),
            Err(ValueError::InvalidArgs("string"))
        );
    }
}
