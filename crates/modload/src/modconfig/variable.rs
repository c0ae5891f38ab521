use super::diff::{DiffBuilder, ResourceDiff};
use super::{BlockType, HclResource, ResourceMetadata};
use crate::diagnostics::SourceRange;
use hcl::eval::Evaluate;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

/// Type constraint of a variable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VarType {
    String,
    Number,
    Bool,
    #[default]
    Any,
    List(Box<VarType>),
    Set(Box<VarType>),
    Map(Box<VarType>),
}

impl FromStr for VarType {
    type Err = String;

    /// Parses type expressions such as `string` or `map(list(number))`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let collection = |prefix: &str| -> Option<&str> {
            s.strip_prefix(prefix)?
                .strip_prefix('(')?
                .strip_suffix(')')
        };

        Ok(match s.as_str() {
            "string" => VarType::String,
            "number" => VarType::Number,
            "bool" => VarType::Bool,
            "any" => VarType::Any,
            "list" => VarType::List(Box::new(VarType::Any)),
            "set" => VarType::Set(Box::new(VarType::Any)),
            "map" => VarType::Map(Box::new(VarType::Any)),
            _ => {
                if let Some(inner) = collection("list") {
                    VarType::List(Box::new(inner.parse()?))
                } else if let Some(inner) = collection("set") {
                    VarType::Set(Box::new(inner.parse()?))
                } else if let Some(inner) = collection("map") {
                    VarType::Map(Box::new(inner.parse()?))
                } else {
                    return Err(format!("unsupported type constraint '{s}'"));
                }
            }
        })
    }
}

impl Display for VarType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VarType::String => f.write_str("string"),
            VarType::Number => f.write_str("number"),
            VarType::Bool => f.write_str("bool"),
            VarType::Any => f.write_str("any"),
            VarType::List(inner) => write!(f, "list({inner})"),
            VarType::Set(inner) => write!(f, "set({inner})"),
            VarType::Map(inner) => write!(f, "map({inner})"),
        }
    }
}

impl Serialize for VarType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl VarType {
    /// Converts `value` to this type, following the usual primitive conversions
    pub fn convert(&self, value: hcl::Value) -> Result<hcl::Value, String> {
        use hcl::Value;

        match (self, value) {
            (VarType::Any, value) => Ok(value),
            (_, Value::Null) => Ok(Value::Null),

            (VarType::String, Value::String(s)) => Ok(Value::String(s)),
            (VarType::String, Value::Number(n)) => Ok(Value::String(n.to_string())),
            (VarType::String, Value::Bool(b)) => Ok(Value::String(b.to_string())),

            (VarType::Number, Value::Number(n)) => Ok(Value::Number(n)),
            (VarType::Number, Value::String(s)) => parse_number(&s)
                .map(Value::Number)
                .ok_or_else(|| format!("a number is required, got '{s}'")),

            (VarType::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
            (VarType::Bool, Value::String(s)) => match s.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(format!("a bool is required, got '{s}'")),
            },

            (VarType::List(inner), Value::Array(items)) => items
                .into_iter()
                .map(|item| inner.convert(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (VarType::Set(inner), Value::Array(items)) => {
                let mut set: Vec<Value> = vec![];
                for item in items {
                    let item = inner.convert(item)?;
                    if !set.contains(&item) {
                        set.push(item);
                    }
                }
                Ok(Value::Array(set))
            }
            (VarType::Map(inner), Value::Object(map)) => {
                let mut converted = hcl::value::Map::new();
                for (key, item) in map {
                    converted.insert(key, inner.convert(item)?);
                }
                Ok(Value::Object(converted))
            }

            (ty, value) => Err(format!("{ty} required, got {}", type_name(&value))),
        }
    }
}

fn parse_number(s: &str) -> Option<hcl::Number> {
    if let Ok(int) = s.parse::<i64>() {
        return Some(int.into());
    }
    s.parse::<f64>().ok().and_then(hcl::Number::from_f64)
}

fn type_name(value: &hcl::Value) -> &'static str {
    match value {
        hcl::Value::Null => "null",
        hcl::Value::Bool(_) => "bool",
        hcl::Value::Number(_) => "number",
        hcl::Value::String(_) => "string",
        hcl::Value::Array(_) => "list",
        hcl::Value::Object(_) => "object",
    }
}

/// How raw input values (cli, files) are interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsingMode {
    /// the raw text is the value
    Literal,
    /// the raw text is an expression
    #[default]
    Hcl,
}

impl ParsingMode {
    pub fn for_type(var_type: &VarType) -> Self {
        match var_type {
            VarType::String => ParsingMode::Literal,
            _ => ParsingMode::Hcl,
        }
    }

    pub fn parse(&self, raw: &str) -> Result<hcl::Value, String> {
        match self {
            ParsingMode::Literal => Ok(hcl::Value::String(raw.to_string())),
            ParsingMode::Hcl => {
                let expr: hcl_edit::expr::Expression =
                    raw.parse().map_err(|e| format!("invalid expression: {e}"))?;
                hcl::Expression::from(expr)
                    .evaluate(&hcl::eval::Context::new())
                    .map_err(|e| e.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    Default,
    Cli,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawValue {
    /// text from the command line, interpreted according to the variable's [ParsingMode]
    Text(String),
    /// an evaluated value, e.g. from a variables file
    Value(hcl::Value),
}

/// A value supplied for a variable from outside the mod
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputValue {
    pub value: RawValue,
    pub source: ValueSource,
}

impl InputValue {
    pub fn text(text: impl Into<String>, source: ValueSource) -> Self {
        Self {
            value: RawValue::Text(text.into()),
            source,
        }
    }

    pub fn value(value: impl Into<hcl::Value>, source: ValueSource) -> Self {
        Self {
            value: RawValue::Value(value.into()),
            source,
        }
    }

    pub fn resolve(&self, mode: ParsingMode) -> Result<hcl::Value, String> {
        match &self.value {
            RawValue::Text(text) => mode.parse(text),
            RawValue::Value(value) => Ok(value.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Variable {
    pub short_name: String,
    pub full_name: String,

    pub description: Option<String>,
    pub default: Option<hcl::Value>,
    #[serde(rename = "type")]
    pub var_type: VarType,
    pub parsing_mode: ParsingMode,

    /// resolved value: the input value if one was given, else the default
    pub value: Option<hcl::Value>,
    pub value_source: Option<ValueSource>,

    #[serde(skip)]
    pub decl_range: SourceRange,
    pub metadata: Option<ResourceMetadata>,
}

impl Variable {
    pub fn new(mod_name: &str, short_name: &str, decl_range: SourceRange) -> Self {
        Self {
            short_name: short_name.to_string(),
            full_name: format!("{mod_name}.var.{short_name}"),
            decl_range,
            ..Default::default()
        }
    }

    /// A variable without default must be given a value
    pub fn required(&self) -> bool {
        self.default.is_none()
    }

    pub fn set_input_value(&mut self, value: hcl::Value, source: ValueSource) {
        self.value = Some(value);
        self.value_source = Some(source);
    }

    pub fn diff(&self, other: &Variable) -> ResourceDiff {
        DiffBuilder::new(&self.full_name, BlockType::Variable)
            .check("description", &self.description, &other.description)
            .check("default", &self.default, &other.default)
            .check("type", &self.var_type, &other.var_type)
            .check("value", &self.value, &other.value)
            .build()
    }
}

impl HclResource for Variable {
    fn name(&self) -> &str {
        &self.full_name
    }

    fn short_name(&self) -> &str {
        &self.short_name
    }

    fn block_type(&self) -> BlockType {
        BlockType::Variable
    }

    fn decl_range(&self) -> &SourceRange {
        &self.decl_range
    }

    fn metadata(&self) -> Option<&ResourceMetadata> {
        self.metadata.as_ref()
    }

    fn set_metadata(&mut self, metadata: ResourceMetadata) {
        self.metadata = Some(metadata);
    }

    /// `var.<name>` evaluates to the value itself
    fn to_value(&self) -> hcl::Value {
        self.value
            .clone()
            .or_else(|| self.default.clone())
            .unwrap_or(hcl::Value::Null)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_type_constraints() {
        assert_eq!("string".parse::<VarType>(), Ok(VarType::String));
        assert_eq!(
            "map( list(number) )".parse::<VarType>(),
            Ok(VarType::Map(Box::new(VarType::List(Box::new(VarType::Number)))))
        );
        assert!("tuple([string])".parse::<VarType>().is_err());
        assert_eq!(
            VarType::Set(Box::new(VarType::Bool)).to_string(),
            "set(bool)"
        );
    }

    #[test]
    fn convert_primitives() {
        assert_eq!(
            VarType::Number.convert(hcl::Value::from("42")),
            Ok(hcl::Value::from(42))
        );
        assert_eq!(
            VarType::String.convert(hcl::Value::from(true)),
            Ok(hcl::Value::from("true"))
        );
        assert!(VarType::Bool.convert(hcl::Value::from("yes")).is_err());
    }

    #[test]
    fn sets_drop_duplicates() {
        let value = hcl::Value::Array(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(
            VarType::Set(Box::new(VarType::String)).convert(value),
            Ok(hcl::Value::Array(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn parsing_modes() {
        assert_eq!(
            ParsingMode::Literal.parse("[1, 2]"),
            Ok(hcl::Value::from("[1, 2]"))
        );
        assert_eq!(
            ParsingMode::Hcl.parse("[1, 2]"),
            Ok(hcl::Value::Array(vec![1.into(), 2.into()]))
        );
    }
}
