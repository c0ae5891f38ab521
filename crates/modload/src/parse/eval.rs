//! Expression evaluation against the resources decoded so far
//!
//! A block is evaluated against a snapshot [hcl::eval::Context] built from the [SymbolTable]. References to
//! names that do not exist (yet) are not errors: they come back as [UnresolvedSymbol]s so the caller can defer
//! the block until the referenced resource has been decoded.
use crate::modconfig::BlockType;
use crate::util::TraversalExt;
use crate::visit::VisitTraversals;
use hcl::eval::{ErrorKind, Evaluate};
use hcl::{Expression, Traversal};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// The three ways a reference can fail to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnresolvedKind {
    /// the root symbol is not known at all (`foo.bar`, or `query.x` before any query exists)
    UnknownVariable,
    /// the object exists but the attribute is not populated (`query.x` where other queries exist)
    UnsupportedAttribute,
    /// a map lookup failed (`var.x`, `local.x`)
    MissingMapElement,
}

impl Display for UnresolvedKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            UnresolvedKind::UnknownVariable => "Unknown variable",
            UnresolvedKind::UnsupportedAttribute => "Unsupported attribute",
            UnresolvedKind::MissingMapElement => "Missing map element",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnresolvedSymbol {
    /// fully-qualified name when the reference names a resource, the raw symbol otherwise
    pub name: String,
    pub kind: UnresolvedKind,
}

impl Display for UnresolvedSymbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.name)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum EvalError {
    #[error("unresolved references: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    Unresolved(Vec<UnresolvedSymbol>),
    #[error(transparent)]
    Invalid(#[from] hcl::eval::Error),
}

/// Values of every resource decoded so far, grouped by namespace
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    mod_name: String,
    namespaces: BTreeMap<&'static str, hcl::value::Map<String, hcl::Value>>,
}

impl SymbolTable {
    pub fn new(mod_name: &str) -> Self {
        Self {
            mod_name: mod_name.to_string(),
            namespaces: BTreeMap::new(),
        }
    }

    pub fn mod_name(&self) -> &str {
        &self.mod_name
    }

    pub(crate) fn set_mod_name(&mut self, mod_name: &str) {
        self.mod_name = mod_name.to_string();
    }

    pub fn insert(&mut self, block_type: BlockType, short_name: &str, value: hcl::Value) {
        self.namespaces
            .entry(block_type.namespace())
            .or_default()
            .insert(short_name.to_string(), value);
    }

    pub fn contains(&self, block_type: BlockType, short_name: &str) -> bool {
        self.namespaces
            .get(block_type.namespace())
            .is_some_and(|names| names.contains_key(short_name))
    }

    pub fn get(&self, block_type: BlockType, short_name: &str) -> Option<&hcl::Value> {
        self.namespaces.get(block_type.namespace())?.get(short_name)
    }

    pub fn has_namespace(&self, block_type: BlockType) -> bool {
        self.namespaces.contains_key(block_type.namespace())
    }

    /// Snapshot of the table for evaluating one block
    pub fn eval_context(&self) -> hcl::eval::Context<'static> {
        let mut ctx = hcl::eval::Context::new();
        let mut by_mod = hcl::value::Map::new();
        for (namespace, names) in &self.namespaces {
            ctx.declare_var(
                hcl::Identifier::unchecked(*namespace),
                hcl::Value::Object(names.clone()),
            );
            by_mod.insert(namespace.to_string(), hcl::Value::Object(names.clone()));
        }
        if BlockType::from_namespace(&self.mod_name).is_none() {
            ctx.declare_var(
                hcl::Identifier::unchecked(self.mod_name.as_str()),
                hcl::Value::Object(by_mod),
            );
        }
        ctx
    }

    /// Names referenced by `expr` that are not in the table
    pub fn unresolved(&self, expr: &Expression) -> Vec<UnresolvedSymbol> {
        let mut unresolved = vec![];
        expr.visit_traversals(&mut |traversal: &Traversal| {
            let Some(reference) = traversal.named_reference(&self.mod_name) else {
                return;
            };
            if self.contains(reference.block_type, &reference.short_name) {
                return;
            }
            let kind = match reference.block_type {
                _ if !self.has_namespace(reference.block_type) => UnresolvedKind::UnknownVariable,
                BlockType::Variable | BlockType::Locals => UnresolvedKind::MissingMapElement,
                _ => UnresolvedKind::UnsupportedAttribute,
            };
            let symbol = UnresolvedSymbol {
                name: reference.full_name,
                kind,
            };
            if !unresolved.contains(&symbol) {
                unresolved.push(symbol);
            }
        });
        unresolved
    }

    /// Evaluates `expr`
    ///
    /// Fails with [EvalError::Unresolved] if `expr` references a name not in the table, or if evaluation
    /// fails on an undefined variable or a missing key.
    pub fn evaluate(
        &self,
        expr: &Expression,
        ctx: &hcl::eval::Context,
    ) -> Result<hcl::Value, EvalError> {
        let unresolved = self.unresolved(expr);
        if !unresolved.is_empty() {
            return Err(EvalError::Unresolved(unresolved));
        }

        expr.evaluate(ctx).map_err(|err| {
            let symbol = match err.kind() {
                ErrorKind::UndefinedVar(var) => UnresolvedSymbol {
                    name: var.to_string(),
                    kind: UnresolvedKind::UnknownVariable,
                },
                ErrorKind::NoSuchKey(key) => UnresolvedSymbol {
                    name: key.to_string(),
                    kind: UnresolvedKind::UnsupportedAttribute,
                },
                _ => return EvalError::Invalid(err),
            };
            tracing::trace!(%symbol, "evaluation hit unresolved symbol");
            EvalError::Unresolved(vec![symbol])
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn expr(s: &str) -> Expression {
        let expr: hcl_edit::expr::Expression = s.parse().unwrap();
        expr.into()
    }

    fn table() -> SymbolTable {
        let mut table = SymbolTable::new("m");
        table.insert(BlockType::Variable, "region", "us-east-1".into());
        let mut query = hcl::value::Map::new();
        query.insert("sql".to_string(), hcl::Value::from("select 1"));
        table.insert(BlockType::Query, "q1", hcl::Value::Object(query));
        table
    }

    #[test]
    fn evaluates_known_references() {
        let table = table();
        let ctx = table.eval_context();
        assert_eq!(
            table.evaluate(&expr(r#""${var.region}-x""#), &ctx).unwrap(),
            hcl::Value::from("us-east-1-x")
        );
        assert_eq!(
            table.evaluate(&expr("m.query.q1.sql"), &ctx).unwrap(),
            hcl::Value::from("select 1")
        );
    }

    #[test]
    fn classifies_unresolved_references() {
        let table = table();
        let ctx = table.eval_context();
        let Err(EvalError::Unresolved(symbols)) =
            table.evaluate(&expr("[control.c1, query.q2, var.other, query.q1]"), &ctx)
        else {
            panic!("expected unresolved symbols");
        };

        assert_eq!(
            symbols,
            vec![
                UnresolvedSymbol {
                    name: "m.control.c1".to_string(),
                    kind: UnresolvedKind::UnknownVariable
                },
                UnresolvedSymbol {
                    name: "m.query.q2".to_string(),
                    kind: UnresolvedKind::UnsupportedAttribute
                },
                UnresolvedSymbol {
                    name: "m.var.other".to_string(),
                    kind: UnresolvedKind::MissingMapElement
                },
            ]
        );
    }

    #[test]
    fn unknown_roots_are_unresolved() {
        let table = table();
        let ctx = table.eval_context();
        let Err(EvalError::Unresolved(symbols)) = table.evaluate(&expr("foo.bar"), &ctx) else {
            panic!("expected unresolved symbols");
        };
        assert_eq!(symbols[0].kind, UnresolvedKind::UnknownVariable);
        assert_eq!(symbols[0].name, "foo");
    }
}
