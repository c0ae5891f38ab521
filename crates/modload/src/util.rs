use crate::modconfig::BlockType;
use hcl::{Expression, Traversal, TraversalOperator};

/// A resource named by a traversal such as `query.q1.sql` or `my_mod.var.region`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NamedReference {
    pub block_type: BlockType,
    pub short_name: String,
    /// `<mod>.<namespace>.<short name>`
    pub full_name: String,
}

pub(crate) trait TraversalExt {
    /// The leading attribute path: `a.b[0].c` yields `[a, b]`
    fn get_longest_path(&self) -> Vec<String>;

    /// The resource this traversal points at, if its root names a resource namespace
    fn named_reference(&self, mod_name: &str) -> Option<NamedReference>;
}

impl TraversalExt for Traversal {
    fn get_longest_path(&self) -> Vec<String> {
        let Expression::Variable(var) = &self.expr else {
            return vec![];
        };

        let mut path = vec![var.as_str().to_string()];
        for operator in &self.operators {
            let TraversalOperator::GetAttr(ident) = operator else {
                break;
            };

            path.push(ident.as_str().to_string());
        }

        path
    }

    fn named_reference(&self, mod_name: &str) -> Option<NamedReference> {
        let path = self.get_longest_path();
        let path = match path.first() {
            Some(root) if root == mod_name && BlockType::from_namespace(root).is_none() => {
                &path[1..]
            }
            _ => &path[..],
        };

        let [namespace, short_name, ..] = path else {
            return None;
        };
        let block_type = BlockType::from_namespace(namespace)?;
        Some(NamedReference {
            block_type,
            short_name: short_name.clone(),
            full_name: format!("{mod_name}.{namespace}.{short_name}"),
        })
    }
}

/// Qualifies a resource name written as `<type>.<name>` or `<mod>.<type>.<name>`
pub(crate) fn qualify_name(mod_name: &str, name: &str) -> Option<NamedReference> {
    let parts: Vec<&str> = name.split('.').collect();
    let (namespace, short_name) = match parts.as_slice() {
        [namespace, short_name] => (*namespace, *short_name),
        [m, namespace, short_name] if *m == mod_name => (*namespace, *short_name),
        _ => return None,
    };
    let block_type = BlockType::from_namespace(namespace)?;
    Some(NamedReference {
        block_type,
        short_name: short_name.to_string(),
        full_name: format!("{mod_name}.{}.{short_name}", block_type.namespace()),
    })
}

pub(crate) const BAD_IDENTIFIER_DETAIL: &str = "A name must start with a letter or underscore and may contain only letters, digits, underscores, and dashes.";

/// Legal resource names start with a letter or underscore, followed by letters, digits, underscores and dashes
pub(crate) fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn traversal(expr: &str) -> Traversal {
        let expr: hcl_edit::expr::Expression = expr.parse().unwrap();
        match Expression::from(expr) {
            Expression::Traversal(traversal) => *traversal,
            other => panic!("not a traversal: {other:?}"),
        }
    }

    #[test]
    fn longest_path_stops_at_index() {
        assert_eq!(
            traversal("query.q1.args[0].name").get_longest_path(),
            vec!["query", "q1", "args"]
        );
    }

    #[test]
    fn named_references() {
        assert_eq!(
            traversal("control.c1.title").named_reference("m"),
            Some(NamedReference {
                block_type: BlockType::Control,
                short_name: "c1".to_string(),
                full_name: "m.control.c1".to_string(),
            })
        );
        assert_eq!(
            traversal("m.var.region").named_reference("m").map(|r| r.full_name),
            Some("m.var.region".to_string())
        );
        assert_eq!(traversal("each.value").named_reference("m"), None);
    }

    #[test]
    fn qualified_names() {
        assert_eq!(
            qualify_name("m", "control.c1").map(|r| r.full_name),
            Some("m.control.c1".to_string())
        );
        assert_eq!(
            qualify_name("m", "m.benchmark.b1").map(|r| r.block_type),
            Some(BlockType::Benchmark)
        );
        assert_eq!(qualify_name("m", "other.control.c1"), None);
        assert_eq!(qualify_name("m", "c1"), None);
    }

    #[test]
    fn identifiers() {
        assert!(is_valid_identifier("_a-b1"));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("a.b"));
        assert!(!is_valid_identifier(""));
    }
}
