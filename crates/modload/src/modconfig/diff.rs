use super::BlockType;
use serde::Serialize;

/// Changes between two versions of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceDiff {
    pub name: String,
    pub block_type: BlockType,
    pub changed_properties: Vec<String>,
    pub added_children: Vec<String>,
    pub removed_children: Vec<String>,
    /// diffs of children present in both versions that changed
    pub child_diffs: Vec<ResourceDiff>,
}

impl ResourceDiff {
    pub fn has_changes(&self) -> bool {
        !self.changed_properties.is_empty()
            || !self.added_children.is_empty()
            || !self.removed_children.is_empty()
            || !self.child_diffs.is_empty()
    }

    /// Names of every diff nested below this one
    pub fn nested_names(&self) -> Vec<String> {
        let mut names = vec![];
        let mut stack: Vec<&ResourceDiff> = self.child_diffs.iter().collect();
        while let Some(diff) = stack.pop() {
            names.push(diff.name.clone());
            stack.extend(&diff.child_diffs);
        }
        names
    }
}

/// Collects changed property names while comparing two resources
pub(crate) struct DiffBuilder {
    diff: ResourceDiff,
}

impl DiffBuilder {
    pub fn new(name: &str, block_type: BlockType) -> Self {
        Self {
            diff: ResourceDiff {
                name: name.to_string(),
                block_type,
                changed_properties: vec![],
                added_children: vec![],
                removed_children: vec![],
                child_diffs: vec![],
            },
        }
    }

    pub fn check<T: PartialEq + ?Sized>(&mut self, property: &str, a: &T, b: &T) -> &mut Self {
        if a != b {
            self.diff.changed_properties.push(property.to_string());
        }
        self
    }

    /// Child order counts as a property change, membership as added/removed children
    pub fn children(&mut self, a: &[String], b: &[String]) -> &mut Self {
        for child in b {
            if !a.contains(child) {
                self.diff.added_children.push(child.clone());
            }
        }
        for child in a {
            if !b.contains(child) {
                self.diff.removed_children.push(child.clone());
            }
        }
        if self.diff.added_children.is_empty() && self.diff.removed_children.is_empty() && a != b
        {
            self.diff.changed_properties.push("children".to_string());
        }
        self
    }

    pub fn build(&mut self) -> ResourceDiff {
        self.diff.clone()
    }
}

/// Changes between two versions of a mod
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModDiff {
    /// changed scalar properties of the mod itself
    pub changed_properties: Vec<String>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// every changed resource exactly once: a changed tree child is only listed in the `child_diffs` of
    /// its changed parent
    pub changed: Vec<ResourceDiff>,
}

impl ModDiff {
    pub fn has_changes(&self) -> bool {
        !self.changed_properties.is_empty()
            || !self.added.is_empty()
            || !self.removed.is_empty()
            || !self.changed.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reorder_is_a_property_change() {
        let a = vec!["x".to_string(), "y".to_string()];
        let b = vec!["y".to_string(), "x".to_string()];
        let diff = DiffBuilder::new("m.benchmark.b", BlockType::Benchmark)
            .children(&a, &b)
            .build();
        assert_eq!(diff.changed_properties, vec!["children"]);
        assert!(diff.added_children.is_empty());
    }

    #[test]
    fn membership_changes() {
        let a = vec!["x".to_string()];
        let b = vec!["y".to_string()];
        let diff = DiffBuilder::new("m.benchmark.b", BlockType::Benchmark)
            .check("title", &Some("t"), &Some("t"))
            .children(&a, &b)
            .build();
        assert_eq!(diff.added_children, vec!["y"]);
        assert_eq!(diff.removed_children, vec!["x"]);
        assert!(diff.changed_properties.is_empty());
    }
}
