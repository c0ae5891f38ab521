//! References between resources
//!
//! Every `type.name` traversal a resource makes is recorded with its location so a reload can
//! work out which resources are affected by a change.
use crate::diagnostics::SourceRange;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceReference {
    /// fully-qualified name of the referencing resource
    pub from: String,
    /// fully-qualified name of the referenced resource
    pub to: String,
    pub range: SourceRange,
}

impl Display for ResourceReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {} @ {}", self.from, self.to, self.range)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReferenceTracker {
    references: BTreeMap<String, ResourceReference>,
}

impl ReferenceTracker {
    /// Adds `reference`, returns `false` if it was already known
    pub fn add(&mut self, reference: ResourceReference) -> bool {
        let key = reference.to_string();
        if self.references.contains_key(&key) {
            return false;
        }
        tracing::trace!(%reference, "reference added");
        self.references.insert(key, reference);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceReference> {
        self.references.values()
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn references_from<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a ResourceReference> + 'a {
        self.iter().filter(move |r| r.from == name)
    }

    pub fn references_to<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a ResourceReference> + 'a {
        self.iter().filter(move |r| r.to == name)
    }

    /// Every resource that directly or transitively references `name`
    pub fn dependents(&self, name: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut queue = VecDeque::from([name.to_string()]);
        while let Some(next) = queue.pop_front() {
            for reference in self.references_to(&next) {
                if reference.from != name && found.insert(reference.from.clone()) {
                    queue.push_back(reference.from.clone());
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reference(from: &str, to: &str) -> ResourceReference {
        ResourceReference {
            from: from.to_string(),
            to: to.to_string(),
            range: SourceRange::default(),
        }
    }

    #[test]
    fn duplicates_are_ignored() {
        let mut tracker = ReferenceTracker::default();
        assert!(tracker.add(reference("m.control.c", "m.query.q")));
        assert!(!tracker.add(reference("m.control.c", "m.query.q")));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn transitive_dependents() {
        let mut tracker = ReferenceTracker::default();
        tracker.add(reference("m.control.c", "m.query.q"));
        tracker.add(reference("m.benchmark.b", "m.control.c"));
        tracker.add(reference("m.benchmark.other", "m.control.x"));

        assert_eq!(
            tracker.dependents("m.query.q"),
            BTreeSet::from(["m.benchmark.b".to_string(), "m.control.c".to_string()])
        );
        assert_eq!(
            tracker
                .references_from("m.control.c")
                .map(|r| r.to.as_str())
                .collect::<Vec<_>>(),
            vec!["m.query.q"]
        );
    }
}
