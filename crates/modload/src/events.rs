//! Notifications raised by a [Workspace](crate::workspace::Workspace)
use crate::modconfig::{parse_full_name, BlockType, ModDiff, ResourceDiff};
use serde::Serialize;

/// What changed in the dashboard-relevant part of a mod after a reload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardChanged {
    pub changed: Vec<ResourceDiff>,
    pub new: Vec<String>,
    pub deleted: Vec<String>,
}

impl DashboardChanged {
    /// Keeps the part of `diff` a dashboard can display: every tree resource, i.e. not queries, variables
    /// or locals
    pub fn from_diff(diff: &ModDiff) -> Self {
        fn displayed(name: &str) -> bool {
            parse_full_name(name).is_some_and(|(_, block_type, _)| {
                !matches!(
                    block_type,
                    BlockType::Query | BlockType::Variable | BlockType::Locals
                )
            })
        }

        Self {
            changed: diff
                .changed
                .iter()
                .filter(|d| displayed(&d.name))
                .cloned()
                .collect(),
            new: diff.added.iter().filter(|n| displayed(n)).cloned().collect(),
            deleted: diff.removed.iter().filter(|n| displayed(n)).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.new.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DashboardEvent {
    DashboardChanged(DashboardChanged),
    /// a leaf node failed to execute
    LeafNodeError { leaf: String, session: String, error: String },
    ExecutionComplete { dashboard: String, session: String },
    /// the workspace could not be reloaded, the previous mod is still in use
    WorkspaceError { error: String },
}

/// Receives every [DashboardEvent] of a workspace
pub type DashboardEventHandler = std::sync::Arc<dyn Fn(&DashboardEvent) + Send + Sync>;

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn resource_diff(name: &str, block_type: BlockType) -> ResourceDiff {
        ResourceDiff {
            name: name.to_string(),
            block_type,
            changed_properties: vec!["title".to_string()],
            added_children: vec![],
            removed_children: vec![],
            child_diffs: vec![],
        }
    }

    #[test]
    fn only_displayed_resources_are_reported() {
        let diff = ModDiff {
            changed_properties: vec![],
            added: vec!["m.card.new".to_string(), "m.var.region".to_string()],
            removed: vec!["m.query.gone".to_string()],
            changed: vec![
                resource_diff("m.dashboard.d1", BlockType::Dashboard),
                resource_diff("m.local.l", BlockType::Locals),
            ],
        };

        let event = DashboardChanged::from_diff(&diff);
        assert_eq!(event.new, vec!["m.card.new"]);
        assert!(event.deleted.is_empty());
        assert_eq!(
            event.changed.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            vec!["m.dashboard.d1"]
        );
        assert!(!event.is_empty());
    }
}
