//! Allowed attributes and nested blocks per block type
use crate::modconfig::{BlockType, LeafKind};

const COMMON: [&str; 4] = ["title", "description", "documentation", "tags"];
const QUERY_PROVIDER: [&str; 3] = ["sql", "query", "args"];

/// Labels a block of some type takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelRule {
    None,
    /// exactly one label
    Required,
    /// one label, or none for blocks nested in a dashboard or container
    Optional,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSchema {
    pub attributes: Vec<&'static str>,
    pub blocks: Vec<BlockType>,
    /// every attribute is accepted (`locals`)
    pub any_attributes: bool,
    pub labels: LabelRule,
}

impl BlockSchema {
    fn new(attributes: &[&'static str], blocks: &[BlockType], labels: LabelRule) -> Self {
        Self {
            attributes: attributes.to_vec(),
            blocks: blocks.to_vec(),
            any_attributes: false,
            labels,
        }
    }

    fn with(mut self, attributes: &[&'static str]) -> Self {
        self.attributes.extend_from_slice(attributes);
        self
    }

    pub fn allows_attribute(&self, name: &str) -> bool {
        self.any_attributes || self.attributes.contains(&name)
    }

    pub fn allows_block(&self, block_type: BlockType) -> bool {
        self.blocks.contains(&block_type)
    }

    pub fn for_block_type(block_type: BlockType) -> BlockSchema {
        use BlockType::*;

        match block_type {
            Mod => BlockSchema::new(
                &["color", "icon", "categories"],
                &[Require, LegacyRequire, OpenGraph],
                LabelRule::Required,
            )
            .with(&COMMON),
            Require | LegacyRequire => BlockSchema::new(
                &["steampipe", "plugins"],
                &[Mod],
                LabelRule::None,
            ),
            OpenGraph => BlockSchema::new(&["title", "description", "image"], &[], LabelRule::None),
            Query => BlockSchema::new(
                &["sql", "search_path", "search_path_prefix"],
                &[Param],
                LabelRule::Required,
            )
            .with(&COMMON),
            Control => BlockSchema::new(
                &["severity", "search_path", "search_path_prefix", "width", "base"],
                &[Param],
                LabelRule::Required,
            )
            .with(&COMMON)
            .with(&QUERY_PROVIDER),
            Benchmark => BlockSchema::new(
                &["children", "display", "type", "width", "base"],
                &[],
                LabelRule::Required,
            )
            .with(&COMMON),
            Dashboard | Container => BlockSchema::new(
                &["children", "display", "width", "base"],
                &[Container, Card, Chart, Counter, Hierarchy, Image, Input, Table, Text],
                if block_type == Dashboard {
                    LabelRule::Required
                } else {
                    LabelRule::Optional
                },
            )
            .with(&COMMON),
            Variable => BlockSchema::new(&["type", "default", "description"], &[], LabelRule::Required),
            Locals => BlockSchema {
                any_attributes: true,
                ..BlockSchema::new(&[], &[], LabelRule::None)
            },
            Param => BlockSchema::new(&["description", "default"], &[], LabelRule::Required),
            Card | Chart | Counter | Hierarchy | Image | Input | Table | Text => {
                BlockSchema::for_leaf(block_type.leaf_kind().unwrap_or_default())
            }
        }
    }

    fn for_leaf(kind: LeafKind) -> BlockSchema {
        let mut schema = BlockSchema::new(
            &["title", "width", "type", "icon", "display", "documentation", "base"],
            &[],
            LabelRule::Optional,
        )
        .with(kind.option_attributes());
        if kind.is_query_provider() {
            schema = schema.with(&QUERY_PROVIDER);
            schema.blocks.push(BlockType::Param);
        }
        schema
    }
}

/// Schema of the `mod "<path>" { ... }` and `plugin` blocks nested in `require`
pub fn require_item_schema() -> BlockSchema {
    BlockSchema::new(&["version"], &[], LabelRule::Required)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn text_is_not_a_query_provider() {
        let text = BlockSchema::for_block_type(BlockType::Text);
        assert!(!text.allows_attribute("sql"));
        assert!(!text.allows_block(BlockType::Param));
        assert!(text.allows_attribute("value"));

        let card = BlockSchema::for_block_type(BlockType::Card);
        assert!(card.allows_attribute("sql"));
        assert!(card.allows_block(BlockType::Param));
    }

    #[test]
    fn locals_accept_anything() {
        assert!(BlockSchema::for_block_type(BlockType::Locals).allows_attribute("whatever"));
        assert!(!BlockSchema::for_block_type(BlockType::Query).allows_attribute("query"));
    }
}
