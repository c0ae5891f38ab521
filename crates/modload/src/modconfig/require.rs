use crate::diagnostics::SourceRange;
use serde::Serialize;
use std::fmt::{Display, Formatter};

/// A version constraint on another mod: `mod "github.com/org/mod" { version = "1.0" }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModVersionConstraint {
    pub name: String,
    pub version: String,
    #[serde(skip)]
    pub decl_range: SourceRange,
}

impl Display for ModVersionConstraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// A version constraint on a plugin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PluginVersion {
    pub name: String,
    pub version: Option<String>,
}

/// The `require` block of a mod
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Require {
    /// minimum version of the tool itself
    pub steampipe: Option<String>,
    pub plugins: Vec<PluginVersion>,
    pub mods: Vec<ModVersionConstraint>,
    #[serde(skip)]
    pub decl_range: SourceRange,
}

impl Require {
    pub fn is_empty(&self) -> bool {
        self.steampipe.is_none() && self.plugins.is_empty() && self.mods.is_empty()
    }

    pub fn mod_dependency(&self, name: &str) -> Option<&ModVersionConstraint> {
        self.mods.iter().find(|m| m.name == name)
    }
}
