//! Display tree handed to reporters.

use serde::{Deserialize, Serialize};

/// What a described node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptionKind {
    Suite,
    /// A suite reported and counted as a single test.
    Composite,
    Test,
}

/// Display name, path and child descriptions of a node.
///
/// Descriptions are recomputed on demand from the tree, never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub name: String,
    /// `/`-separated display names from the root down to this node.
    pub path: String,
    pub kind: DescriptionKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Description>,
}

impl Description {
    pub fn is_test(&self) -> bool {
        self.kind == DescriptionKind::Test
    }

    /// Copy without children, used for event payloads.
    pub fn childless(&self) -> Description {
        Description {
            children: Vec::new(),
            ..self.clone()
        }
    }

    /// Leaf descriptions in declaration order.
    pub fn leaves(&self) -> Vec<&Description> {
        let mut out = Vec::new();
        collect_leaves(self, &mut out);
        out
    }

    /// Indented outline, one node per line.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        write_outline(self, 0, &mut out);
        out
    }
}

fn collect_leaves<'a>(description: &'a Description, out: &mut Vec<&'a Description>) {
    if description.is_test() {
        out.push(description);
        return;
    }
    for child in &description.children {
        collect_leaves(child, out);
    }
}

fn write_outline(description: &Description, depth: usize, out: &mut String) {
    out.push_str(&"  ".repeat(depth));
    out.push_str(&description.name);
    if description.kind == DescriptionKind::Composite {
        out.push_str(" (composite)");
    }
    out.push('\n');
    for child in &description.children {
        write_outline(child, depth + 1, out);
    }
}
