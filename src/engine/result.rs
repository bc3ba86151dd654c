//! Explore/load results.

use serde::{Deserialize, Serialize};

use crate::framework::test::TestKind;

/// Serializable view of one node in the test tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestNode {
    pub id: String,
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub kind: TestKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TestNode>,
}

impl TestNode {
    /// Number of test methods at or below this node.
    pub fn test_count(&self) -> usize {
        match self.kind {
            TestKind::Method => 1,
            TestKind::Suite => self.children.iter().map(TestNode::test_count).sum(),
        }
    }
}

/// Outcome of explore or load: the tree as the agent sees it plus any problems found.
///
/// A load with errors is not a load; the isolated runner unloads on `has_errors()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineResult {
    pub tree: TestNode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl EngineResult {
    pub fn new(tree: TestNode) -> Self {
        Self {
            tree,
            errors: Vec::new(),
        }
    }

    pub fn with_errors(tree: TestNode, errors: Vec<String>) -> Self {
        Self { tree, errors }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Indented outline of the tree, used by `isorun explore`.
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        render_node(&self.tree, 0, &mut out);
        for error in &self.errors {
            out.push_str(&format!("error: {error}\n"));
        }
        out
    }
}

fn render_node(node: &TestNode, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let marker = match node.kind {
        TestKind::Suite => "+",
        TestKind::Method => "-",
    };
    out.push_str(&format!("{indent}{marker} {}", node.name));
    if !node.categories.is_empty() {
        out.push_str(&format!(" [{}]", node.categories.join(", ")));
    }
    if let Some(reason) = &node.ignore_reason {
        out.push_str(&format!(" (ignored: {reason})"));
    }
    out.push('\n');
    for child in &node.children {
        render_node(child, depth + 1, out);
    }
}
