use super::outline::Document;
use super::tree;

const NODE_PREFIX: &str = "node";
const PAGE_PREFIX: &str = "page";

/// Monotonic id source for nodes and pages.
///
/// Counters are bumped before formatting, so the first id handed out after
/// `reseed` is one past the highest suffix already in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdGenerator {
    node: u64,
    page: u64,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self { node: 6, page: 2 }
    }
}

impl IdGenerator {
    pub fn next_node_id(&mut self) -> String {
        self.node += 1;
        format!("{NODE_PREFIX}{}", self.node)
    }

    pub fn next_page_id(&mut self) -> String {
        self.page += 1;
        format!("{PAGE_PREFIX}{}", self.page)
    }

    /// Reset both counters to the highest numeric suffix found in `doc`.
    pub fn reseed(&mut self, doc: &Document) {
        let mut max_node = 0;
        for page in &doc.pages {
            tree::walk(&page.nodes, &mut |node| {
                max_node = max_node.max(numeric_suffix(&node.id));
            });
        }

        let max_page = doc
            .pages
            .iter()
            .map(|p| numeric_suffix(&p.id))
            .max()
            .unwrap_or(0);

        tracing::debug!(max_node, max_page, "reseeded id counters");
        self.node = max_node;
        self.page = max_page;
    }
}

/// Trailing run of ASCII digits, or 0 when there is none (or it overflows).
fn numeric_suffix(id: &str) -> u64 {
    let digits_start = id
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i);

    digits_start
        .and_then(|start| id[start..].parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::outline::{Node, Page};

    #[test]
    fn fresh_generator_continues_after_default_document() {
        let mut ids = IdGenerator::default();
        assert_eq!(ids.next_node_id(), "node7");
        assert_eq!(ids.next_page_id(), "page3");
    }

    #[test]
    fn numeric_suffix_reads_trailing_digits() {
        assert_eq!(numeric_suffix("node10"), 10);
        assert_eq!(numeric_suffix("page3"), 3);
        assert_eq!(numeric_suffix("abc"), 0);
        assert_eq!(numeric_suffix("n1x"), 0);
        assert_eq!(numeric_suffix("42"), 42);
        assert_eq!(numeric_suffix("node99999999999999999999999"), 0);
    }

    #[test]
    fn reseed_uses_max_suffix_across_pages_and_depth() {
        let mut child = Node::new("node3");
        child.children.push(Node::new("node10"));
        let doc = Document {
            pages: vec![
                Page {
                    id: "page4".to_string(),
                    name: "A".to_string(),
                    nodes: vec![child],
                },
                Page {
                    id: "page2".to_string(),
                    name: "B".to_string(),
                    nodes: vec![Node::new("node8")],
                },
            ],
            current_page_id: "page4".to_string(),
            focused_node_id: None,
            focus_path: Vec::new(),
        };

        let mut ids = IdGenerator::default();
        ids.reseed(&doc);
        assert_eq!(ids.next_node_id(), "node11");
        assert_eq!(ids.next_page_id(), "page5");
    }
}
