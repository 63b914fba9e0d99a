use serde::{Deserialize, Serialize};

use super::tree;

/// A single outline item. Owned by its parent's `children` or by a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub children: Vec<Node>,
    /// Only meaningful when `children` is non-empty.
    #[serde(default)]
    pub collapsed: bool,
}

impl Node {
    /// An empty node with no children.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: String::new(),
            children: Vec::new(),
            collapsed: false,
        }
    }

    pub fn with_content(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::new(id)
        }
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// A named root-level container of nodes. `name` is the key page links resolve against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

/// The whole dataset: what gets saved, loaded, exported and imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub pages: Vec<Page>,
    #[serde(default)]
    pub current_page_id: String,
    #[serde(default)]
    pub focused_node_id: Option<String>,
    #[serde(default)]
    pub focus_path: Vec<String>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            pages: default_pages(),
            current_page_id: "page1".to_string(),
            focused_node_id: None,
            focus_path: Vec::new(),
        }
    }
}

fn default_pages() -> Vec<Page> {
    let mut welcome = Node::with_content("node1", "Welcome to your outliner");
    welcome.children = vec![
        Node::with_content(
            "node2",
            "Press Enter to create a new node at the same level",
        ),
        Node::with_content("node3", "Press Ctrl+Enter to create a child node"),
        Node::with_content("node4", "Select a bullet and press Enter to focus on that node"),
        Node::with_content("node5", "Use [[Page Name]] to link to other pages"),
    ];

    vec![Page {
        id: "page1".to_string(),
        name: "Main Page".to_string(),
        nodes: vec![welcome],
    }]
}

impl Document {
    pub fn page(&self, page_id: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.id == page_id)
    }

    pub fn page_by_name(&self, name: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.name == name)
    }

    pub fn current_page(&self) -> Option<&Page> {
        self.page(&self.current_page_id)
    }

    pub fn current_page_mut(&mut self) -> Option<&mut Page> {
        let id = self.current_page_id.clone();
        self.pages.iter_mut().find(|p| p.id == id)
    }

    pub fn is_focused(&self) -> bool {
        self.focused_node_id.is_some()
    }

    pub fn clear_focus(&mut self) {
        self.focused_node_id = None;
        self.focus_path.clear();
    }

    /// The focused node, if focus is active and still resolves in the current page.
    pub fn focused_node(&self) -> Option<&Node> {
        let id = self.focused_node_id.as_deref()?;
        tree::find_by_id(&self.current_page()?.nodes, id)
    }

    /// Children of the focused node when focus resolves, else the current
    /// page's roots, else nothing.
    pub fn visible_nodes(&self) -> &[Node] {
        match self.focused_node() {
            Some(node) => node.children.as_slice(),
            None => self
                .current_page()
                .map(|page| page.nodes.as_slice())
                .unwrap_or_default(),
        }
    }

    /// Look a node up across every page, returning the page that holds it.
    pub fn find_node_in_all_pages(&self, id: &str) -> Option<(&Page, &Node)> {
        self.pages
            .iter()
            .find_map(|page| tree::find_by_id(&page.nodes, id).map(|node| (page, node)))
    }

    /// Restore a freshly decoded document to a usable state.
    ///
    /// Empty `pages` falls back to the built-in pages, a dangling
    /// `current_page_id` resets to the first page, and a focus chain that
    /// no longer resolves in the current page is dropped.
    pub fn repair(&mut self) {
        if self.pages.is_empty() {
            tracing::warn!("document has no pages, restoring defaults");
            self.pages = default_pages();
            self.current_page_id = self.pages[0].id.clone();
            self.clear_focus();
        }

        if self.current_page().is_none() {
            self.current_page_id = self.pages[0].id.clone();
            self.clear_focus();
        }

        if !self.focus_is_valid() {
            tracing::debug!("dropping stale focus path {:?}", self.focus_path);
            self.clear_focus();
        }
    }

    fn focus_is_valid(&self) -> bool {
        let Some(focused) = self.focused_node_id.as_deref() else {
            return self.focus_path.is_empty();
        };

        let Some(page) = self.current_page() else {
            return false;
        };

        tree::find_path_to_node(&page.nodes, focused).is_some_and(|path| path == self.focus_path)
    }
}
