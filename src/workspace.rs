use crate::error::ImportError;
use crate::model::ids::IdGenerator;
use crate::model::links::{Backlinks, LinkIndex};
use crate::model::outline::{Document, Node, Page};
use crate::model::tree;
use crate::storage::{self, Persistence};

/// Receives change notifications from the workspace.
pub trait Presenter {
    /// The document changed; rows and backlinks must be rebuilt.
    fn request_redraw(&self);
    fn notify(&self, message: String);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The node is gone. `refocus` is where editing should continue.
    Removed { refocus: Option<String> },
    /// The node was the last one on the page, so the page went with it.
    PageDeleted { page_id: String },
    Refused(Refusal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    NotFound,
    LastChildOfFocus,
    LastPage,
    UnknownPage,
}

impl Refusal {
    pub fn reason(self) -> &'static str {
        match self {
            Refusal::NotFound => "node not found on this page",
            Refusal::LastChildOfFocus => "cannot delete the only child of the focused node",
            Refusal::LastPage => "cannot delete the last page",
            Refusal::UnknownPage => "page not found",
        }
    }
}

/// Owns the document and applies every mutation to it.
///
/// Each successful change is saved through the store and announced through
/// the presenter before the call returns.
pub struct Workspace {
    doc: Document,
    ids: IdGenerator,
    store: Box<dyn Persistence>,
    presenter: Box<dyn Presenter>,
}

impl Workspace {
    /// Load from `store`, falling back to the welcome document.
    pub fn open(store: Box<dyn Persistence>, presenter: Box<dyn Presenter>) -> Self {
        match store.load() {
            Some(doc) => Self::with_document(doc, store, presenter),
            None => {
                tracing::info!("no saved outline, starting from the welcome page");
                Self {
                    doc: Document::default(),
                    ids: IdGenerator::default(),
                    store,
                    presenter,
                }
            }
        }
    }

    /// Adopt an existing document, reseeding ids from what it contains.
    pub fn with_document(
        mut doc: Document,
        store: Box<dyn Persistence>,
        presenter: Box<dyn Presenter>,
    ) -> Self {
        doc.repair();
        let mut ids = IdGenerator::default();
        ids.reseed(&doc);
        Self {
            doc,
            ids,
            store,
            presenter,
        }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn current_page(&self) -> Option<&Page> {
        self.doc.current_page()
    }

    pub fn visible_nodes(&self) -> &[Node] {
        self.doc.visible_nodes()
    }

    // ── Node edits ───────────────────────────────────────────────

    /// Replace a node's text. Returns `false` when the node is not on the
    /// current page or the text is unchanged.
    pub fn update_content(&mut self, node_id: &str, content: &str) -> bool {
        let Some(page) = self.doc.current_page_mut() else {
            return false;
        };
        let Some(node) = tree::find_by_id_mut(&mut page.nodes, node_id) else {
            return false;
        };
        if node.content == content {
            return false;
        }

        node.content = content.to_string();
        self.commit();
        true
    }

    /// Insert an empty node right after `ref_id` in the same sequence.
    pub fn create_sibling(&mut self, ref_id: &str) -> Option<String> {
        let page = self.doc.current_page_mut()?;
        let (siblings, idx) = tree::sibling_position_mut(&mut page.nodes, ref_id)?;
        let id = self.ids.next_node_id();
        siblings.insert(idx + 1, Node::new(id.clone()));

        tracing::debug!(%id, after = ref_id, "created sibling");
        self.commit();
        Some(id)
    }

    /// Append an empty child to `parent_id`, expanding the parent so the
    /// new node is on screen.
    pub fn create_child(&mut self, parent_id: &str) -> Option<String> {
        let page = self.doc.current_page_mut()?;
        let parent = tree::find_by_id_mut(&mut page.nodes, parent_id)?;
        let id = self.ids.next_node_id();
        parent.children.push(Node::new(id.clone()));
        parent.collapsed = false;

        tracing::debug!(%id, parent = parent_id, "created child");
        self.commit();
        Some(id)
    }

    /// Seed an empty scope with one node: a page root, or a child of the
    /// focused node while zoomed. Does nothing if the scope has nodes.
    pub fn create_first_node(&mut self) -> Option<String> {
        if !self.doc.visible_nodes().is_empty() {
            return None;
        }

        let focused = self.doc.focused_node_id.clone();
        let page = self.doc.current_page_mut()?;
        let scope = match focused {
            Some(fid) => &mut tree::find_by_id_mut(&mut page.nodes, &fid)?.children,
            None => &mut page.nodes,
        };
        let id = self.ids.next_node_id();
        scope.push(Node::new(id.clone()));

        self.commit();
        Some(id)
    }

    /// Delete `target` with its subtree.
    ///
    /// Deleting the only node of an unfocused page deletes the page itself;
    /// deleting the only child of the focused node is refused.
    pub fn delete_node(&mut self, target: &str) -> DeleteOutcome {
        let Some(page) = self.doc.current_page() else {
            return DeleteOutcome::Refused(Refusal::NotFound);
        };
        let Some((siblings, idx)) = tree::sibling_position(&page.nodes, target) else {
            return DeleteOutcome::Refused(Refusal::NotFound);
        };

        let refocus = if idx > 0 {
            Some(siblings[idx - 1].id.clone())
        } else {
            tree::find_parent(&page.nodes, target).map(|p| p.id.clone())
        };

        let visible = self.doc.visible_nodes();
        let sole_visible = visible.len() == 1 && visible[0].id == target;
        if sole_visible {
            if self.doc.is_focused() {
                return DeleteOutcome::Refused(Refusal::LastChildOfFocus);
            }
            let page_id = page.id.clone();
            return match self.delete_page(&page_id) {
                Ok(()) => DeleteOutcome::PageDeleted { page_id },
                Err(refusal) => DeleteOutcome::Refused(refusal),
            };
        }

        let Some(page) = self.doc.current_page_mut() else {
            return DeleteOutcome::Refused(Refusal::NotFound);
        };
        tree::remove_subtree(&mut page.nodes, target);

        if self.doc.focus_path.iter().any(|id| id == target) {
            self.doc.clear_focus();
        }

        tracing::debug!(target, ?refocus, "deleted node");
        self.commit();
        DeleteOutcome::Removed { refocus }
    }

    pub fn toggle_collapse(&mut self, node_id: &str) -> bool {
        let Some(page) = self.doc.current_page_mut() else {
            return false;
        };
        match tree::find_by_id_mut(&mut page.nodes, node_id) {
            Some(node) if node.has_children() => {
                node.collapsed = !node.collapsed;
                self.commit();
                true
            }
            _ => false,
        }
    }

    // ── Focus ────────────────────────────────────────────────────

    pub fn focus_on_node(&mut self, node_id: &str) -> bool {
        let Some(path) = self
            .doc
            .current_page()
            .and_then(|page| tree::find_path_to_node(&page.nodes, node_id))
        else {
            return false;
        };

        self.doc.focused_node_id = Some(node_id.to_string());
        self.doc.focus_path = path;
        self.commit();
        true
    }

    /// Zoom out to the breadcrumb at `index`, dropping everything after it.
    pub fn focus_on_path(&mut self, index: usize) -> bool {
        let Some(target) = self.doc.focus_path.get(index).cloned() else {
            return false;
        };

        self.doc.focus_path.truncate(index + 1);
        self.doc.focused_node_id = Some(target);
        self.commit();
        true
    }

    pub fn unfocus(&mut self) {
        self.doc.clear_focus();
        self.commit();
    }

    // ── Pages ────────────────────────────────────────────────────

    pub fn switch_page(&mut self, page_id: &str) -> bool {
        if self.doc.page(page_id).is_none() {
            tracing::warn!(page_id, "refusing to switch to unknown page");
            return false;
        }

        self.doc.current_page_id = page_id.to_string();
        self.doc.clear_focus();
        self.commit();
        true
    }

    /// Switch to the page called `name`, creating it (with one empty node)
    /// if it does not exist yet. Returns the page id.
    pub fn navigate_to_page_by_name(&mut self, name: &str) -> String {
        let page_id = match self.doc.page_by_name(name) {
            Some(page) => page.id.clone(),
            None => {
                let page_id = self.ids.next_page_id();
                let node_id = self.ids.next_node_id();
                self.doc.pages.push(Page {
                    id: page_id.clone(),
                    name: name.to_string(),
                    nodes: vec![Node::new(node_id)],
                });
                tracing::info!(%page_id, name, "created page");
                page_id
            }
        };

        self.switch_page(&page_id);
        page_id
    }

    /// The add-page action. Blank names are rejected.
    pub fn add_page(&mut self, name: &str) -> Option<String> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(self.navigate_to_page_by_name(name))
    }

    /// Remove a page. The last remaining page is never deleted.
    pub fn delete_page(&mut self, page_id: &str) -> Result<(), Refusal> {
        let Some(pos) = self.doc.pages.iter().position(|p| p.id == page_id) else {
            return Err(Refusal::UnknownPage);
        };
        if self.doc.pages.len() <= 1 {
            return Err(Refusal::LastPage);
        }

        let removed = self.doc.pages.remove(pos);
        tracing::info!(page_id, name = %removed.name, "deleted page");

        if self.doc.current_page_id == page_id {
            let first = self.doc.pages[0].id.clone();
            self.switch_page(&first);
        } else {
            self.commit();
        }
        Ok(())
    }

    // ── Links ────────────────────────────────────────────────────

    /// Follow a node link. Only nodes on the current page can be focused.
    pub fn navigate_to_node(&mut self, node_id: &str) -> bool {
        if self.focus_on_node(node_id) {
            return true;
        }

        let message = match self.doc.find_node_in_all_pages(node_id) {
            Some((page, _)) => format!("node {node_id} is on page \"{}\"", page.name),
            None => format!("node {node_id} does not exist"),
        };
        tracing::warn!(node_id, "node link target not found in current page");
        self.presenter.notify(message);
        false
    }

    /// Open the page a backlink came from.
    pub fn navigate_to_backlink(&mut self, source_page_id: &str) -> bool {
        self.switch_page(source_page_id)
    }

    pub fn backlinks(&self, page_id: &str) -> Backlinks {
        self.doc
            .page(page_id)
            .map(|page| LinkIndex::build(&self.doc).backlinks(page))
            .unwrap_or_default()
    }

    // ── Import / export ──────────────────────────────────────────

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        storage::encode_document(&self.doc, true)
    }

    /// Replace every page with the ones in `text`. On error nothing changes.
    pub fn import_json(&mut self, text: &str) -> Result<(), ImportError> {
        let imported = storage::decode_document(text)?;

        self.doc.pages = imported.pages;
        self.doc.current_page_id = imported.current_page_id;
        self.doc.clear_focus();
        self.doc.repair();
        self.ids.reseed(&self.doc);

        tracing::info!(pages = self.doc.pages.len(), "imported document");
        self.commit();
        Ok(())
    }

    fn commit(&self) {
        if let Err(e) = self.store.save(&self.doc) {
            tracing::error!("save failed: {e}");
            self.presenter.notify(format!("save failed: {e}"));
        }
        self.presenter.request_redraw();
    }
}
