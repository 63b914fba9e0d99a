//! UI events and the table that routes them to workspace operations.
//!
//! Nothing here knows about keys or terminals. The app translates raw input
//! into a [`UiEvent`] and acts on the returned [`Outcome`].

use crate::model::links::LinkTarget;
use crate::workspace::{DeleteOutcome, Workspace};

/// Modifier held while "clicking" a bullet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulletModifier {
    /// Zoom into the node.
    None,
    /// Expand or collapse.
    Toggle,
    /// Copy the node id.
    Copy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    TextEdited { node_id: String, content: String },
    Enter { node_id: String },
    CtrlEnter { node_id: String },
    BackspaceOnEmpty { node_id: String },
    Delete { node_id: String },
    EnterOnEmptyScope,
    BulletClick { node_id: String, modifier: BulletModifier },
    /// `None` is the page-root crumb.
    BreadcrumbClick(Option<usize>),
    PageTabClick(String),
    AddPage(String),
    DeletePage(String),
    LinkClick(LinkTarget),
    BacklinkClick { page_id: String, node_id: String },
    Import(String),
}

/// What the app should do after an event was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Unchanged,
    Changed,
    /// State changed and the cursor belongs on this node.
    Select(String),
    /// Put this text on the clipboard.
    Copy(String),
    /// Nothing changed; tell the user why.
    Declined(String),
}

pub fn dispatch(ws: &mut Workspace, event: UiEvent) -> Outcome {
    tracing::trace!(?event, "dispatch");

    match event {
        UiEvent::TextEdited { node_id, content } => {
            changed(ws.update_content(&node_id, &content))
        }
        UiEvent::Enter { node_id } => select(ws.create_sibling(&node_id)),
        UiEvent::CtrlEnter { node_id } => select(ws.create_child(&node_id)),
        UiEvent::EnterOnEmptyScope => select(ws.create_first_node()),
        UiEvent::BackspaceOnEmpty { node_id } | UiEvent::Delete { node_id } => {
            match ws.delete_node(&node_id) {
                DeleteOutcome::Removed { refocus: Some(id) } => Outcome::Select(id),
                DeleteOutcome::Removed { refocus: None } | DeleteOutcome::PageDeleted { .. } => {
                    Outcome::Changed
                }
                DeleteOutcome::Refused(refusal) => Outcome::Declined(refusal.reason().to_string()),
            }
        }
        UiEvent::BulletClick { node_id, modifier } => match modifier {
            BulletModifier::None => changed(ws.focus_on_node(&node_id)),
            BulletModifier::Toggle => {
                if ws.toggle_collapse(&node_id) {
                    Outcome::Changed
                } else {
                    Outcome::Declined("node has no children".to_string())
                }
            }
            BulletModifier::Copy => Outcome::Copy(node_id),
        },
        UiEvent::BreadcrumbClick(None) => {
            ws.unfocus();
            Outcome::Changed
        }
        UiEvent::BreadcrumbClick(Some(index)) => changed(ws.focus_on_path(index)),
        UiEvent::PageTabClick(page_id) => changed(ws.switch_page(&page_id)),
        UiEvent::AddPage(name) => match ws.add_page(&name) {
            Some(_) => Outcome::Changed,
            None => Outcome::Declined("page name cannot be empty".to_string()),
        },
        UiEvent::DeletePage(page_id) => match ws.delete_page(&page_id) {
            Ok(()) => Outcome::Changed,
            Err(refusal) => Outcome::Declined(refusal.reason().to_string()),
        },
        UiEvent::LinkClick(LinkTarget::Page(name)) => {
            ws.navigate_to_page_by_name(&name);
            Outcome::Changed
        }
        UiEvent::LinkClick(LinkTarget::Node(node_id)) => {
            // The workspace already told the user when the node is elsewhere.
            changed(ws.navigate_to_node(&node_id))
        }
        UiEvent::LinkClick(LinkTarget::Web { url, .. }) => Outcome::Copy(url),
        UiEvent::BacklinkClick { page_id, node_id } => {
            if ws.navigate_to_backlink(&page_id) {
                Outcome::Select(node_id)
            } else {
                Outcome::Unchanged
            }
        }
        UiEvent::Import(text) => match ws.import_json(&text) {
            Ok(()) => Outcome::Changed,
            Err(e) => {
                tracing::warn!("import rejected: {e}");
                Outcome::Declined(e.to_string())
            }
        },
    }
}

fn changed(applied: bool) -> Outcome {
    if applied {
        Outcome::Changed
    } else {
        Outcome::Unchanged
    }
}

fn select(created: Option<String>) -> Outcome {
    created.map_or(Outcome::Unchanged, Outcome::Select)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::model::outline::Document;
    use crate::storage::Persistence;
    use crate::workspace::Presenter;

    struct NoStore;

    impl Persistence for NoStore {
        fn load(&self) -> Option<Document> {
            None
        }

        fn save(&self, _doc: &Document) -> Result<(), StoreError> {
            Ok(())
        }
    }

    struct Silent;

    impl Presenter for Silent {
        fn request_redraw(&self) {}
        fn notify(&self, _message: String) {}
    }

    fn ws() -> Workspace {
        Workspace::open(Box::new(NoStore), Box::new(Silent))
    }

    #[test]
    fn enter_and_ctrl_enter_select_new_nodes() {
        let mut ws = ws();
        let sibling = dispatch(&mut ws, UiEvent::Enter { node_id: "node2".into() });
        assert_eq!(sibling, Outcome::Select("node7".to_string()));
        let child = dispatch(&mut ws, UiEvent::CtrlEnter { node_id: "node2".into() });
        assert_eq!(child, Outcome::Select("node8".to_string()));
    }

    #[test]
    fn backspace_on_empty_moves_to_previous_sibling() {
        let mut ws = ws();
        let out = dispatch(&mut ws, UiEvent::BackspaceOnEmpty { node_id: "node4".into() });
        assert_eq!(out, Outcome::Select("node3".to_string()));
    }

    #[test]
    fn bullet_modifiers_route_to_focus_toggle_and_copy() {
        let mut ws = ws();
        let copy = dispatch(
            &mut ws,
            UiEvent::BulletClick { node_id: "node1".into(), modifier: BulletModifier::Copy },
        );
        assert_eq!(copy, Outcome::Copy("node1".to_string()));

        let leaf = dispatch(
            &mut ws,
            UiEvent::BulletClick { node_id: "node2".into(), modifier: BulletModifier::Toggle },
        );
        assert!(matches!(leaf, Outcome::Declined(_)));

        let focus = dispatch(
            &mut ws,
            UiEvent::BulletClick { node_id: "node1".into(), modifier: BulletModifier::None },
        );
        assert_eq!(focus, Outcome::Changed);
        assert_eq!(ws.document().focused_node_id.as_deref(), Some("node1"));

        dispatch(&mut ws, UiEvent::BreadcrumbClick(None));
        assert!(!ws.document().is_focused());
    }

    #[test]
    fn page_link_creates_missing_page() {
        let mut ws = ws();
        let out = dispatch(&mut ws, UiEvent::LinkClick(LinkTarget::Page("B".into())));
        assert_eq!(out, Outcome::Changed);
        assert_eq!(ws.current_page().map(|p| p.name.as_str()), Some("B"));
    }

    #[test]
    fn web_link_copies_url() {
        let mut ws = ws();
        let out = dispatch(
            &mut ws,
            UiEvent::LinkClick(LinkTarget::Web {
                label: "docs".into(),
                url: "https://example.com".into(),
            }),
        );
        assert_eq!(out, Outcome::Copy("https://example.com".to_string()));
    }

    #[test]
    fn bad_import_is_declined() {
        let mut ws = ws();
        let out = dispatch(&mut ws, UiEvent::Import("{\"nope\": 1}".into()));
        assert!(matches!(out, Outcome::Declined(msg) if msg.contains("invalid data format")));
    }

    #[test]
    fn deleting_last_page_is_declined() {
        let mut ws = ws();
        let out = dispatch(&mut ws, UiEvent::DeletePage("page1".into()));
        assert_eq!(out, Outcome::Declined("cannot delete the last page".to_string()));
    }

    #[test]
    fn deleting_unknown_page_says_so() {
        let mut ws = ws();
        dispatch(&mut ws, UiEvent::AddPage("Other".into()));
        let out = dispatch(&mut ws, UiEvent::DeletePage("page42".into()));
        assert_eq!(out, Outcome::Declined("page not found".to_string()));
        assert_eq!(ws.document().pages.len(), 2);
    }
}
