//! Search and mutation primitives over a forest of [`Node`]s.
//!
//! Every search is a pre-order depth-first walk that stops at the first
//! match. Ids are unique across the whole document, so "first" never has
//! to break a real tie.

use super::outline::Node;

pub fn find_by_id<'a>(nodes: &'a [Node], id: &str) -> Option<&'a Node> {
    for node in nodes {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_by_id(&node.children, id) {
            return Some(found);
        }
    }
    None
}

pub fn find_by_id_mut<'a>(nodes: &'a mut [Node], id: &str) -> Option<&'a mut Node> {
    for node in nodes.iter_mut() {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_by_id_mut(&mut node.children, id) {
            return Some(found);
        }
    }
    None
}

/// Direct parent of `id`. `None` when `id` is a root or absent.
pub fn find_parent<'a>(nodes: &'a [Node], id: &str) -> Option<&'a Node> {
    for node in nodes {
        if node.children.iter().any(|child| child.id == id) {
            return Some(node);
        }
        if let Some(found) = find_parent(&node.children, id) {
            return Some(found);
        }
    }
    None
}

/// Root-to-node id chain, inclusive of `id`.
pub fn find_path_to_node(nodes: &[Node], id: &str) -> Option<Vec<String>> {
    let mut path = Vec::new();
    if push_path(nodes, id, &mut path) {
        Some(path)
    } else {
        None
    }
}

fn push_path(nodes: &[Node], id: &str, path: &mut Vec<String>) -> bool {
    for node in nodes {
        path.push(node.id.clone());
        if node.id == id || push_path(&node.children, id, path) {
            return true;
        }
        path.pop();
    }
    false
}

/// Detach `id` and its whole subtree from wherever it lives.
pub fn remove_subtree(nodes: &mut Vec<Node>, id: &str) -> bool {
    take_subtree(nodes, id).is_some()
}

pub fn take_subtree(nodes: &mut Vec<Node>, id: &str) -> Option<Node> {
    if let Some(pos) = nodes.iter().position(|n| n.id == id) {
        return Some(nodes.remove(pos));
    }
    for node in nodes.iter_mut() {
        if let Some(taken) = take_subtree(&mut node.children, id) {
            return Some(taken);
        }
    }
    None
}

/// The sequence holding `id` (a parent's children or the roots) and its index there.
pub fn sibling_position<'a>(nodes: &'a [Node], id: &str) -> Option<(&'a [Node], usize)> {
    if let Some(pos) = nodes.iter().position(|n| n.id == id) {
        return Some((nodes, pos));
    }
    for node in nodes {
        if let Some(found) = sibling_position(&node.children, id) {
            return Some(found);
        }
    }
    None
}

pub fn sibling_position_mut<'a>(
    nodes: &'a mut Vec<Node>,
    id: &str,
) -> Option<(&'a mut Vec<Node>, usize)> {
    if let Some(pos) = nodes.iter().position(|n| n.id == id) {
        return Some((nodes, pos));
    }
    for node in nodes.iter_mut() {
        if let Some(found) = sibling_position_mut(&mut node.children, id) {
            return Some(found);
        }
    }
    None
}

/// Pre-order visit of every node in the forest.
pub fn walk<'a>(nodes: &'a [Node], visit: &mut impl FnMut(&'a Node)) {
    for node in nodes {
        visit(node);
        walk(&node.children, visit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forest() -> Vec<Node> {
        let mut a = Node::with_content("a", "A");
        let mut b = Node::with_content("b", "B");
        b.children = vec![Node::with_content("c", "C"), Node::with_content("d", "D")];
        a.children = vec![b, Node::with_content("e", "E")];
        vec![a, Node::with_content("f", "F")]
    }

    #[test]
    fn find_by_id_searches_depth_first() {
        let nodes = forest();
        assert_eq!(find_by_id(&nodes, "d").map(|n| n.content.as_str()), Some("D"));
        assert_eq!(find_by_id(&nodes, "f").map(|n| n.content.as_str()), Some("F"));
        assert!(find_by_id(&nodes, "zz").is_none());
    }

    #[test]
    fn find_by_id_mut_edits_in_place() {
        let mut nodes = forest();
        if let Some(node) = find_by_id_mut(&mut nodes, "c") {
            node.content = "changed".to_string();
        }
        assert_eq!(find_by_id(&nodes, "c").map(|n| n.content.as_str()), Some("changed"));
    }

    #[test]
    fn find_parent_returns_direct_parent_only() {
        let nodes = forest();
        assert_eq!(find_parent(&nodes, "c").map(|n| n.id.as_str()), Some("b"));
        assert_eq!(find_parent(&nodes, "e").map(|n| n.id.as_str()), Some("a"));
        assert!(find_parent(&nodes, "a").is_none());
        assert!(find_parent(&nodes, "missing").is_none());
    }

    #[test]
    fn find_path_to_node_builds_root_chain() {
        let nodes = forest();
        assert_eq!(find_path_to_node(&nodes, "d"), Some(vec!["a".into(), "b".into(), "d".into()]));
        assert_eq!(find_path_to_node(&nodes, "f"), Some(vec!["f".into()]));
        assert_eq!(find_path_to_node(&nodes, "nope"), None);
    }

    #[test]
    fn remove_subtree_detaches_children_too() {
        let mut nodes = forest();
        assert!(remove_subtree(&mut nodes, "b"));
        assert!(find_by_id(&nodes, "b").is_none());
        assert!(find_by_id(&nodes, "c").is_none());
        assert!(find_by_id(&nodes, "e").is_some());
        assert!(!remove_subtree(&mut nodes, "b"));
    }

    #[test]
    fn sibling_position_reports_container_and_index() {
        let nodes = forest();
        let (siblings, idx) = sibling_position(&nodes, "d").expect("d is present");
        assert_eq!(idx, 1);
        assert_eq!(siblings[0].id, "c");

        let (roots, idx) = sibling_position(&nodes, "f").expect("f is present");
        assert_eq!((roots.len(), idx), (2, 1));
    }

    #[test]
    fn sibling_position_mut_allows_insertion() {
        let mut nodes = forest();
        if let Some((siblings, idx)) = sibling_position_mut(&mut nodes, "c") {
            siblings.insert(idx + 1, Node::new("new"));
        }
        let ids: Vec<&str> = find_by_id(&nodes, "b")
            .map(|b| b.children.iter().map(|n| n.id.as_str()).collect())
            .unwrap_or_default();
        assert_eq!(ids, ["c", "new", "d"]);
    }

    #[test]
    fn walk_is_pre_order() {
        let nodes = forest();
        let mut seen = Vec::new();
        walk(&nodes, &mut |n| seen.push(n.id.clone()));
        assert_eq!(seen, ["a", "b", "c", "d", "e", "f"]);
    }
}
