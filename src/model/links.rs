use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use super::outline::{Document, Page};
use super::tree;

static NODE_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[\[([^\[\]]+)\]\]\]").expect("valid node link regex"));
static PAGE_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\[\]]+)\]\]").expect("valid page link regex"));
static WEB_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]]+)\]\(([^\)]+)\)").expect("valid web link regex"));

/// A node whose text references some page or node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub source_page_id: String,
    pub source_page_name: String,
    pub source_node_id: String,
    pub source_content: String,
}

/// A link target found in node text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    Page(String),
    Node(String),
    Web { label: String, url: String },
}

/// A run of node text, either plain or one recognised link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkToken {
    Text(Range<usize>),
    Link { span: Range<usize>, target: LinkTarget },
}

/// Split `content` into plain text and link tokens, in order.
///
/// Node links win over page links, so `[[[node7]]]` is never also read as
/// `[[node7]]`. Web links are only looked for in the text between the two.
pub fn parse_tokens(content: &str) -> Vec<LinkToken> {
    let mut links: Vec<(Range<usize>, LinkTarget)> = Vec::new();

    let node_spans: Vec<Range<usize>> = NODE_LINK_RE
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            links.push((whole.range(), LinkTarget::Node(caps[1].to_string())));
            Some(whole.range())
        })
        .collect();

    let mut wiki_spans = node_spans.clone();
    for gap in gaps(content.len(), &node_spans) {
        for caps in PAGE_LINK_RE.captures_iter(&content[gap.clone()]) {
            let Some(whole) = caps.get(0) else { continue };
            let span = gap.start + whole.start()..gap.start + whole.end();
            wiki_spans.push(span.clone());
            links.push((span, LinkTarget::Page(caps[1].to_string())));
        }
    }
    wiki_spans.sort_by_key(|r| r.start);

    for gap in gaps(content.len(), &wiki_spans) {
        for caps in WEB_LINK_RE.captures_iter(&content[gap.clone()]) {
            let Some(whole) = caps.get(0) else { continue };
            links.push((
                gap.start + whole.start()..gap.start + whole.end(),
                LinkTarget::Web {
                    label: caps[1].to_string(),
                    url: caps[2].to_string(),
                },
            ));
        }
    }

    links.sort_by_key(|(span, _)| span.start);

    let mut tokens = Vec::with_capacity(links.len() * 2 + 1);
    let mut cursor = 0;
    for (span, target) in links {
        if span.start > cursor {
            tokens.push(LinkToken::Text(cursor..span.start));
        }
        cursor = span.end;
        tokens.push(LinkToken::Link { span, target });
    }
    if cursor < content.len() {
        tokens.push(LinkToken::Text(cursor..content.len()));
    }
    tokens
}

/// Page and node link targets in `content`, in order of appearance.
pub fn extract_links(content: &str) -> Vec<LinkTarget> {
    parse_tokens(content)
        .into_iter()
        .filter_map(|token| match token {
            LinkToken::Link {
                target: target @ (LinkTarget::Page(_) | LinkTarget::Node(_)),
                ..
            } => Some(target),
            _ => None,
        })
        .collect()
}

/// The link whose span covers byte offset `at`, if any.
pub fn link_at(content: &str, at: usize) -> Option<LinkTarget> {
    parse_tokens(content).into_iter().find_map(|token| match token {
        LinkToken::Link { span, target } if span.contains(&at) => Some(target),
        _ => None,
    })
}

/// Complement of the sorted, non-overlapping `spans` within `0..len`.
fn gaps(len: usize, spans: &[Range<usize>]) -> Vec<Range<usize>> {
    let mut out = Vec::with_capacity(spans.len() + 1);
    let mut cursor = 0;
    for span in spans {
        if span.start > cursor {
            out.push(cursor..span.start);
        }
        cursor = cursor.max(span.end);
    }
    if cursor < len {
        out.push(cursor..len);
    }
    out
}

/// Reverse link index over a whole document. Rebuilt from scratch per render.
#[derive(Debug, Default)]
pub struct LinkIndex {
    /// Page name -> nodes linking to it with `[[name]]`.
    pub page_links: HashMap<String, Vec<LinkRecord>>,
    /// Node id -> nodes linking to it with `[[[id]]]`.
    pub node_links: HashMap<String, Vec<LinkRecord>>,
}

/// Backlinks of one page, split the way the panel shows them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Backlinks {
    pub page_links: Vec<LinkRecord>,
    pub node_links: Vec<LinkRecord>,
}

impl Backlinks {
    pub fn len(&self) -> usize {
        self.page_links.len() + self.node_links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Page links first, then node links.
    pub fn iter(&self) -> impl Iterator<Item = &LinkRecord> {
        self.page_links.iter().chain(self.node_links.iter())
    }
}

impl LinkIndex {
    pub fn build(doc: &Document) -> Self {
        let mut index = Self::default();

        for page in &doc.pages {
            tree::walk(&page.nodes, &mut |node| {
                for target in extract_links(&node.content) {
                    let record = LinkRecord {
                        source_page_id: page.id.clone(),
                        source_page_name: page.name.clone(),
                        source_node_id: node.id.clone(),
                        source_content: node.content.clone(),
                    };
                    match target {
                        LinkTarget::Page(name) => {
                            index.page_links.entry(name).or_default().push(record)
                        }
                        LinkTarget::Node(id) => {
                            index.node_links.entry(id).or_default().push(record)
                        }
                        LinkTarget::Web { .. } => {}
                    }
                }
            });
        }

        index
    }

    /// Records linking to `page` by name, plus records linking to any of its nodes.
    pub fn backlinks(&self, page: &Page) -> Backlinks {
        let page_links = self.page_links.get(&page.name).cloned().unwrap_or_default();

        let mut node_links = Vec::new();
        tree::walk(&page.nodes, &mut |node| {
            if let Some(records) = self.node_links.get(&node.id) {
                node_links.extend(records.iter().cloned());
            }
        });

        Backlinks {
            page_links,
            node_links,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::outline::Node;

    fn page(id: &str, name: &str, nodes: Vec<Node>) -> Page {
        Page {
            id: id.to_string(),
            name: name.to_string(),
            nodes,
        }
    }

    fn doc(pages: Vec<Page>) -> Document {
        let current_page_id = pages[0].id.clone();
        Document {
            pages,
            current_page_id,
            focused_node_id: None,
            focus_path: Vec::new(),
        }
    }

    #[test]
    fn node_link_is_not_counted_as_page_link() {
        let targets = extract_links("See [[Project X]] and [[[node7]]]");
        assert_eq!(
            targets,
            vec![
                LinkTarget::Page("Project X".to_string()),
                LinkTarget::Node("node7".to_string()),
            ]
        );
    }

    #[test]
    fn repeated_links_are_all_reported() {
        let targets = extract_links("[[A]] [[A]] [[[n1]]][[[n1]]]");
        assert_eq!(targets.len(), 4);
    }

    #[test]
    fn unclosed_and_empty_links_are_text() {
        assert!(extract_links("[[open").is_empty());
        assert!(extract_links("[[]]").is_empty());
        assert!(extract_links("plain").is_empty());
    }

    #[test]
    fn tokens_cover_the_whole_string() {
        let content = "go [[Home]] or [docs](https://example.com) now";
        let tokens = parse_tokens(content);
        let rebuilt: String = tokens
            .iter()
            .map(|t| match t {
                LinkToken::Text(r) => &content[r.clone()],
                LinkToken::Link { span, .. } => &content[span.clone()],
            })
            .collect();
        assert_eq!(rebuilt, content);
        assert!(tokens.iter().any(|t| matches!(
            t,
            LinkToken::Link { target: LinkTarget::Web { url, .. }, .. } if url == "https://example.com"
        )));
    }

    #[test]
    fn link_at_finds_covering_span() {
        let content = "x [[Home]] y";
        assert_eq!(link_at(content, 4), Some(LinkTarget::Page("Home".to_string())));
        assert_eq!(link_at(content, 0), None);
        assert_eq!(link_at(content, 11), None);
    }

    #[test]
    fn index_keys_page_links_by_name_and_node_links_by_id() {
        let d = doc(vec![
            page("page1", "A", vec![Node::with_content("n1", "See [[Project X]] and [[[node7]]]")]),
            page("page2", "Project X", vec![Node::with_content("node7", "target")]),
        ]);
        let index = LinkIndex::build(&d);

        let page_records = &index.page_links["Project X"];
        assert_eq!(page_records.len(), 1);
        assert_eq!(page_records[0].source_node_id, "n1");
        assert_eq!(page_records[0].source_page_name, "A");
        assert_eq!(index.node_links["node7"].len(), 1);
        assert!(!index.page_links.contains_key("[node7"));
        assert!(!index.page_links.contains_key("node7"));
    }

    #[test]
    fn backlinks_union_page_and_node_records() {
        let mut root = Node::with_content("t1", "root");
        root.children.push(Node::with_content("t2", "child"));
        let d = doc(vec![
            page("page1", "Target", vec![root]),
            page(
                "page2",
                "Other",
                vec![
                    Node::with_content("s1", "about [[Target]]"),
                    Node::with_content("s2", "see [[[t2]]]"),
                    Node::with_content("s3", "see [[target]]"),
                ],
            ),
        ]);
        let index = LinkIndex::build(&d);
        let backlinks = index.backlinks(&d.pages[0]);

        assert_eq!(backlinks.page_links.len(), 1);
        assert_eq!(backlinks.page_links[0].source_node_id, "s1");
        assert_eq!(backlinks.node_links.len(), 1);
        assert_eq!(backlinks.node_links[0].source_node_id, "s2");
        assert_eq!(backlinks.len(), 2);
        let order: Vec<&str> = backlinks.iter().map(|r| r.source_node_id.as_str()).collect();
        assert_eq!(order, ["s1", "s2"]);
    }
}
