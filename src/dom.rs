//! Page document: a `scraper` parse edited in place.
//!
//! Node handles are `ego_tree` ids into the parsed tree. Detached nodes
//! stay in the tree's storage but are unreachable from the root, so every
//! lookup here starts from the root element.

use std::sync::LazyLock;

use ego_tree::NodeRef;
use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::{Attribute, LocalName, Namespace, QualName};
use scraper::node::{Element, Text};
use scraper::{Html, Node, Selector};
use tracing::warn;

pub use ego_tree::NodeId;

const HTML_NS: &str = "http://www.w3.org/1999/xhtml";

static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static PRIMARY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("article, main").unwrap());

const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head", "title"];
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table", "tr", "ul",
];

#[derive(Debug)]
pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
        }
    }

    pub fn root(&self) -> NodeId {
        self.html.tree.root().id()
    }

    fn node(&self, id: NodeId) -> Option<NodeRef<'_, Node>> {
        self.html.tree.get(id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent().map(|p| p.id())
    }

    #[cfg(test)]
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .map(|n| n.children().map(|c| c.id()).collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.node(id)?.value().as_element().map(Element::name)
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.node(id)?.value().as_text().map(|t| &*t.text)
    }

    /// Reachable from the document root.
    #[cfg(test)]
    pub fn is_attached(&self, id: NodeId) -> bool {
        let root = self.root();
        self.node(id)
            .is_some_and(|n| n.id() == root || n.ancestors().any(|a| a.id() == root))
    }

    /// Attached elements matching `selector`, in document order.
    pub fn select(&self, selector: &Selector) -> Vec<NodeId> {
        self.html
            .root_element()
            .select(selector)
            .map(|el| el.id())
            .collect()
    }

    pub fn select_first(&self, selector: &Selector) -> Option<NodeId> {
        self.html.root_element().select(selector).next().map(|el| el.id())
    }

    /// Like `select_first`, for ad-hoc CSS. Invalid selectors match nothing.
    #[cfg(test)]
    pub fn first(&self, css: &str) -> Option<NodeId> {
        let selector = Selector::parse(css).ok()?;
        self.select_first(&selector)
    }

    pub fn body(&self) -> Option<NodeId> {
        self.select_first(&BODY)
    }

    pub fn title(&self) -> Option<String> {
        let t = self.text_content(self.select_first(&TITLE)?);
        let t = t.trim();
        (!t.is_empty()).then(|| t.to_string())
    }

    /// `article`/`main` if the page has one, else `body`.
    pub fn primary_content(&self) -> NodeId {
        self.select_first(&PRIMARY)
            .or_else(|| self.body())
            .unwrap_or_else(|| self.root())
    }

    /// Concatenated text of every text node under `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        let Some(node) = self.node(id) else {
            return String::new();
        };
        node.descendants()
            .filter_map(|n| n.value().as_text())
            .map(|t| &*t.text)
            .collect()
    }

    /// Rendered-text approximation: hidden elements skipped, block
    /// elements and `<br>` break lines.
    pub fn inner_text(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(node) = self.node(id) {
            collect_inner_text(node, &mut out);
        }
        out.trim().to_string()
    }

    /// Non-blank text nodes under `id`, skipping anything inside an
    /// element named in `skip`.
    pub fn text_nodes(&self, id: NodeId, skip: &[&str]) -> Vec<NodeId> {
        let mut out = Vec::new();
        if let Some(node) = self.node(id) {
            collect_text_nodes(node, skip, &mut out);
        }
        out
    }

    // ── Mutation ──

    /// New text node placed right before `anchor`. `None` if `anchor` has
    /// no parent.
    pub fn insert_text_before(&mut self, anchor: NodeId, text: &str) -> Option<NodeId> {
        self.parent(anchor)?;
        let mut node = self.html.tree.get_mut(anchor)?;
        let created = node.insert_before(Node::Text(Text { text: text.into() }));
        Some(created.id())
    }

    /// New `<name attrs..>text</name>` placed right before `anchor`.
    pub fn insert_element_before(
        &mut self,
        anchor: NodeId,
        name: &str,
        attrs: &[(&str, &str)],
        text: &str,
    ) -> Option<NodeId> {
        self.parent(anchor)?;
        let mut node = self.html.tree.get_mut(anchor)?;
        let mut created = node.insert_before(html_element(name, attrs));
        created.append(Node::Text(Text { text: text.into() }));
        Some(created.id())
    }

    pub fn detach(&mut self, id: NodeId) {
        if let Some(mut node) = self.html.tree.get_mut(id) {
            node.detach();
        }
    }

    /// Merge adjacent text nodes and drop empty ones.
    pub fn normalize(&mut self) {
        let texts: Vec<NodeId> = self
            .html
            .tree
            .root()
            .descendants()
            .filter(|n| n.value().is_text())
            .map(|n| n.id())
            .collect();

        for id in texts {
            let Some(node) = self.node(id) else {
                continue;
            };
            let prev = node
                .prev_sibling()
                .filter(|p| p.value().is_text())
                .map(|p| p.id());
            let content = self.text(id).unwrap_or_default().to_string();

            if content.is_empty() {
                self.detach(id);
            } else if let Some(prev) = prev {
                if let Some(mut p) = self.html.tree.get_mut(prev) {
                    if let Node::Text(t) = p.value() {
                        t.text.push_slice(&content);
                    }
                }
                self.detach(id);
            }
        }
    }

    // ── Serialization ──

    /// Serialize with the same scripting mode the document was parsed in,
    /// so raw-text `<noscript>` content is written back unescaped.
    pub fn to_html(&self) -> String {
        let opts = SerializeOpts {
            scripting_enabled: true,
            traversal_scope: TraversalScope::IncludeNode,
            create_missing_parent: false,
        };
        let mut buf = Vec::new();
        if let Err(e) = serialize(&mut buf, &self.html, opts) {
            warn!("HTML serialization stopped early: {}", e);
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

fn html_element(name: &str, attrs: &[(&str, &str)]) -> Node {
    let attributes = attrs
        .iter()
        .map(|&(k, v)| Attribute {
            name: QualName::new(None, Namespace::from(""), LocalName::from(k)),
            value: v.into(),
        })
        .collect();
    Node::Element(Element::new(
        QualName::new(None, Namespace::from(HTML_NS), LocalName::from(name)),
        attributes,
    ))
}

fn collect_inner_text(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(t) => out.push_str(&t.text),
        Node::Element(el) => {
            let name = el.name();
            if HIDDEN_ELEMENTS.contains(&name) {
                return;
            }
            if name == "br" {
                out.push('\n');
                return;
            }
            let block = BLOCK_ELEMENTS.contains(&name);
            if block {
                line_break(out);
            }
            for child in node.children() {
                collect_inner_text(child, out);
            }
            if block {
                line_break(out);
            }
        }
        Node::Document | Node::Fragment => {
            for child in node.children() {
                collect_inner_text(child, out);
            }
        }
        _ => {}
    }
}

fn collect_text_nodes(node: NodeRef<'_, Node>, skip: &[&str], out: &mut Vec<NodeId>) {
    for child in node.children() {
        match child.value() {
            Node::Text(t) if !t.text.trim().is_empty() => out.push(child.id()),
            Node::Element(el) if !skip.contains(&el.name()) => {
                collect_text_nodes(child, skip, out)
            }
            _ => {}
        }
    }
}

fn line_break(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}
