//! Document traversal in the two addressing modes.
//!
//! The device counts only *significant* text nodes in document order, while
//! CFI steps count raw children. The two must never share a filter.

use super::arena::{Document, NodeData, NodeId};

/// Whether a text node carries content the device would address.
pub fn is_significant_text(text: &str) -> bool {
    !(text == "\n" || text == " " || text == "\u{a0}" || text.trim().is_empty())
}

/// Lazy pre-order walk over the significant text nodes under `root`.
///
/// Comments and processing instructions are never yielded, whitespace-only
/// text is skipped, and nothing inside a `<figure>` is visited.
pub struct SignificantTextNodes<'a> {
    dom: &'a Document,
    stack: Vec<NodeId>,
}

impl<'a> SignificantTextNodes<'a> {
    fn new(dom: &'a Document, root: NodeId) -> Self {
        let stack = if is_figure(dom, root) {
            Vec::new()
        } else {
            let mut children: Vec<_> = dom.children(root).collect();
            children.reverse();
            children
        };
        Self { dom, stack }
    }
}

impl Iterator for SignificantTextNodes<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        while let Some(id) = self.stack.pop() {
            let Some(node) = self.dom.get(id) else {
                continue;
            };
            match &node.data {
                NodeData::Element { name, .. } => {
                    if name.local.as_ref() == "figure" {
                        continue;
                    }
                    let start = self.stack.len();
                    self.stack.extend(self.dom.children(id));
                    self.stack[start..].reverse();
                }
                NodeData::Text(text) if is_significant_text(text) => return Some(id),
                _ => {}
            }
        }
        None
    }
}

/// Significant text nodes under `root`, in document order.
///
/// Restartable: each call starts a fresh walk.
pub fn significant_text_nodes(dom: &Document, root: NodeId) -> SignificantTextNodes<'_> {
    SignificantTextNodes::new(dom, root)
}

fn is_figure(dom: &Document, id: NodeId) -> bool {
    dom.element_name(id).is_some_and(|n| n.as_ref() == "figure")
}

/// Element children of `node`, as CFI intermediate steps count them.
pub fn element_children(dom: &Document, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    dom.children(node).filter(move |&c| dom.is_element(c))
}

/// Children addressable by a CFI terminal step: elements and text, unfiltered.
///
/// Only comments, processing instructions and doctypes are left out;
/// whitespace text and `<figure>` content are counted.
pub fn addressable_children(dom: &Document, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    dom.children(node)
        .filter(move |&c| dom.is_element(c) || dom.is_text(c))
}

/// Ancestors of `node` from the document root down to its parent.
pub fn ancestors(dom: &Document, node: NodeId) -> Vec<NodeId> {
    let mut chain = Vec::new();
    let mut current = dom.parent(node);
    while let Some(id) = current {
        chain.push(id);
        current = dom.parent(id);
    }
    chain.reverse();
    chain
}
