//! XML serialization of the arena tree

use quick_xml::escape::{escape, partial_escape};

use super::{NodeId, NodeKind, XmlTree};

pub(super) fn write(tree: &XmlTree) -> String {
    let mut out = String::new();
    if let Some(declaration) = tree.declaration() {
        out.push_str("<?");
        out.push_str(declaration);
        out.push_str("?>");
    }
    for child in tree.children(tree.document()) {
        write_node(tree, *child, &mut out);
    }
    out
}

pub(super) fn write_node(tree: &XmlTree, id: NodeId, out: &mut String) {
    match tree.kind(id) {
        NodeKind::Document => {
            for child in tree.children(id) {
                write_node(tree, *child, out);
            }
        }
        NodeKind::Element { name, attrs } => {
            out.push('<');
            out.push_str(name);
            for (key, value) in attrs {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                out.push_str(&escape(value.as_str()));
                out.push('"');
            }
            let children = tree.children(id);
            if children.is_empty() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for child in children {
                write_node(tree, *child, out);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        NodeKind::Text(text) => out.push_str(&partial_escape(text.as_str())),
        NodeKind::Raw(raw) => out.push_str(raw),
    }
}
