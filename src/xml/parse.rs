//! XML parsing into the arena tree

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use super::{NodeId, NodeKind, XmlTree};

/// Errors raised while reading XML parts
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Syntax(#[from] quick_xml::Error),

    #[error("malformed XML attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("unbalanced XML tags")]
    Unbalanced,
}

pub(super) fn parse(bytes: &[u8]) -> Result<XmlTree, XmlError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(false);

    let mut tree = XmlTree::new();
    let mut stack = vec![tree.document()];
    let mut buf = Vec::new();

    loop {
        let parent = *stack.last().ok_or(XmlError::Unbalanced)?;
        match reader.read_event_into(&mut buf)? {
            Event::Decl(decl) => {
                tree.declaration = Some(String::from_utf8_lossy(&decl).into_owned());
            }
            Event::Start(start) => {
                let id = element(&mut tree, &start)?;
                tree.append_child(parent, id);
                stack.push(id);
            }
            Event::Empty(start) => {
                let id = element(&mut tree, &start)?;
                tree.append_child(parent, id);
            }
            Event::End(_) => {
                if stack.len() <= 1 {
                    return Err(XmlError::Unbalanced);
                }
                stack.pop();
            }
            Event::Text(text) => {
                let value = text.unescape()?;
                if !value.is_empty() {
                    let id = tree.create_text(value.into_owned());
                    tree.append_child(parent, id);
                }
            }
            Event::CData(data) => {
                let id = tree.create_text(String::from_utf8_lossy(&data).into_owned());
                tree.append_child(parent, id);
            }
            Event::Comment(comment) => {
                let raw = format!("<!--{}-->", String::from_utf8_lossy(&comment));
                let id = tree.push(NodeKind::Raw(raw));
                tree.append_child(parent, id);
            }
            Event::PI(pi) => {
                let raw = format!("<?{}?>", String::from_utf8_lossy(&pi));
                let id = tree.push(NodeKind::Raw(raw));
                tree.append_child(parent, id);
            }
            Event::DocType(doctype) => {
                let raw = format!("<!DOCTYPE {}>", String::from_utf8_lossy(&doctype));
                let id = tree.push(NodeKind::Raw(raw));
                tree.append_child(parent, id);
            }
            Event::Eof => break,
        }
        buf.clear();
    }

    if stack.len() != 1 {
        return Err(XmlError::Unbalanced);
    }
    Ok(tree)
}

fn element(tree: &mut XmlTree, start: &BytesStart<'_>) -> Result<NodeId, XmlError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attrs.push((key, value));
    }
    Ok(tree.push(NodeKind::Element { name, attrs }))
}
