//! Paragraph text spread over `w:t` runs

use crate::placeholder;
use crate::xml::{NodeId, XmlTree};

/// The `w:t` elements of a paragraph with their text, in document order
pub(crate) struct Segments {
    nodes: Vec<NodeId>,
    texts: Vec<String>,
    starts: Vec<usize>,
}

impl Segments {
    pub(crate) fn of(tree: &XmlTree, paragraph: NodeId) -> Self {
        let nodes: Vec<NodeId> = tree
            .descendants(paragraph)
            .into_iter()
            .filter(|n| tree.is_element(*n, "w:t"))
            .collect();
        let texts: Vec<String> = nodes.iter().map(|n| tree.text_content(*n)).collect();
        let mut starts = Vec::with_capacity(texts.len());
        let mut offset = 0;
        for text in &texts {
            starts.push(offset);
            offset += text.len();
        }
        Self {
            nodes,
            texts,
            starts,
        }
    }

    pub(crate) fn text(&self) -> String {
        self.texts.concat()
    }

    /// Splice `replacement` over the byte range `start..end` of the joined text
    ///
    /// The replacement lands in the segment where the range starts, so it takes
    /// that run's formatting; covered text is cut from later segments.
    fn splice(&mut self, start: usize, end: usize, replacement: &str) {
        let Some(first) = (0..self.texts.len())
            .rev()
            .find(|k| self.starts[*k] <= start && start < self.starts[*k] + self.texts[*k].len())
        else {
            return;
        };
        let local_start = start - self.starts[first];
        let first_len = self.texts[first].len();
        let local_end = (end - self.starts[first]).min(first_len);
        self.texts[first].replace_range(local_start..local_end, replacement);

        for k in first + 1..self.texts.len() {
            if self.starts[k] >= end {
                break;
            }
            let cut = (end - self.starts[k]).min(self.texts[k].len());
            self.texts[k].replace_range(..cut, "");
        }
    }

    fn write_back(&self, tree: &mut XmlTree, original: &Segments) {
        for (k, node) in self.nodes.iter().enumerate() {
            if self.texts[k] != original.texts[k] {
                tree.set_text_content(*node, self.texts[k].clone());
                tree.set_attr(*node, "xml:space", "preserve");
            }
        }
    }
}

/// Joined text of a paragraph's runs
pub(crate) fn paragraph_text(tree: &XmlTree, paragraph: NodeId) -> String {
    Segments::of(tree, paragraph).text()
}

/// Substitute every inline placeholder in a paragraph
///
/// Returns whether anything changed.
pub(crate) fn replace_in_paragraph<E, F>(
    tree: &mut XmlTree,
    paragraph: NodeId,
    fallback: &str,
    mut resolve: F,
) -> Result<bool, E>
where
    F: FnMut(&str) -> Result<Option<String>, E>,
{
    let original = Segments::of(tree, paragraph);
    let joined = original.text();
    let found = placeholder::find_placeholders(&joined);
    if found.is_empty() {
        return Ok(false);
    }

    let mut replacements = Vec::with_capacity(found.len());
    for m in &found {
        let text = resolve(&m.name)?.unwrap_or_else(|| fallback.to_string());
        replacements.push(text);
    }

    let mut edited = Segments {
        nodes: original.nodes.clone(),
        texts: original.texts.clone(),
        starts: original.starts.clone(),
    };
    for (m, text) in found.iter().zip(&replacements).rev() {
        edited.splice(m.range.start, m.range.end, text);
    }
    edited.write_back(tree, &original);
    Ok(true)
}
