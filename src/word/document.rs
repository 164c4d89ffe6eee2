//! A word-processing package opened for editing

use tracing::debug;

use crate::error::GenerateError;
use crate::package::{resolve_part_name, Package, PackageError};
use crate::xml::{NodeId, XmlTree};

pub(crate) const REL_HEADER: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header";
pub(crate) const REL_FOOTER: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer";

/// One XML part whose content blocks are processed
#[derive(Debug, Clone)]
pub(crate) struct ContentPart {
    pub(crate) name: String,
    pub(crate) tree: XmlTree,
}

/// The main document part plus its headers and footers
#[derive(Debug, Clone)]
pub struct WordDocument {
    pub(crate) package: Package,
    pub(crate) parts: Vec<ContentPart>,
}

impl WordDocument {
    /// Open a `.docx` package
    pub fn open(bytes: &[u8]) -> Result<Self, GenerateError> {
        let package = Package::read(bytes)?;
        let main = package.main_part()?;
        let mut parts = vec![ContentPart {
            tree: package.xml_part(&main)?,
            name: main.clone(),
        }];

        let rels = package.relationships(&main)?;
        for rel_type in [REL_HEADER, REL_FOOTER] {
            for (_, target) in rels.of_type(rel_type) {
                let name = resolve_part_name(&main, &target);
                match package.xml_part(&name) {
                    Ok(tree) => parts.push(ContentPart { name, tree }),
                    Err(PackageError::MissingPart(missing)) => {
                        debug!(part = %missing, "skipping missing header/footer part");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(Self { package, parts })
    }

    pub fn main_part_name(&self) -> &str {
        &self.parts[0].name
    }

    /// Parsed tree of the main document part
    pub fn main_tree(&self) -> &XmlTree {
        &self.parts[0].tree
    }

    pub fn main_tree_mut(&mut self) -> &mut XmlTree {
        &mut self.parts[0].tree
    }

    /// Names of every processed part, main part first
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|p| p.name.as_str())
    }

    /// Parsed tree of a processed part
    pub fn part_tree(&self, name: &str) -> Option<&XmlTree> {
        self.parts.iter().find(|p| p.name == name).map(|p| &p.tree)
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    /// Plain text of every paragraph in the main part, in document order
    pub fn paragraphs(&self) -> Vec<String> {
        let tree = self.main_tree();
        tree.descendants(tree.document())
            .into_iter()
            .filter(|n| tree.is_element(*n, "w:p"))
            .map(|p| super::text::paragraph_text(tree, p))
            .collect()
    }

    /// Serialize all parts back into package bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, GenerateError> {
        let mut package = self.package.clone();
        for part in &self.parts {
            package.set_xml_part(&part.name, &part.tree);
        }
        Ok(package.to_bytes()?)
    }
}

/// Element whose children are the blocks of a part
pub(crate) fn block_container(tree: &XmlTree) -> Option<NodeId> {
    let root = tree.root_element()?;
    if tree.is_element(root, "w:document") {
        tree.first_child_named(root, "w:body")
    } else {
        Some(root)
    }
}

/// Paragraph and table children of a container, in order
pub(crate) fn blocks_of(tree: &XmlTree, container: NodeId) -> Vec<NodeId> {
    tree.child_elements(container)
        .filter(|c| tree.is_element(*c, "w:p") || tree.is_element(*c, "w:tbl"))
        .collect()
}
