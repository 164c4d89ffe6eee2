//! OOXML package access: zip parts, relationships and content types

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use thiserror::Error;
use zip::write::SimpleFileOptions;

use crate::xml::{XmlError, XmlTree};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const ROOT_RELS_PART: &str = "_rels/.rels";

pub const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub const REL_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
pub const REL_HYPERLINK: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";

const RELS_NAMESPACE: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const CONTENT_TYPES_NAMESPACE: &str =
    "http://schemas.openxmlformats.org/package/2006/content-types";

/// Errors that can occur while reading or writing a package
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("invalid package archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("failed to read package entry: {0}")]
    Io(#[from] std::io::Error),

    #[error("package part not found: {0}")]
    MissingPart(String),

    #[error("invalid XML in part {part}: {source}")]
    Xml {
        part: String,
        #[source]
        source: XmlError,
    },
}

/// An opened OOXML package; parts keep their archive order
#[derive(Debug, Clone, Default)]
pub struct Package {
    parts: BTreeMap<String, Vec<u8>>,
    order: Vec<String>,
}

impl Package {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a package from zip bytes
    pub fn read(bytes: &[u8]) -> Result<Self, PackageError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        let mut package = Package::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            package.set_part(&name, data);
        }
        Ok(package)
    }

    /// Write the package as zip bytes
    ///
    /// Entries carry a fixed timestamp so identical packages produce identical
    /// bytes. The content-types part always comes first.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PackageError> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());

        let ordered = std::iter::once(CONTENT_TYPES_PART)
            .filter(|name| self.parts.contains_key(*name))
            .chain(
                self.order
                    .iter()
                    .map(String::as_str)
                    .filter(|name| *name != CONTENT_TYPES_PART),
            );
        for name in ordered {
            writer.start_file(name, options)?;
            writer.write_all(&self.parts[name])?;
        }
        Ok(writer.finish()?.into_inner())
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parts.contains_key(name)
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        if self.parts.insert(name.to_string(), data).is_none() {
            self.order.push(name.to_string());
        }
    }

    /// Parse a part as XML
    pub fn xml_part(&self, name: &str) -> Result<XmlTree, PackageError> {
        let bytes = self
            .part(name)
            .ok_or_else(|| PackageError::MissingPart(name.to_string()))?;
        XmlTree::parse(bytes).map_err(|source| PackageError::Xml {
            part: name.to_string(),
            source,
        })
    }

    pub fn set_xml_part(&mut self, name: &str, tree: &XmlTree) {
        self.set_part(name, tree.to_bytes());
    }

    /// Name of the main document part (`word/document.xml`, `xl/workbook.xml`, ...)
    pub fn main_part(&self) -> Result<String, PackageError> {
        let rels = self.relationships("")?;
        rels.first_of_type(REL_OFFICE_DOCUMENT)
            .map(|(_, target)| resolve_part_name("", &target))
            .ok_or_else(|| PackageError::MissingPart("officeDocument relationship".to_string()))
    }

    /// Relationships of a part; an empty set when the part has none
    ///
    /// The empty part name addresses the package-level relationships.
    pub fn relationships(&self, part: &str) -> Result<Relationships, PackageError> {
        let rels_name = rels_part_name(part);
        if !self.contains(&rels_name) {
            return Ok(Relationships::empty());
        }
        Ok(Relationships {
            tree: self.xml_part(&rels_name)?,
        })
    }

    pub fn set_relationships(&mut self, part: &str, rels: &Relationships) {
        self.set_xml_part(&rels_part_name(part), &rels.tree);
    }

    /// Make sure files with `extension` have a default content type
    pub fn ensure_default_content_type(
        &mut self,
        extension: &str,
        content_type: &str,
    ) -> Result<(), PackageError> {
        let mut types = self.content_types()?;
        let root = types.root_element().ok_or_else(|| missing_root(CONTENT_TYPES_PART))?;
        let exists = types.children_named(root, "Default").into_iter().any(|d| {
            types
                .attr(d, "Extension")
                .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        });
        if !exists {
            let node = types.create_element(
                "Default",
                &[("Extension", extension), ("ContentType", content_type)],
            );
            let first = types.child_elements(root).next();
            match first {
                Some(first) => types.insert_before(first, node),
                None => types.append_child(root, node),
            }
            self.set_xml_part(CONTENT_TYPES_PART, &types);
        }
        Ok(())
    }

    /// Register a content-type override for a part
    pub fn add_override(&mut self, part: &str, content_type: &str) -> Result<(), PackageError> {
        let mut types = self.content_types()?;
        let root = types.root_element().ok_or_else(|| missing_root(CONTENT_TYPES_PART))?;
        let part_name = format!("/{}", part.trim_start_matches('/'));
        for existing in types.children_named(root, "Override") {
            if types.attr(existing, "PartName") == Some(part_name.as_str()) {
                types.detach(existing);
            }
        }
        let node = types.create_element(
            "Override",
            &[("PartName", part_name.as_str()), ("ContentType", content_type)],
        );
        types.append_child(root, node);
        self.set_xml_part(CONTENT_TYPES_PART, &types);
        Ok(())
    }

    fn content_types(&self) -> Result<XmlTree, PackageError> {
        if self.contains(CONTENT_TYPES_PART) {
            return self.xml_part(CONTENT_TYPES_PART);
        }
        let mut tree = XmlTree::new();
        tree.set_declaration(r#"xml version="1.0" encoding="UTF-8" standalone="yes""#);
        let root = tree.create_element("Types", &[("xmlns", CONTENT_TYPES_NAMESPACE)]);
        let document = tree.document();
        tree.append_child(document, root);
        Ok(tree)
    }
}

fn missing_root(part: &str) -> PackageError {
    PackageError::MissingPart(format!("{part} (no root element)"))
}

/// Relationship part of a package part (`word/_rels/document.xml.rels`)
pub fn rels_part_name(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None if part.is_empty() => ROOT_RELS_PART.to_string(),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target relative to the part that owns it
pub fn resolve_part_name(base_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = match base_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// The relationships of one package part
#[derive(Debug, Clone)]
pub struct Relationships {
    tree: XmlTree,
}

impl Relationships {
    pub fn empty() -> Self {
        let mut tree = XmlTree::new();
        tree.set_declaration(r#"xml version="1.0" encoding="UTF-8" standalone="yes""#);
        let root = tree.create_element("Relationships", &[("xmlns", RELS_NAMESPACE)]);
        let document = tree.document();
        tree.append_child(document, root);
        Self { tree }
    }

    fn entries(&self) -> Vec<crate::xml::NodeId> {
        match self.tree.root_element() {
            Some(root) => self.tree.children_named(root, "Relationship"),
            None => Vec::new(),
        }
    }

    /// Target of a relationship id
    pub fn target(&self, id: &str) -> Option<&str> {
        self.entries()
            .into_iter()
            .find(|e| self.tree.attr(*e, "Id") == Some(id))
            .and_then(|e| self.tree.attr(e, "Target"))
    }

    /// Whether the relationship points outside the package
    pub fn is_external(&self, id: &str) -> bool {
        self.entries()
            .into_iter()
            .find(|e| self.tree.attr(*e, "Id") == Some(id))
            .and_then(|e| self.tree.attr(e, "TargetMode"))
            == Some("External")
    }

    /// All `(id, target)` pairs of a relationship type, in declaration order
    pub fn of_type(&self, rel_type: &str) -> Vec<(String, String)> {
        self.entries()
            .into_iter()
            .filter(|e| self.tree.attr(*e, "Type") == Some(rel_type))
            .filter_map(|e| {
                Some((
                    self.tree.attr(e, "Id")?.to_string(),
                    self.tree.attr(e, "Target")?.to_string(),
                ))
            })
            .collect()
    }

    pub fn first_of_type(&self, rel_type: &str) -> Option<(String, String)> {
        self.of_type(rel_type).into_iter().next()
    }

    /// Add a relationship and return its new id
    pub fn add(&mut self, rel_type: &str, target: &str, external: bool) -> String {
        let taken: Vec<String> = self
            .entries()
            .into_iter()
            .filter_map(|e| self.tree.attr(e, "Id").map(str::to_string))
            .collect();
        let id = (1..)
            .map(|n| format!("rId{n}"))
            .find(|candidate| !taken.contains(candidate))
            .unwrap_or_else(|| "rId0".to_string());

        let mut attrs = vec![("Id", id.as_str()), ("Type", rel_type), ("Target", target)];
        if external {
            attrs.push(("TargetMode", "External"));
        }
        let node = self.tree.create_element("Relationship", &attrs);
        if let Some(root) = self.tree.root_element() {
            self.tree.append_child(root, node);
        }
        id
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
