//! Lazy copying of template cell formats into the output stylesheet

use std::collections::HashMap;

use tracing::debug;

use crate::xml::{NodeId, XmlTree};

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

/// First number format id available to custom formats
const FIRST_CUSTOM_NUM_FMT: u32 = 164;

/// Indexed color that renders as black instead of the intended automatic fill
const SYSTEM_FOREGROUND_INDEX: &str = "64";
const SAFE_FILL_RGB: &str = "FFFFFFFF";

/// Template style identity to output style identity, per run
///
/// Every map is write-once: a key is created at most one time.
#[derive(Debug, Default)]
pub struct StyleCache {
    cell_formats: HashMap<u32, u32>,
    fonts: HashMap<u32, u32>,
    fills: HashMap<u32, u32>,
    borders: HashMap<u32, u32>,
    num_fmts: HashMap<u32, u32>,
}

impl StyleCache {
    pub fn get(&self, template_style: u32) -> Option<u32> {
        self.cell_formats.get(&template_style).copied()
    }

    /// Number of cell formats created so far
    pub fn created_count(&self) -> usize {
        self.cell_formats.len()
    }
}

/// Copies referenced formats from the template stylesheet on first use
#[derive(Debug)]
pub struct StyleCopier {
    template: Option<XmlTree>,
    out: XmlTree,
    cache: StyleCache,
    next_num_fmt: u32,
}

impl StyleCopier {
    pub fn new(template: Option<XmlTree>) -> Self {
        let out = skeleton(template.as_ref());
        let mut cache = StyleCache::default();
        // The skeleton's font 0 is the template's font 0.
        if template.is_some() {
            cache.fonts.insert(0, 0);
        }
        Self {
            template,
            out,
            cache,
            next_num_fmt: FIRST_CUSTOM_NUM_FMT,
        }
    }

    pub fn cache(&self) -> &StyleCache {
        &self.cache
    }

    /// Output cell format for a template cell format
    pub fn map(&mut self, template_style: u32) -> u32 {
        if let Some(id) = self.cache.get(template_style) {
            return id;
        }
        let Some(source) = self.template_entry("cellXfs", "xf", template_style) else {
            return 0;
        };

        let Some(template) = self.template.take() else {
            return 0;
        };
        let xf = self.out.import(&template, source);
        let font = attr_index(&template, source, "fontId");
        let fill = attr_index(&template, source, "fillId");
        let border = attr_index(&template, source, "borderId");
        let num_fmt = attr_index(&template, source, "numFmtId");

        let font = font.map(|i| self.map_font(&template, i)).unwrap_or(0);
        let fill = fill.map(|i| self.map_fill(&template, i)).unwrap_or(0);
        let border = border.map(|i| self.map_border(&template, i)).unwrap_or(0);
        let num_fmt = num_fmt.map(|i| self.map_num_fmt(&template, i)).unwrap_or(0);
        self.template = Some(template);

        self.out.set_attr(xf, "fontId", font.to_string());
        self.out.set_attr(xf, "fillId", fill.to_string());
        self.out.set_attr(xf, "borderId", border.to_string());
        self.out.set_attr(xf, "numFmtId", num_fmt.to_string());
        self.out.set_attr(xf, "xfId", "0");
        let id = self.append("cellXfs", xf);
        self.cache.cell_formats.insert(template_style, id);
        debug!(template_style, output_style = id, "created cell format");
        id
    }

    /// Finished stylesheet with all collection counts filled in
    pub fn finish(mut self) -> XmlTree {
        if let Some(root) = self.out.root_element() {
            for collection in self.out.child_elements(root).collect::<Vec<_>>() {
                let count = self.out.child_elements(collection).count();
                self.out.set_attr(collection, "count", count.to_string());
            }
        }
        self.out
    }

    fn template_entry(&self, collection: &str, item: &str, index: u32) -> Option<NodeId> {
        let template = self.template.as_ref()?;
        let root = template.root_element()?;
        let list = template.first_child_named(root, collection)?;
        template.children_named(list, item).get(index as usize).copied()
    }

    fn copy_entry(&mut self, template: &XmlTree, collection: &str, item: &str, index: u32) -> Option<u32> {
        let root = template.root_element()?;
        let list = template.first_child_named(root, collection)?;
        let source = *template.children_named(list, item).get(index as usize)?;
        let copy = self.out.import(template, source);
        if collection == "fills" {
            remediate_fill(&mut self.out, copy);
        }
        Some(self.append(collection, copy))
    }

    fn map_font(&mut self, template: &XmlTree, index: u32) -> u32 {
        if let Some(id) = self.cache.fonts.get(&index) {
            return *id;
        }
        let id = self.copy_entry(template, "fonts", "font", index).unwrap_or(0);
        self.cache.fonts.insert(index, id);
        id
    }

    fn map_fill(&mut self, template: &XmlTree, index: u32) -> u32 {
        // The first two fills are reserved (none, gray125) in every stylesheet.
        if index < 2 {
            return index;
        }
        if let Some(id) = self.cache.fills.get(&index) {
            return *id;
        }
        let id = self.copy_entry(template, "fills", "fill", index).unwrap_or(0);
        self.cache.fills.insert(index, id);
        id
    }

    fn map_border(&mut self, template: &XmlTree, index: u32) -> u32 {
        if let Some(id) = self.cache.borders.get(&index) {
            return *id;
        }
        let id = self.copy_entry(template, "borders", "border", index).unwrap_or(0);
        self.cache.borders.insert(index, id);
        id
    }

    fn map_num_fmt(&mut self, template: &XmlTree, id: u32) -> u32 {
        if id < FIRST_CUSTOM_NUM_FMT {
            return id;
        }
        if let Some(mapped) = self.cache.num_fmts.get(&id) {
            return *mapped;
        }
        let code = template
            .root_element()
            .and_then(|root| template.first_child_named(root, "numFmts"))
            .and_then(|list| {
                template
                    .children_named(list, "numFmt")
                    .into_iter()
                    .find(|n| attr_index(template, *n, "numFmtId") == Some(id))
            })
            .and_then(|n| template.attr(n, "formatCode"))
            .map(str::to_string);
        let Some(code) = code else {
            return 0;
        };
        let mapped = self.next_num_fmt;
        self.next_num_fmt += 1;
        let node = self.out.create_element(
            "numFmt",
            &[("numFmtId", mapped.to_string().as_str()), ("formatCode", code.as_str())],
        );
        self.append("numFmts", node);
        self.cache.num_fmts.insert(id, mapped);
        mapped
    }

    /// Append to an output collection and return the new item's index
    fn append(&mut self, collection: &str, node: NodeId) -> u32 {
        let Some(root) = self.out.root_element() else {
            return 0;
        };
        let list = match self.out.first_child_named(root, collection) {
            Some(list) => list,
            None => {
                let list = self.out.create_element(collection, &[]);
                match self.out.first_child_named(root, "fonts") {
                    Some(fonts) if collection == "numFmts" => self.out.insert_before(fonts, list),
                    _ => self.out.append_child(root, list),
                }
                list
            }
        };
        let index = self.out.child_elements(list).count();
        self.out.append_child(list, node);
        index as u32
    }
}

fn attr_index(tree: &XmlTree, node: NodeId, key: &str) -> Option<u32> {
    tree.attr(node, key).and_then(|v| v.parse().ok())
}

/// Force the system foreground color of a copied fill to plain white
fn remediate_fill(tree: &mut XmlTree, fill: NodeId) {
    let colors: Vec<NodeId> = tree
        .descendants(fill)
        .into_iter()
        .filter(|n| tree.is_element(*n, "fgColor"))
        .filter(|n| tree.attr(*n, "indexed") == Some(SYSTEM_FOREGROUND_INDEX))
        .collect();
    for color in colors {
        tree.remove_attr(color, "indexed");
        tree.set_attr(color, "rgb", SAFE_FILL_RGB);
        debug!("replaced system foreground fill color");
    }
}

/// Minimal stylesheet: one font, the reserved fills, one border, one format
fn skeleton(template: Option<&XmlTree>) -> XmlTree {
    let mut out = XmlTree::new();
    out.set_declaration(r#"xml version="1.0" encoding="UTF-8" standalone="yes""#);
    let root = out.create_element("styleSheet", &[("xmlns", MAIN_NS)]);
    let document = out.document();
    out.append_child(document, root);

    let fonts = out.create_element("fonts", &[]);
    out.append_child(root, fonts);
    let template_font = template.and_then(|t| {
        let list = t.first_child_named(t.root_element()?, "fonts")?;
        t.first_child_named(list, "font").map(|f| (t, f))
    });
    let font = match template_font {
        Some((t, f)) => out.import(t, f),
        None => match out.parse_fragment(r#"<font><sz val="11"/><name val="Calibri"/></font>"#) {
            Ok(nodes) if !nodes.is_empty() => nodes[0],
            _ => out.create_element("font", &[]),
        },
    };
    out.append_child(fonts, font);

    let fills = out.create_element("fills", &[]);
    out.append_child(root, fills);
    for pattern in ["none", "gray125"] {
        let fill = out.create_element("fill", &[]);
        let pattern_fill = out.create_element("patternFill", &[("patternType", pattern)]);
        out.append_child(fill, pattern_fill);
        out.append_child(fills, fill);
    }

    let borders = out.create_element("borders", &[]);
    out.append_child(root, borders);
    let border = out.create_element("border", &[]);
    for side in ["left", "right", "top", "bottom", "diagonal"] {
        let edge = out.create_element(side, &[]);
        out.append_child(border, edge);
    }
    out.append_child(borders, border);

    let style_xfs = out.create_element("cellStyleXfs", &[]);
    out.append_child(root, style_xfs);
    let base = out.create_element(
        "xf",
        &[("numFmtId", "0"), ("fontId", "0"), ("fillId", "0"), ("borderId", "0")],
    );
    out.append_child(style_xfs, base);

    let cell_xfs = out.create_element("cellXfs", &[]);
    out.append_child(root, cell_xfs);
    let default = out.create_element(
        "xf",
        &[("numFmtId", "0"), ("fontId", "0"), ("fillId", "0"), ("borderId", "0"), ("xfId", "0")],
    );
    out.append_child(cell_xfs, default);

    let cell_styles = out.create_element("cellStyles", &[]);
    out.append_child(root, cell_styles);
    let normal = out.create_element("cellStyle", &[("name", "Normal"), ("xfId", "0"), ("builtinId", "0")]);
    out.append_child(cell_styles, normal);
    out
}
