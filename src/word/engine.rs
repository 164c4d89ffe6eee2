//! Block walk, loop unrolling and custom block dispatch

use std::sync::Arc;

use tracing::{debug, trace};

use super::document::{block_container, blocks_of, WordDocument};
use super::text::{paragraph_text, replace_in_paragraph};
use crate::error::{GenerateError, TemplateError};
use crate::image::ImageStrategy;
use crate::package::Package;
use crate::placeholder::{self, Marker};
use crate::resolve::{Custom, Data, IterationScope, Resolver, ResolverSet};
use crate::xml::{NodeId, XmlError, XmlTree};

/// What a custom handler sees of the word document
pub struct BlockContext<'a> {
    tree: &'a mut XmlTree,
    package: &'a mut Package,
    part: &'a str,
    block: NodeId,
    custom: &'a Custom,
    images: &'a dyn ImageStrategy,
    fallback: &'a str,
}

impl<'a> BlockContext<'a> {
    /// Name of the placeholder being replaced
    pub fn name(&self) -> &str {
        self.custom.name()
    }

    /// Scope the placeholder was resolved in, without custom handlers
    pub fn scope(&self) -> &dyn Resolver {
        self.custom.scope().as_ref()
    }

    /// The marker paragraph
    pub fn block(&self) -> NodeId {
        self.block
    }

    /// Package part holding the block
    pub fn part(&self) -> &'a str {
        self.part
    }

    pub fn tree(&self) -> &XmlTree {
        &*self.tree
    }

    pub fn tree_mut(&mut self) -> &mut XmlTree {
        &mut *self.tree
    }

    pub fn package(&self) -> &Package {
        &*self.package
    }

    pub fn package_mut(&mut self) -> &mut Package {
        &mut *self.package
    }

    pub fn images(&self) -> &'a dyn ImageStrategy {
        self.images
    }

    /// Text rendered for values that cannot be shown
    pub fn fallback(&self) -> &'a str {
        self.fallback
    }

    /// Parse `fragment` and insert its nodes before the marker block
    pub fn insert_before_block(&mut self, fragment: &str) -> Result<Vec<NodeId>, XmlError> {
        let nodes = self.tree.parse_fragment(fragment)?;
        for node in &nodes {
            self.tree.insert_before(self.block, *node);
        }
        Ok(nodes)
    }

    /// Detach the marker block from the document
    pub fn remove_block(&mut self) {
        self.tree.detach(self.block);
    }

    /// Replace the block's runs with one run of plain text
    ///
    /// Paragraph properties and the first run's formatting are kept.
    pub fn replace_block_text(&mut self, text: &str) {
        let tree = &mut *self.tree;
        let block = self.block;
        let runs = tree.children_named(block, "w:r");
        let first_props = runs
            .first()
            .and_then(|r| tree.first_child_named(*r, "w:rPr"));
        let run_props = first_props.map(|props| tree.deep_clone(props));
        for child in tree.child_elements(block).collect::<Vec<_>>() {
            if !tree.is_element(child, "w:pPr") {
                tree.detach(child);
            }
        }
        let run = tree.create_element("w:r", &[]);
        if let Some(props) = run_props {
            tree.append_child(run, props);
        }
        let t = tree.create_element("w:t", &[("xml:space", "preserve")]);
        let content = tree.create_text(text);
        tree.append_child(t, content);
        tree.append_child(run, t);
        tree.append_child(block, run);
    }
}

/// Renders word documents against a resolver
pub struct WordEngine<'a> {
    images: &'a dyn ImageStrategy,
    fallback: &'a str,
}

impl<'a> WordEngine<'a> {
    pub fn new(images: &'a dyn ImageStrategy) -> Self {
        Self {
            images,
            fallback: placeholder::FALLBACK,
        }
    }

    pub fn with_fallback(mut self, fallback: &'a str) -> Self {
        self.fallback = fallback;
        self
    }

    /// Process the main part, then each header and footer
    pub fn render(&self, doc: &mut WordDocument, resolver: &dyn Resolver) -> Result<(), GenerateError> {
        let WordDocument { package, parts } = doc;
        for part in parts.iter_mut() {
            let Some(container) = block_container(&part.tree) else {
                continue;
            };
            debug!(part = %part.name, "processing word part");
            let blocks = blocks_of(&part.tree, container);
            let mut walk = Walk {
                tree: &mut part.tree,
                package: &mut *package,
                part: &part.name,
                images: self.images,
                fallback: self.fallback,
            };
            walk.process_blocks(&blocks, resolver)?;
        }
        Ok(())
    }
}

/// Mutable state of one part being rendered
struct Walk<'w> {
    tree: &'w mut XmlTree,
    package: &'w mut Package,
    part: &'w str,
    images: &'w dyn ImageStrategy,
    fallback: &'w str,
}

impl Walk<'_> {
    fn process_blocks(&mut self, blocks: &[NodeId], resolver: &dyn Resolver) -> Result<(), GenerateError> {
        let mut i = 0;
        while i < blocks.len() {
            let block = blocks[i];
            if self.tree.is_element(block, "w:tbl") {
                self.process_table(block, resolver)?;
                i += 1;
                continue;
            }

            let text = paragraph_text(self.tree, block);
            match placeholder::sole_marker(&text) {
                Some(Marker::End(name)) => {
                    return Err(TemplateError::UnmatchedLoopEnd {
                        name: name.to_string(),
                    }
                    .into());
                }
                Some(Marker::Start(name)) => {
                    let end = find_loop_end(self.tree, blocks, i, name);
                    match (resolver.resolve(name)?, end) {
                        (Some(Data::Set(set)), Some(end)) => {
                            self.unroll(name, &set, blocks[i], &blocks[i + 1..end], blocks[end])?;
                            i = end + 1;
                            continue;
                        }
                        (Some(Data::Set(_)), None) => {
                            return Err(TemplateError::MissingLoopEnd {
                                name: name.to_string(),
                            }
                            .into());
                        }
                        (None, Some(end)) => {
                            debug!(name, "loop name not found, removing its blocks");
                            for b in &blocks[i..=end] {
                                self.tree.detach(*b);
                            }
                            i = end + 1;
                            continue;
                        }
                        (Some(Data::Custom(custom)), None) => {
                            self.run_custom(block, &custom)?;
                            i += 1;
                            continue;
                        }
                        (Some(other), Some(_)) => {
                            return Err(TemplateError::NotASet {
                                name: name.to_string(),
                                found: other.kind_name(),
                            }
                            .into());
                        }
                        (Some(Data::Scalar(_)) | None, None) => {}
                    }
                }
                None => {}
            }

            replace_in_paragraph(self.tree, block, self.fallback, |name| {
                Ok::<_, GenerateError>(match resolver.resolve(name)? {
                    Some(Data::Scalar(text)) => Some(text),
                    _ => None,
                })
            })?;
            i += 1;
        }
        Ok(())
    }

    fn process_table(&mut self, table: NodeId, resolver: &dyn Resolver) -> Result<(), GenerateError> {
        for row in self.tree.children_named(table, "w:tr") {
            for cell in self.tree.children_named(row, "w:tc") {
                let blocks = blocks_of(self.tree, cell);
                self.process_blocks(&blocks, resolver)?;
            }
        }
        Ok(())
    }

    /// Clone the body before `start` once per child, render each clone, then
    /// drop the template fragment
    fn unroll(
        &mut self,
        name: &str,
        set: &ResolverSet,
        start: NodeId,
        body: &[NodeId],
        end: NodeId,
    ) -> Result<(), GenerateError> {
        debug!(name, iterations = set.count(), body_blocks = body.len(), "unrolling loop");
        for (index, child) in set.iter().enumerate() {
            let clones: Vec<NodeId> = body.iter().map(|b| self.tree.deep_clone(*b)).collect();
            for clone in &clones {
                self.tree.insert_before(start, *clone);
            }
            trace!(name, index, "rendering loop iteration");
            let scope = IterationScope::new(Arc::clone(child), name);
            self.process_blocks(&clones, &scope)?;
        }
        self.tree.detach(start);
        for b in body {
            self.tree.detach(*b);
        }
        self.tree.detach(end);
        Ok(())
    }

    fn run_custom(&mut self, block: NodeId, custom: &Custom) -> Result<(), GenerateError> {
        debug!(name = custom.name(), "running custom block handler");
        let mut ctx = BlockContext {
            tree: &mut *self.tree,
            package: &mut *self.package,
            part: self.part,
            block,
            custom,
            images: self.images,
            fallback: self.fallback,
        };
        custom.handler().transform_block(&mut ctx)
    }
}

/// Index of the paragraph closing the loop opened at `start`
///
/// Same-name starts in between nest.
fn find_loop_end(tree: &XmlTree, blocks: &[NodeId], start: usize, name: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (j, block) in blocks.iter().enumerate().skip(start + 1) {
        if !tree.is_element(*block, "w:p") {
            continue;
        }
        let text = paragraph_text(tree, *block);
        match placeholder::sole_marker(&text) {
            Some(Marker::Start(inner)) if inner == name => depth += 1,
            Some(Marker::End(inner)) if inner == name => {
                if depth == 0 {
                    return Some(j);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}
