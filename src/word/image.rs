//! Image placeholder for word documents

use tracing::warn;

use super::engine::BlockContext;
use crate::error::GenerateError;
use crate::image::Extent;
use crate::package::REL_IMAGE;
use crate::resolve::{CustomPlaceholder, Data};

/// Replaces its marker paragraph with an inline picture
///
/// The placeholder name must resolve to a file path or a base64 `data:` URI.
/// Anything that cannot be loaded renders the fallback text instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImagePlaceholder;

impl CustomPlaceholder for ImagePlaceholder {
    fn transform_block(&self, ctx: &mut BlockContext<'_>) -> Result<(), GenerateError> {
        let source = match ctx.scope().resolve(ctx.name())? {
            Some(Data::Scalar(source)) => source,
            other => {
                warn!(name = ctx.name(), found = ?other, "image source is not text");
                let fallback = ctx.fallback();
                ctx.replace_block_text(fallback);
                return Ok(());
            }
        };

        let images = ctx.images();
        let image = match images.load(&source) {
            Ok(image) => image,
            Err(e) => {
                warn!(name = ctx.name(), %source, error = %e, "failed to load image");
                let fallback = ctx.fallback();
                ctx.replace_block_text(fallback);
                return Ok(());
            }
        };
        let extent = images.scale(&image);

        let part = ctx.part();
        let part_dir = part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        let media_dir = if part_dir.is_empty() {
            "media".to_string()
        } else {
            format!("{part_dir}/media")
        };
        let media_part = images.persist(&image, ctx.package_mut(), &media_dir);
        ctx.package_mut()
            .ensure_default_content_type(image.kind.extension(), image.kind.content_type())?;

        let target = media_part
            .strip_prefix(part_dir)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(&media_part)
            .to_string();
        let mut rels = ctx.package().relationships(part)?;
        let rel_id = rels.add(REL_IMAGE, &target, false);
        ctx.package_mut().set_relationships(part, &rels);

        let doc_pr_id = next_drawing_id(ctx);
        let fragment = drawing_paragraph(&rel_id, doc_pr_id, ctx.name(), extent);
        ctx.insert_before_block(&fragment)?;
        ctx.remove_block();
        Ok(())
    }
}

fn next_drawing_id(ctx: &BlockContext<'_>) -> u32 {
    let tree = ctx.tree();
    let used = tree
        .descendants(tree.document())
        .into_iter()
        .filter(|n| tree.is_element(*n, "wp:docPr"))
        .filter_map(|n| tree.attr(n, "id")?.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    used + 1
}

fn drawing_paragraph(rel_id: &str, id: u32, name: &str, extent: Extent) -> String {
    let Extent { cx, cy } = extent;
    let name = quick_xml::escape::escape(name);
    format!(
        concat!(
            r#"<w:p><w:r><w:drawing>"#,
            r#"<wp:inline xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" distT="0" distB="0" distL="0" distR="0">"#,
            r#"<wp:extent cx="{cx}" cy="{cy}"/>"#,
            r#"<wp:docPr id="{id}" name="{name}"/>"#,
            r#"<a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">"#,
            r#"<a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:nvPicPr><pic:cNvPr id="{id}" name="{name}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" r:embed="{rel_id}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
            r#"</pic:pic></a:graphicData></a:graphic></wp:inline>"#,
            r#"</w:drawing></w:r></w:p>"#
        ),
        cx = cx,
        cy = cy,
        id = id,
        name = name,
        rel_id = rel_id,
    )
}
