use crate::{
    foundation::{
        core::Size,
        error::{SketchError, SketchResult},
    },
    markup::{svg::pending_to_svg, tree::MarkupTree},
    render::{composite::over_in_place, fonts::FontBook, raster::RasterSurface},
};

/// Rasterize the pending part of `markup` and blend it over `raster`.
///
/// Every node drawn is marked composed afterwards, so later composes only add what was
/// appended since. Returns the number of nodes painted.
pub fn compose_markup(
    markup: &mut MarkupTree,
    raster: &mut RasterSurface,
    fonts: &FontBook,
) -> SketchResult<usize> {
    let size = raster.size();
    let Some(pending) = pending_to_svg(markup, size)? else {
        return Ok(0);
    };

    let layer = rasterize_svg_to_premul_rgba8(&pending.source, size, fonts)?;
    over_in_place(raster.data_mut(), &layer, 1.0)?;
    markup.mark_all_composed();
    Ok(pending.painted_nodes)
}

pub fn rasterize_svg_to_premul_rgba8(
    source: &str,
    size: Size,
    fonts: &FontBook,
) -> SketchResult<Vec<u8>> {
    let opts = usvg::Options {
        fontdb: fonts.database(),
        ..Default::default()
    };
    let tree = usvg::Tree::from_str(source, &opts)
        .map_err(|e| SketchError::render(format!("failed to parse composed markup: {e}")))?;

    let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width, size.height)
        .ok_or_else(|| SketchError::render("failed to allocate markup pixmap"))?;
    resvg::render(
        &tree,
        resvg::tiny_skia::Transform::identity(),
        &mut pixmap.as_mut(),
    );
    Ok(pixmap.data().to_vec())
}
