//! `TileSource` configuration, as handed in by the (external) scene loader.

use crate::decode::TileFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Vector(TileFormat),
    Raster,
}

/// One entry in the scene's source list. `url_template` uses `[x]`/`[y]`/
/// `[z]` substitution; a requested zoom beyond `max_zoom` is served from
/// the ancestor tile at `max_zoom` with an over-zoom offset carried in the
/// resulting `TileId`.
#[derive(Debug, Clone)]
pub struct TileSourceConfig {
    pub name: String,
    pub url_template: String,
    pub min_display_zoom: u8,
    pub max_display_zoom: u8,
    pub max_zoom: u8,
    pub kind: SourceKind,
    pub cache_size_bytes: u64,
}

impl TileSourceConfig {
    /// Substitutes `[x]`/`[y]`/`[z]` in `url_template` for `tile`, using
    /// `tile.effective_zoom()`'s ancestor id when the request is over-zoomed
    /// beyond `max_zoom`.
    pub fn resolve_url(&self, tile: crate::id::TileId) -> String {
        let (ancestor, _offset) = tile.ancestor_at(self.max_zoom);
        self.url_template
            .replace("[x]", &ancestor.x.to_string())
            .replace("[y]", &ancestor.y.to_string())
            .replace("[z]", &ancestor.z.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::TileId;

    #[test]
    fn url_template_substitutes_ancestor_coordinates_when_overzoomed() {
        let config = TileSourceConfig {
            name: "osm".into(),
            url_template: "https://tiles/[z]/[x]/[y].mvt".into(),
            min_display_zoom: 0,
            max_display_zoom: 20,
            max_zoom: 14,
            kind: SourceKind::Vector(TileFormat::Mvt),
            cache_size_bytes: 32 * 1024 * 1024,
        };
        let requested = TileId::new(100, 200, 16);
        let url = config.resolve_url(requested);
        assert!(url.contains("/14/"));
    }
}
