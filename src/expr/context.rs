//! Per-evaluation context: the `$zoom`/`$geometry` keywords and the scale
//! factor used by pixel-area-aware range filters.

use crate::geometry::{Feature, GeometryType};
use crate::value::Value;

pub const KEYWORD_ZOOM: &str = "$zoom";
pub const KEYWORD_GEOMETRY: &str = "$geometry";

/// The style/filter evaluation context for a single feature at a single
/// zoom. One `StyleContext` is reused across many features within a tile;
/// only `set_feature` mutates per-feature state.
#[derive(Debug, Clone)]
pub struct StyleContext {
    pub zoom: f32,
    pub geometry_type: GeometryType,
    pub meters_per_pixel_area: f64,
}

impl StyleContext {
    pub fn new(zoom: f32, geometry_type: GeometryType, meters_per_pixel_area: f64) -> Self {
        StyleContext {
            zoom,
            geometry_type,
            meters_per_pixel_area,
        }
    }

    pub fn for_feature(zoom: f32, feature: &Feature, meters_per_pixel_area: f64) -> Self {
        StyleContext::new(zoom, feature.geometry_type, meters_per_pixel_area)
    }

    /// Resolves a keyword name to its current value, or `None` if `key`
    /// is not a recognized keyword (callers then fall back to feature
    /// properties).
    pub fn resolve_keyword(&self, key: &str) -> Option<Value> {
        match key {
            KEYWORD_ZOOM => Some(Value::Number(self.zoom as f64)),
            KEYWORD_GEOMETRY => Some(Value::Number(self.geometry_type.keyword_value())),
            _ => None,
        }
    }

    pub fn is_keyword(key: &str) -> bool {
        key.starts_with('$')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Feature, Point};
    use crate::id::TileSourceId;
    use crate::value::Properties;

    #[test]
    fn geometry_keyword_resolves_to_constant() {
        let feature = Feature::lines(
            vec![vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]],
            Properties::new(),
            TileSourceId(1),
        );
        let ctx = StyleContext::for_feature(10.0, &feature, 1.0);
        assert_eq!(ctx.resolve_keyword("$geometry"), Some(Value::Number(2.0)));
        assert_eq!(ctx.resolve_keyword("$zoom"), Some(Value::Number(10.0)));
        assert_eq!(ctx.resolve_keyword("name"), None);
    }
}
