use bytes::Bytes;

use crate::id::TileSourceId;
use crate::value::Properties;

/// A point in tile-local units: the unit square `[0,1] x [0,1]` with the
/// origin at the tile's south-west corner, plus a z used by extrusion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Point { x, y, z: 0.0 }
    }

    pub fn new3(x: f32, y: f32, z: f32) -> Self {
        Point { x, y, z }
    }
}

pub type Line = Vec<Point>;

/// The first element is the outer ring; the remainder are holes.
pub type Polygon = Vec<Line>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryType {
    Points,
    Lines,
    Polygons,
}

#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry_type: GeometryType,
    pub points: Vec<Point>,
    pub lines: Vec<Line>,
    pub polygons: Vec<Polygon>,
    pub props: Properties,
    pub source_id: TileSourceId,
}

impl Feature {
    pub fn points(points: Vec<Point>, props: Properties, source_id: TileSourceId) -> Self {
        Feature {
            geometry_type: GeometryType::Points,
            points,
            lines: Vec::new(),
            polygons: Vec::new(),
            props,
            source_id,
        }
    }

    pub fn lines(lines: Vec<Line>, props: Properties, source_id: TileSourceId) -> Self {
        Feature {
            geometry_type: GeometryType::Lines,
            points: Vec::new(),
            lines,
            polygons: Vec::new(),
            props,
            source_id,
        }
    }

    pub fn polygons(polygons: Vec<Polygon>, props: Properties, source_id: TileSourceId) -> Self {
        Feature {
            geometry_type: GeometryType::Polygons,
            points: Vec::new(),
            lines: Vec::new(),
            polygons,
            props,
            source_id,
        }
    }

    /// Invariant: exactly the vector matching `geometry_type` is non-empty.
    #[cfg(debug_assertions)]
    pub fn check_geometry_invariant(&self) -> bool {
        let (p, l, g) = (
            !self.points.is_empty(),
            !self.lines.is_empty(),
            !self.polygons.is_empty(),
        );
        match self.geometry_type {
            GeometryType::Points => p && !l && !g,
            GeometryType::Lines => !p && l && !g,
            GeometryType::Polygons => !p && !l && g,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub features: Vec<Feature>,
}

/// Opaque raster bytes fanned out from a raster overlay source and carried
/// alongside the vector layers, keyed by the source that produced them.
#[derive(Debug, Clone)]
pub struct RasterTile {
    pub source_id: TileSourceId,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct TileData {
    pub layers: Vec<Layer>,
    pub raster: Vec<RasterTile>,
}

impl TileData {
    pub fn new() -> Self {
        TileData {
            layers: Vec::new(),
            raster: Vec::new(),
        }
    }
}

/// The `$geometry` keyword constants used by filters and the JS proxy.
pub mod geometry_constant {
    pub const POINT: f64 = 1.0;
    pub const LINE: f64 = 2.0;
    pub const POLYGON: f64 = 3.0;
}

impl GeometryType {
    pub fn keyword_value(self) -> f64 {
        match self {
            GeometryType::Points => geometry_constant::POINT,
            GeometryType::Lines => geometry_constant::LINE,
            GeometryType::Polygons => geometry_constant::POLYGON,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_invariant_holds_for_lines() {
        let f = Feature::lines(
            vec![vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]],
            Properties::new(),
            TileSourceId(1),
        );
        assert!(f.check_geometry_invariant());
    }
}
