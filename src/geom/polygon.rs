//! Polygon tessellation: 2D triangulation-with-holes delegated to
//! `earcutr`, with floor/ceiling/side extrusion and per-vertex normals
//! layered on top.

use crate::geometry::{Point, Polygon};
use crate::geom::mesh::PolygonVertex;

#[derive(Debug, Clone, Copy)]
pub struct PolygonStyle {
    pub min_height: f32,
    pub height: f32,
    pub color: u32,
    pub selection_color: u32,
}

impl Default for PolygonStyle {
    fn default() -> Self {
        PolygonStyle {
            min_height: 0.0,
            height: 0.0,
            color: 0xffffffff,
            selection_color: 0,
        }
    }
}

fn signed_area(ring: &[Point]) -> f64 {
    let mut area = 0.0;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        area += (a.x as f64) * (b.y as f64) - (b.x as f64) * (a.y as f64);
    }
    area * 0.5
}

/// Flattens the polygon's rings for `earcutr`: a single coordinate buffer
/// plus hole start indices.
fn flatten_rings(polygon: &Polygon) -> (Vec<f64>, Vec<usize>) {
    let mut coords = Vec::new();
    let mut hole_indices = Vec::new();
    for (i, ring) in polygon.iter().enumerate() {
        if i > 0 {
            hole_indices.push(coords.len() / 2);
        }
        for p in ring {
            coords.push(p.x as f64);
            coords.push(p.y as f64);
        }
    }
    (coords, hole_indices)
}

fn flat_triangles(polygon: &Polygon) -> Vec<[Point; 3]> {
    if polygon.is_empty() || polygon[0].len() < 3 {
        return Vec::new();
    }
    let (coords, hole_indices) = flatten_rings(polygon);
    let triangle_indices = earcutr::earcut(&coords, &hole_indices, 2);

    let points: Vec<Point> = coords
        .chunks(2)
        .map(|c| Point::new(c[0] as f32, c[1] as f32))
        .collect();

    triangle_indices
        .chunks(3)
        .filter(|c| c.len() == 3)
        .map(|c| [points[c[0]], points[c[1]], points[c[2]]])
        .collect()
}

fn vertex(p: Point, normal: [f32; 3], style: &PolygonStyle) -> PolygonVertex {
    PolygonVertex {
        position: [p.x, p.y, p.z],
        normal,
        color: style.color,
        selection_color: style.selection_color,
    }
}

/// Tessellates `polygon` into floor triangles at `min_height`, ceiling
/// triangles at `height` (omitted when the two are equal), and extruded
/// side quads along every outer-ring and hole-ring edge. Corner vertices
/// are duplicated at every ring boundary so side normals stay a sharp
/// crease rather than smoothing across it.
pub fn build(polygon: &Polygon, style: &PolygonStyle) -> (Vec<PolygonVertex>, Vec<u32>) {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    if polygon.is_empty() {
        return (vertices, indices);
    }
    if signed_area(&polygon[0]).abs() < 1e-12 {
        return (vertices, indices);
    }

    let triangles = flat_triangles(polygon);

    for tri in &triangles {
        let base = vertices.len() as u32;
        for p in tri {
            vertices.push(vertex(Point::new3(p.x, p.y, style.min_height), [0.0, 0.0, -1.0], style));
        }
        indices.extend_from_slice(&[base, base + 2, base + 1]);
    }

    if (style.height - style.min_height).abs() > 1e-6 {
        for tri in &triangles {
            let base = vertices.len() as u32;
            for p in tri {
                vertices.push(vertex(Point::new3(p.x, p.y, style.height), [0.0, 0.0, 1.0], style));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2]);
        }

        for ring in polygon {
            if ring.len() < 2 {
                continue;
            }
            for i in 0..ring.len() {
                let a = ring[i];
                let b = ring[(i + 1) % ring.len()];
                let (ex, ey) = (b.x - a.x, b.y - a.y);
                let len = (ex * ex + ey * ey).sqrt();
                let normal = if len > 1e-9 { [ey / len, -ex / len, 0.0] } else { [0.0, 0.0, 0.0] };

                let base = vertices.len() as u32;
                vertices.push(vertex(Point::new3(a.x, a.y, style.min_height), normal, style));
                vertices.push(vertex(Point::new3(b.x, b.y, style.min_height), normal, style));
                vertices.push(vertex(Point::new3(b.x, b.y, style.height), normal, style));
                vertices.push(vertex(Point::new3(a.x, a.y, style.height), normal, style));

                indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
            }
        }
    }

    (vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Polygon {
        vec![vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, 1.0),
            Point::new(1.0, 1.0),
            Point::new(1.0, 0.0),
        ]]
    }

    #[test]
    fn flat_polygon_produces_only_floor_triangles() {
        let style = PolygonStyle::default();
        let (vertices, indices) = build(&square(), &style);
        assert!(!vertices.is_empty());
        assert_eq!(indices.len() % 3, 0);
    }

    #[test]
    fn extruded_polygon_adds_ceiling_and_side_quads() {
        let style = PolygonStyle {
            min_height: 0.0,
            height: 5.0,
            ..Default::default()
        };
        let (flat_vertices, _) = build(&square(), &PolygonStyle::default());
        let (extruded_vertices, extruded_indices) = build(&square(), &style);
        assert!(extruded_vertices.len() > flat_vertices.len());
        assert_eq!(extruded_indices.len() % 3, 0);
    }

    #[test]
    fn zero_area_outer_ring_is_discarded() {
        let degenerate = vec![vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(2.0, 0.0)]];
        let (vertices, indices) = build(&degenerate, &PolygonStyle::default());
        assert!(vertices.is_empty());
        assert!(indices.is_empty());
    }
}
