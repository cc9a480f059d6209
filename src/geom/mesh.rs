//! The packed, GPU-ready output of a style builder: a vertex buffer, an
//! index buffer, and a tag identifying the vertex layout so the (external)
//! renderer can bind the right attribute schema without the core knowing
//! anything about GPU state.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexLayout {
    Polyline,
    Polygon,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolylineVertex {
    pub position: [f32; 3],
    pub extrude_normal: [f32; 2],
    pub uv_along: f32,
    pub width_base_px: i16,
    pub width_slope: i16,
    pub color: u32,
    pub selection_color: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolygonVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: u32,
    pub selection_color: u32,
}

/// One style's published output: owns its packed buffers outright so
/// publication is a move, never a copy.
#[derive(Debug, Clone)]
pub enum StyledMesh {
    Polyline {
        vertices: Vec<PolylineVertex>,
        indices: Vec<u32>,
    },
    Polygon {
        vertices: Vec<PolygonVertex>,
        indices: Vec<u32>,
    },
}

impl StyledMesh {
    pub fn layout(&self) -> VertexLayout {
        match self {
            StyledMesh::Polyline { .. } => VertexLayout::Polyline,
            StyledMesh::Polygon { .. } => VertexLayout::Polygon,
        }
    }

    pub fn index_count(&self) -> usize {
        match self {
            StyledMesh::Polyline { indices, .. } => indices.len(),
            StyledMesh::Polygon { indices, .. } => indices.len(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        match self {
            StyledMesh::Polyline { vertices, .. } => vertices.len(),
            StyledMesh::Polygon { vertices, .. } => vertices.len(),
        }
    }
}
