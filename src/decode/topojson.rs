//! TopoJSON decoding: resolves a topology's quantized, delta-encoded arcs
//! into absolute lon/lat coordinates, then projects and rescales them into
//! the requested tile the same way the GeoJSON decoder does.

use serde_json::Value as Json;

use crate::errors::{DecodeContext, TangramError};
use crate::geometry::{Feature, Line, Point, Polygon, TileData};
use crate::id::{TileId, TileSourceId};
use crate::value::{Properties, Value};

struct Transform {
    scale: (f64, f64),
    translate: (f64, f64),
}

fn parse_transform(topology: &Json) -> Option<Transform> {
    let t = topology.get("transform")?;
    let scale = t.get("scale")?.as_array()?;
    let translate = t.get("translate")?.as_array()?;
    Some(Transform {
        scale: (scale.first()?.as_f64()?, scale.get(1)?.as_f64()?),
        translate: (translate.first()?.as_f64()?, translate.get(1)?.as_f64()?),
    })
}

/// Decodes every raw arc into a sequence of absolute `(lon, lat)` pairs,
/// undoing the delta quantization described by `transform` when present.
fn decode_arcs(raw_arcs: &[Json], transform: &Option<Transform>) -> Result<Vec<Vec<(f64, f64)>>, TangramError> {
    let mut arcs = Vec::with_capacity(raw_arcs.len());
    for raw in raw_arcs {
        let points = raw
            .as_array()
            .ok_or_else(|| TangramError::Decode("TopoJSON arc is not an array".into()))?;
        let mut cx = 0.0;
        let mut cy = 0.0;
        let mut arc = Vec::with_capacity(points.len());
        for (i, p) in points.iter().enumerate() {
            let coord = p
                .as_array()
                .ok_or_else(|| TangramError::Decode("TopoJSON arc point is not an array".into()))?;
            let dx = coord.first().and_then(Json::as_f64).unwrap_or(0.0);
            let dy = coord.get(1).and_then(Json::as_f64).unwrap_or(0.0);
            match transform {
                Some(t) => {
                    if i == 0 {
                        cx = dx;
                        cy = dy;
                    } else {
                        cx += dx;
                        cy += dy;
                    }
                    arc.push((cx * t.scale.0 + t.translate.0, cy * t.scale.1 + t.translate.1));
                }
                None => arc.push((dx, dy)),
            }
        }
        arcs.push(arc);
    }
    Ok(arcs)
}

/// Resolves a single arc reference, honoring TopoJSON's negative-index
/// convention (`-1 - n` addresses arc `n`, reversed).
fn resolve_arc(arcs: &[Vec<(f64, f64)>], arc_ref: i64) -> Result<Vec<(f64, f64)>, TangramError> {
    if arc_ref >= 0 {
        arcs.get(arc_ref as usize)
            .cloned()
            .ok_or_else(|| TangramError::Decode("TopoJSON arc index out of range".into()))
    } else {
        let real = (-arc_ref - 1) as usize;
        let mut points = arcs
            .get(real)
            .cloned()
            .ok_or_else(|| TangramError::Decode("TopoJSON arc index out of range".into()))?;
        points.reverse();
        Ok(points)
    }
}

fn arc_refs_to_points(arcs: &[Vec<(f64, f64)>], refs: &Json) -> Result<Vec<(f64, f64)>, TangramError> {
    let mut points = Vec::new();
    for r in refs
        .as_array()
        .ok_or_else(|| TangramError::Decode("TopoJSON arc list is not an array".into()))?
    {
        let idx = r
            .as_i64()
            .ok_or_else(|| TangramError::Decode("TopoJSON arc reference is not an integer".into()))?;
        points.extend(resolve_arc(arcs, idx)?);
    }
    Ok(points)
}

fn project_line(points: Vec<(f64, f64)>, tile: TileId) -> Line {
    points
        .into_iter()
        .map(|(lon, lat)| crate::decode::geojson::project(lon, lat, tile))
        .collect()
}

fn feature_from_geometry(
    arcs: &[Vec<(f64, f64)>],
    geometry: &Json,
    props: Properties,
    source_id: TileSourceId,
    tile: TileId,
    out: &mut Vec<Feature>,
) -> Result<(), TangramError> {
    let geom_type = geometry
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| TangramError::Decode("TopoJSON geometry missing type".into()))?;

    match geom_type {
        "Point" => {
            let coord = geometry.get("coordinates").decode_context("Point missing coordinates")?;
            let arr = coord.as_array().ok_or_else(|| TangramError::Decode("Point coordinates not an array".into()))?;
            let lon = arr.first().and_then(Json::as_f64).unwrap_or(0.0);
            let lat = arr.get(1).and_then(Json::as_f64).unwrap_or(0.0);
            out.push(Feature::points(
                vec![crate::decode::geojson::project(lon, lat, tile)],
                props,
                source_id,
            ));
        }
        "LineString" => {
            let refs = geometry.get("arcs").decode_context("LineString missing arcs")?;
            let points = arc_refs_to_points(arcs, refs)?;
            out.push(Feature::lines(vec![project_line(points, tile)], props, source_id));
        }
        "MultiLineString" => {
            let arc_lists = geometry
                .get("arcs")
                .and_then(Json::as_array)
                .ok_or_else(|| TangramError::Decode("MultiLineString missing arcs".into()))?;
            let mut lines = Vec::new();
            for refs in arc_lists {
                lines.push(project_line(arc_refs_to_points(arcs, refs)?, tile));
            }
            out.push(Feature::lines(lines, props, source_id));
        }
        "Polygon" => {
            let rings_refs = geometry
                .get("arcs")
                .and_then(Json::as_array)
                .ok_or_else(|| TangramError::Decode("Polygon missing arcs".into()))?;
            let mut rings: Polygon = Vec::new();
            for ring_refs in rings_refs {
                rings.push(project_line(arc_refs_to_points(arcs, ring_refs)?, tile));
            }
            out.push(Feature::polygons(vec![rings], props, source_id));
        }
        "MultiPolygon" => {
            let polys_refs = geometry
                .get("arcs")
                .and_then(Json::as_array)
                .ok_or_else(|| TangramError::Decode("MultiPolygon missing arcs".into()))?;
            let mut polygons = Vec::new();
            for poly_refs in polys_refs {
                let mut rings: Polygon = Vec::new();
                for ring_refs in poly_refs
                    .as_array()
                    .ok_or_else(|| TangramError::Decode("MultiPolygon entry not an array".into()))?
                {
                    rings.push(project_line(arc_refs_to_points(arcs, ring_refs)?, tile));
                }
                polygons.push(rings);
            }
            out.push(Feature::polygons(polygons, props, source_id));
        }
        "GeometryCollection" => {
            for g in geometry
                .get("geometries")
                .and_then(Json::as_array)
                .ok_or_else(|| TangramError::Decode("GeometryCollection missing geometries".into()))?
            {
                feature_from_geometry(arcs, g, props.clone(), source_id, tile, out)?;
            }
        }
        other => return Err(TangramError::Decode(format!("unsupported TopoJSON geometry type {other}"))),
    }
    Ok(())
}

fn json_to_value(v: &Json) -> Value {
    match v {
        Json::Null => Value::None,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        Json::String(s) => Value::String(std::rc::Rc::from(s.as_str())),
        other => Value::String(std::rc::Rc::from(other.to_string())),
    }
}

fn properties_from_json(props: Option<&Json>) -> Properties {
    let mut pairs = Vec::new();
    if let Some(Json::Object(map)) = props {
        for (k, v) in map {
            pairs.push((k.clone(), json_to_value(v)));
        }
    }
    Properties::build(pairs)
}

/// Decodes every object in the topology into its own named layer, mirroring
/// how a TopoJSON source's named objects map onto scene data layers.
pub fn decode(bytes: &[u8], source_id: TileSourceId, tile: TileId) -> Result<TileData, TangramError> {
    let root: Json = serde_json::from_slice(bytes).decode_context("invalid TopoJSON")?;
    if root.get("type").and_then(Json::as_str) != Some("Topology") {
        return Err(TangramError::Decode("TopoJSON root is not a Topology".into()));
    }

    let transform = parse_transform(&root);
    let raw_arcs = root
        .get("arcs")
        .and_then(Json::as_array)
        .ok_or_else(|| TangramError::Decode("Topology missing arcs".into()))?;
    let arcs = decode_arcs(raw_arcs, &transform)?;

    let objects = root
        .get("objects")
        .and_then(Json::as_object)
        .ok_or_else(|| TangramError::Decode("Topology missing objects".into()))?;

    let mut layers = Vec::with_capacity(objects.len());
    for (name, object) in objects {
        let mut features = Vec::new();
        let geometries: Vec<&Json> = if object.get("type").and_then(Json::as_str) == Some("GeometryCollection") {
            object
                .get("geometries")
                .and_then(Json::as_array)
                .ok_or_else(|| TangramError::Decode("GeometryCollection missing geometries".into()))?
                .iter()
                .collect()
        } else {
            vec![object]
        };
        for g in geometries {
            let props = properties_from_json(g.get("properties"));
            feature_from_geometry(&arcs, g, props, source_id, tile, &mut features)?;
        }
        layers.push(crate::geometry::Layer {
            name: name.clone(),
            features,
        });
    }

    Ok(TileData { layers, raster: Vec::new() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_single_arc_linestring() {
        let json = br#"{
            "type": "Topology",
            "transform": { "scale": [1.0, 1.0], "translate": [0.0, 0.0] },
            "arcs": [[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]],
            "objects": {
                "roads": {
                    "type": "GeometryCollection",
                    "geometries": [
                        { "type": "LineString", "arcs": [0], "properties": { "kind": "path" } }
                    ]
                }
            }
        }"#;
        let tile = TileId::new(0, 0, 0);
        let data = decode(json, TileSourceId(1), tile).unwrap();
        assert_eq!(data.layers.len(), 1);
        assert_eq!(data.layers[0].name, "roads");
        let feature = &data.layers[0].features[0];
        assert_eq!(feature.lines[0].len(), 3);
        assert_eq!(feature.props.get("kind").unwrap().as_str(), Some("path"));
    }

    #[test]
    fn reversed_arc_reference_reverses_points() {
        let json = br#"{
            "type": "Topology",
            "arcs": [[[0.0, 0.0], [1.0, 1.0]]],
            "objects": {
                "lines": {
                    "type": "LineString",
                    "arcs": [-1]
                }
            }
        }"#;
        let tile = TileId::new(0, 0, 0);
        let data = decode(json, TileSourceId(1), tile).unwrap();
        let feature = &data.layers[0].features[0];
        assert_eq!(feature.lines[0].len(), 2);
    }
}
