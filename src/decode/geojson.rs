//! GeoJSON decoding: parses a `FeatureCollection` with `serde_json`,
//! projects WGS84 lon/lat through Web Mercator, and rescales into the
//! requested tile's local unit square.

use serde_json::Value as Json;
use std::f64::consts::PI;

use crate::errors::{DecodeContext, TangramError};
use crate::geometry::{Feature, Line, Point, Polygon, TileData};
use crate::id::{TileId, TileSourceId};
use crate::value::{Properties, Value};

/// Projects a lon/lat pair into this tile's local unit square using the
/// standard slippy-map Web Mercator tiling scheme at `tile.z`.
pub(crate) fn project(lon: f64, lat: f64, tile: TileId) -> Point {
    let n = (1u64 << tile.z) as f64;
    let lat_rad = lat.to_radians();
    let fx = (lon + 180.0) / 360.0 * n;
    let fy = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n;
    Point::new((fx - tile.x as f64) as f32, (fy - tile.y as f64) as f32)
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

fn coord_to_point(coord: &Json, tile: TileId) -> Result<Point, TangramError> {
    let arr = coord
        .as_array()
        .ok_or_else(|| TangramError::Decode("GeoJSON coordinate is not an array".into()))?;
    let lon = arr
        .first()
        .and_then(Json::as_f64)
        .ok_or_else(|| TangramError::Decode("GeoJSON coordinate missing longitude".into()))?;
    let lat = arr
        .get(1)
        .and_then(Json::as_f64)
        .ok_or_else(|| TangramError::Decode("GeoJSON coordinate missing latitude".into()))?;
    Ok(project(lon, lat, tile))
}

fn ring_to_line(ring: &Json, tile: TileId) -> Result<Line, TangramError> {
    ring.as_array()
        .ok_or_else(|| TangramError::Decode("GeoJSON ring is not an array".into()))?
        .iter()
        .map(|c| coord_to_point(c, tile))
        .collect()
}

fn feature_from_geometry(
    geometry: &Json,
    props: Properties,
    source_id: TileSourceId,
    tile: TileId,
    out: &mut Vec<Feature>,
) -> Result<(), TangramError> {
    let geom_type = geometry
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| TangramError::Decode("GeoJSON geometry missing type".into()))?;
    let coords = geometry.get("coordinates");

    match geom_type {
        "Point" => {
            let coords = coords.decode_context("Point missing coordinates")?;
            out.push(Feature::points(
                vec![coord_to_point(coords, tile)?],
                props,
                source_id,
            ));
        }
        "MultiPoint" => {
            let coords = coords.decode_context("MultiPoint missing coordinates")?;
            let points = coords
                .as_array()
                .ok_or_else(|| TangramError::Decode("MultiPoint coordinates not an array".into()))?
                .iter()
                .map(|c| coord_to_point(c, tile))
                .collect::<Result<Vec<_>, _>>()?;
            out.push(Feature::points(points, props, source_id));
        }
        "LineString" => {
            let coords = coords.decode_context("LineString missing coordinates")?;
            let line = ring_to_line(coords, tile)?;
            out.push(Feature::lines(vec![line], props, source_id));
        }
        "MultiLineString" => {
            let coords = coords.decode_context("MultiLineString missing coordinates")?;
            let lines = coords
                .as_array()
                .ok_or_else(|| TangramError::Decode("MultiLineString coordinates not an array".into()))?
                .iter()
                .map(|r| ring_to_line(r, tile))
                .collect::<Result<Vec<_>, _>>()?;
            out.push(Feature::lines(lines, props, source_id));
        }
        "Polygon" => {
            let coords = coords.decode_context("Polygon missing coordinates")?;
            let rings = coords
                .as_array()
                .ok_or_else(|| TangramError::Decode("Polygon coordinates not an array".into()))?
                .iter()
                .map(|r| ring_to_line(r, tile))
                .collect::<Result<Polygon, _>>()?;
            out.push(Feature::polygons(vec![rings], props, source_id));
        }
        "MultiPolygon" => {
            let coords = coords.decode_context("MultiPolygon missing coordinates")?;
            let polygons = coords
                .as_array()
                .ok_or_else(|| TangramError::Decode("MultiPolygon coordinates not an array".into()))?
                .iter()
                .map(|poly| {
                    poly.as_array()
                        .ok_or_else(|| TangramError::Decode("MultiPolygon entry not an array".into()))?
                        .iter()
                        .map(|r| ring_to_line(r, tile))
                        .collect::<Result<Polygon, _>>()
                })
                .collect::<Result<Vec<_>, _>>()?;
            out.push(Feature::polygons(polygons, props, source_id));
        }
        "GeometryCollection" => {
            let geometries = geometry
                .get("geometries")
                .and_then(Json::as_array)
                .ok_or_else(|| TangramError::Decode("GeometryCollection missing geometries".into()))?;
            for g in geometries {
                feature_from_geometry(g, props.clone(), source_id, tile, out)?;
            }
        }
        other => return Err(TangramError::Decode(format!("unsupported GeoJSON geometry type {other}"))),
    }
    Ok(())
}

/// Decodes a GeoJSON `FeatureCollection` (or a bare `Feature`) into the
/// layer named `"_default"`, matching the single implicit layer a GeoJSON
/// source contributes.
pub fn decode(bytes: &[u8], source_id: TileSourceId, tile: TileId) -> Result<TileData, TangramError> {
    let root: Json = serde_json::from_slice(bytes).decode_context("invalid GeoJSON")?;
    let mut features = Vec::new();

    let root_type = root.get("type").and_then(Json::as_str).unwrap_or("");
    match root_type {
        "FeatureCollection" => {
            let entries = root
                .get("features")
                .and_then(Json::as_array)
                .ok_or_else(|| TangramError::Decode("FeatureCollection missing features".into()))?;
            for entry in entries {
                let props = properties_from_json(entry.get("properties"));
                if let Some(geometry) = entry.get("geometry").filter(|g| !g.is_null()) {
                    feature_from_geometry(geometry, props, source_id, tile, &mut features)?;
                }
            }
        }
        "Feature" => {
            let props = properties_from_json(root.get("properties"));
            if let Some(geometry) = root.get("geometry").filter(|g| !g.is_null()) {
                feature_from_geometry(geometry, props, source_id, tile, &mut features)?;
            }
        }
        _ => {
            // A bare geometry object, with no feature wrapper or properties.
            feature_from_geometry(&root, Properties::new(), source_id, tile, &mut features)?;
        }
    }

    Ok(TileData {
        layers: vec![crate::geometry::Layer {
            name: "_default".to_string(),
            features,
        }],
        raster: Vec::new(),
    })
}
