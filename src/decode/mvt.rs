//! Mapbox Vector Tile decoder: a length-delimited varint protobuf tile
//! carrying layered vector geometry with shared string/value tables.

use crate::decode::pbf::{Reader, WireType};
use crate::errors::TangramError;
use crate::geometry::{Feature, GeometryType, Layer, Line, Point, Polygon, TileData};
use crate::id::TileSourceId;
use crate::value::{Properties, Value};

const DEFAULT_EXTENT: u32 = 4096;

const CMD_MOVE_TO: u32 = 1;
const CMD_LINE_TO: u32 = 2;
const CMD_CLOSE_PATH: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MvtGeomType {
    Unknown,
    Point,
    LineString,
    Polygon,
}

impl MvtGeomType {
    fn from_u32(v: u32) -> Self {
        match v {
            1 => MvtGeomType::Point,
            2 => MvtGeomType::LineString,
            3 => MvtGeomType::Polygon,
            _ => MvtGeomType::Unknown,
        }
    }
}

struct RawFeature {
    tags: Vec<u32>,
    geom_type: MvtGeomType,
    geometry: Vec<u32>,
}

/// Decodes a raw `(cmd_id, count)` + delta-encoded-coordinate geometry
/// stream into a flat list of rings/lines in tile-local unit-square
/// coordinates, normalized by `extent`.
fn decode_geometry(commands: &[u32], extent: u32) -> Result<Vec<Line>, TangramError> {
    let scale = 1.0 / extent as f64;
    let mut rings: Vec<Line> = Vec::new();
    let mut current: Line = Vec::new();
    let mut cursor_x: i64 = 0;
    let mut cursor_y: i64 = 0;
    let mut i = 0;

    while i < commands.len() {
        let cmd_int = commands[i];
        i += 1;
        let cmd_id = cmd_int & 0x7;
        let count = cmd_int >> 3;

        match cmd_id {
            CMD_MOVE_TO => {
                if !current.is_empty() {
                    rings.push(std::mem::take(&mut current));
                }
                for _ in 0..count {
                    if i + 1 >= commands.len() {
                        return Err(TangramError::Decode("truncated moveTo".into()));
                    }
                    let dx = zigzag(commands[i]);
                    let dy = zigzag(commands[i + 1]);
                    i += 2;
                    cursor_x += dx;
                    cursor_y += dy;
                    current.push(Point::new(
                        (cursor_x as f64 * scale) as f32,
                        (cursor_y as f64 * scale) as f32,
                    ));
                }
            }
            CMD_LINE_TO => {
                for _ in 0..count {
                    if i + 1 >= commands.len() {
                        return Err(TangramError::Decode("truncated lineTo".into()));
                    }
                    let dx = zigzag(commands[i]);
                    let dy = zigzag(commands[i + 1]);
                    i += 2;
                    cursor_x += dx;
                    cursor_y += dy;
                    current.push(Point::new(
                        (cursor_x as f64 * scale) as f32,
                        (cursor_y as f64 * scale) as f32,
                    ));
                }
            }
            CMD_CLOSE_PATH => {
                // A closePath that does not immediately follow an already
                // closed ring: emit a warning and close it implicitly by
                // repeating the first point.
                if let Some(&first) = current.first() {
                    let last_closed = current.last().map(|p| points_eq(*p, first)).unwrap_or(true);
                    if !last_closed {
                        log::warn!("MVT: closePath on unclosed ring, closing implicitly");
                        current.push(first);
                    }
                    rings.push(std::mem::take(&mut current));
                }
            }
            _ => return Err(TangramError::Decode(format!("unknown geometry command {cmd_id}"))),
        }
    }
    if !current.is_empty() {
        rings.push(current);
    }
    Ok(rings)
}

fn points_eq(a: Point, b: Point) -> bool {
    (a.x - b.x).abs() < f32::EPSILON && (a.y - b.y).abs() < f32::EPSILON
}

fn zigzag(v: u32) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

/// Signed area (shoelace); positive for counter-clockwise rings in a
/// y-down tile frame. Used to infer outer-vs-hole winding, per the Open
/// Question resolution: signed-area inference rather than trusting the
/// wire encoding.
fn signed_area(ring: &Line) -> f64 {
    let mut area = 0.0;
    for i in 0..ring.len() {
        let p0 = ring[i];
        let p1 = ring[(i + 1) % ring.len()];
        area += (p0.x as f64) * (p1.y as f64) - (p1.x as f64) * (p0.y as f64);
    }
    area * 0.5
}

fn rings_to_polygons(rings: Vec<Line>) -> Vec<Polygon> {
    let mut polygons: Vec<Polygon> = Vec::new();
    let mut current_outer_sign: Option<f64> = None;

    for ring in rings {
        let area = signed_area(&ring);
        if area.abs() < 1e-12 {
            // Zero-area rings are dropped.
            continue;
        }
        let sign = area.signum();
        if current_outer_sign.is_none() || sign != current_outer_sign.unwrap() {
            // A new outer ring: the first ring is always outer regardless
            // of source encoding, and subsequent rings whose sign matches
            // the outer are its holes. A flip in sign starts a new polygon.
            polygons.push(vec![ring]);
            current_outer_sign = Some(sign);
        } else {
            if let Some(last) = polygons.last_mut() {
                last.push(ring);
            }
        }
    }
    polygons
}

fn decode_value(msg: &mut Reader) -> Result<Value, TangramError> {
    let mut value = Value::None;
    while msg.next()? {
        match msg.field {
            1 => value = Value::String(std::rc::Rc::from(msg.read_string()?)),
            2 => value = Value::Number(msg.read_float()? as f64),
            3 => value = Value::Number(msg.read_double()?),
            4 => value = Value::Number(msg.read_varint()? as i64 as f64),
            5 => value = Value::Number(msg.read_varint()? as f64),
            6 => value = Value::Number(msg.read_svarint()? as f64),
            7 => value = Value::Bool(msg.read_bool()?),
            _ => msg.skip()?,
        }
    }
    Ok(value)
}

fn decode_layer(
    mut layer_msg: Reader,
    source_id: TileSourceId,
    cancel: &dyn Fn() -> bool,
) -> Result<Layer, TangramError> {
    let mut name = String::new();
    let mut keys: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    let mut raw_features: Vec<RawFeature> = Vec::new();
    let mut extent = DEFAULT_EXTENT;

    while layer_msg.next()? {
        match layer_msg.field {
            1 => name = layer_msg.read_string()?,
            2 => {
                let mut feat_msg = layer_msg.read_message()?;
                let mut tags = Vec::new();
                let mut geom_type = MvtGeomType::Unknown;
                let mut geometry = Vec::new();
                while feat_msg.next()? {
                    match feat_msg.field {
                        2 => feat_msg.read_packed_uint32(&mut tags)?,
                        3 => geom_type = MvtGeomType::from_u32(feat_msg.read_uint32()?),
                        4 => feat_msg.read_packed_uint32(&mut geometry)?,
                        _ => feat_msg.skip()?,
                    }
                }
                raw_features.push(RawFeature {
                    tags,
                    geom_type,
                    geometry,
                });
            }
            3 => keys.push(layer_msg.read_string()?),
            4 => {
                let mut val_msg = layer_msg.read_message()?;
                values.push(decode_value(&mut val_msg)?);
            }
            5 => extent = layer_msg.read_uint32()?,
            _ => layer_msg.skip()?,
        }
    }

    if cancel() {
        return Err(TangramError::Decode("cancelled".into()));
    }

    let mut features = Vec::with_capacity(raw_features.len());
    for raw in raw_features {
        if cancel() {
            return Err(TangramError::Decode("cancelled".into()));
        }

        let mut pairs = Vec::with_capacity(raw.tags.len() / 2);
        let mut i = 0;
        while i + 1 < raw.tags.len() {
            let key_idx = raw.tags[i] as usize;
            let val_idx = raw.tags[i + 1] as usize;
            if let (Some(k), Some(v)) = (keys.get(key_idx), values.get(val_idx)) {
                pairs.push((k.clone(), v.clone()));
            }
            i += 2;
        }
        let props = Properties::build(pairs);

        let rings = decode_geometry(&raw.geometry, extent)?;

        let feature = match raw.geom_type {
            MvtGeomType::Point => {
                let points = rings.into_iter().flatten().collect::<Vec<_>>();
                if points.is_empty() {
                    continue;
                }
                Feature::points(points, props, source_id)
            }
            MvtGeomType::LineString => {
                // Duplicate consecutive points are kept; the tessellator
                // handles degeneracy.
                let lines: Vec<Line> = rings.into_iter().filter(|r| r.len() >= 2).collect();
                if lines.is_empty() {
                    continue;
                }
                Feature::lines(lines, props, source_id)
            }
            MvtGeomType::Polygon => {
                let polygons = rings_to_polygons(rings);
                if polygons.is_empty() {
                    continue;
                }
                Feature::polygons(polygons, props, source_id)
            }
            MvtGeomType::Unknown => continue,
        };
        features.push(feature);
    }

    Ok(Layer { name, features })
}

/// Decodes a full MVT tile. `cancel` is polled between top-level layer
/// messages and between features within a layer, matching the
/// cancellation-safe-point contract of the decoder.
pub fn decode(bytes: &[u8], source_id: TileSourceId, cancel: &dyn Fn() -> bool) -> Result<TileData, TangramError> {
    let mut reader = Reader::new(bytes);
    let mut tile = TileData::new();

    while reader.next()? {
        if reader.field == 3 && reader.wire_type == WireType::LengthDelimited {
            if cancel() {
                return Err(TangramError::Decode("cancelled".into()));
            }
            let layer_msg = reader.read_message()?;
            tile.layers.push(decode_layer(layer_msg, source_id, cancel)?);
        } else {
            reader.skip()?;
        }
    }

    Ok(tile)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_varint(buf: &mut Vec<u8>, mut v: u64) {
        loop {
            let mut byte = (v & 0x7f) as u8;
            v >>= 7;
            if v != 0 {
                byte |= 0x80;
            }
            buf.push(byte);
            if v == 0 {
                break;
            }
        }
    }

    fn write_tag(buf: &mut Vec<u8>, field: u64, wire_type: u64) {
        write_varint(buf, (field << 3) | wire_type);
    }

    fn write_length_delimited(buf: &mut Vec<u8>, field: u64, payload: &[u8]) {
        write_tag(buf, field, 2);
        write_varint(buf, payload.len() as u64);
        buf.extend_from_slice(payload);
    }

    fn encode_command(id: u32, count: u32) -> u32 {
        (id & 0x7) | (count << 3)
    }

    fn encode_zigzag(v: i64) -> u32 {
        (((v << 1) ^ (v >> 63)) as u32) & 0xffffffff
    }

    fn build_geometry(cmds: &[u32]) -> Vec<u8> {
        let mut out = Vec::new();
        for &c in cmds {
            write_varint(&mut out, c as u64);
        }
        out
    }

    fn build_feature(geom_type: u32, geometry: &[u32]) -> Vec<u8> {
        let mut feat = Vec::new();
        write_tag(&mut feat, 3, 0);
        write_varint(&mut feat, geom_type as u64);
        write_length_delimited(&mut feat, 4, &build_geometry(geometry));
        feat
    }

    fn build_layer(name: &str, feature: &[u8], extent: u32) -> Vec<u8> {
        let mut layer = Vec::new();
        write_length_delimited(&mut layer, 1, name.as_bytes());
        write_length_delimited(&mut layer, 2, feature);
        write_tag(&mut layer, 5, 0);
        write_varint(&mut layer, extent as u64);
        layer
    }

    #[test]
    fn decodes_a_single_line_feature() {
        let geometry = [
            encode_command(CMD_MOVE_TO, 1),
            encode_zigzag(0),
            encode_zigzag(0),
            encode_command(CMD_LINE_TO, 1),
            encode_zigzag(4096),
            encode_zigzag(0),
        ];
        let feature = build_feature(2, &geometry);
        let layer = build_layer("roads", &feature, 4096);

        let mut tile_bytes = Vec::new();
        write_length_delimited(&mut tile_bytes, 3, &layer);

        let tile = decode(&tile_bytes, TileSourceId(1), &|| false).unwrap();
        assert_eq!(tile.layers.len(), 1);
        assert_eq!(tile.layers[0].name, "roads");
        let feature = &tile.layers[0].features[0];
        assert_eq!(feature.geometry_type, GeometryType::Lines);
        assert_eq!(feature.lines[0].len(), 2);
        // extent 4096 normalizes (4096,0) delta to x=1.0
        assert!((feature.lines[0][1].x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn polygon_winding_is_inferred_by_signed_area() {
        // Outer ring: counter-clockwise square (positive area in this frame).
        let geometry = [
            encode_command(CMD_MOVE_TO, 1),
            encode_zigzag(0),
            encode_zigzag(0),
            encode_command(CMD_LINE_TO, 3),
            encode_zigzag(0),
            encode_zigzag(10),
            encode_zigzag(10),
            encode_zigzag(0),
            encode_zigzag(-10),
            encode_zigzag(-10),
            encode_command(CMD_CLOSE_PATH, 1),
        ];
        let feature = build_feature(3, &geometry);
        let layer = build_layer("water", &feature, 4096);
        let mut tile_bytes = Vec::new();
        write_length_delimited(&mut tile_bytes, 3, &layer);

        let tile = decode(&tile_bytes, TileSourceId(1), &|| false).unwrap();
        let feature = &tile.layers[0].features[0];
        assert_eq!(feature.geometry_type, GeometryType::Polygons);
        assert_eq!(feature.polygons.len(), 1);
        assert_eq!(feature.polygons[0].len(), 1); // single outer ring, no holes
    }

    #[test]
    fn cancellation_stops_before_remaining_layers() {
        let geometry = [
            encode_command(CMD_MOVE_TO, 1),
            encode_zigzag(0),
            encode_zigzag(0),
        ];
        let feature = build_feature(1, &geometry);
        let layer = build_layer("points", &feature, 4096);

        let mut tile_bytes = Vec::new();
        for _ in 0..3 {
            write_length_delimited(&mut tile_bytes, 3, &layer);
        }

        let seen = std::cell::Cell::new(0);
        let result = decode(&tile_bytes, TileSourceId(1), &|| {
            let n = seen.get();
            seen.set(n + 1);
            n >= 1
        });
        assert!(result.is_err());
    }
}
