//! Cross-module pipeline tests: decode a tile payload, match it against a
//! scene layer's draw rules, and feed the result into the geometry
//! builders, the way a worker thread's `run_task_to_completion` chains
//! them in practice.

use tangram_core::decode::{decode, TileFormat};
use tangram_core::expr::engine::NullEngine;
use tangram_core::expr::{Filter, StyleContext};
use tangram_core::geom::polyline::{self, Cap, Join, PolylineStyle};
use tangram_core::geom::polygon::{self, PolygonStyle};
use tangram_core::id::{TileId, TileSourceId};
use tangram_core::rules::RuleMatcher;
use tangram_core::scene::{DrawRuleData, SceneLayer, StyleParam, StyleParamKey, StyleParamValue};
use tangram_core::GeometryType;

const ROADS_GEOJSON: &[u8] = br#"{
    "type": "FeatureCollection",
    "features": [
        {
            "type": "Feature",
            "properties": { "kind": "path", "name": "Mill Creek Trail" },
            "geometry": {
                "type": "LineString",
                "coordinates": [[-122.42, 37.77], [-122.41, 37.78], [-122.40, 37.77]]
            }
        },
        {
            "type": "Feature",
            "properties": { "kind": "highway" },
            "geometry": {
                "type": "LineString",
                "coordinates": [[-122.0, 37.0], [-121.9, 37.1]]
            }
        }
    ]
}"#;

fn path_rule() -> SceneLayer {
    let mut root = SceneLayer::new("roads", Filter::Nop);
    let mut paths = SceneLayer::new("paths", Filter::Equality("kind".into(), "path".into()));
    paths.rules.push(DrawRuleData::new(
        "lines",
        1,
        vec![
            StyleParam::static_value(StyleParamKey::Color, StyleParamValue::U32(0xff228822)),
            StyleParam::static_value(StyleParamKey::Width, StyleParamValue::Width { value: 1.5, unit_is_meters: false }),
        ],
    ));
    root.sublayers.push(paths);
    root
}

#[test]
fn geojson_features_matching_a_rule_flow_through_to_tessellated_geometry() {
    let tile_id = TileId::new(0, 0, 0);
    let tile_data = decode(TileFormat::GeoJson, ROADS_GEOJSON, TileSourceId(1), tile_id, &|| false)
        .expect("GeoJSON decode should succeed");

    assert_eq!(tile_data.layers.len(), 1);
    assert_eq!(tile_data.layers[0].features.len(), 2);
    assert!(tile_data.raster.is_empty());

    let scene = path_rule();
    let ctx = StyleContext::new(14.0, GeometryType::Lines, 1.0);
    let mut engine = NullEngine;

    let mut matched_count = 0;
    for feature in &tile_data.layers[0].features {
        let rules = RuleMatcher::match_feature(&scene, feature, &ctx, &mut engine);
        let is_path = feature.props.get("kind").and_then(|v| v.as_str()) == Some("path");

        if is_path {
            assert_eq!(rules.len(), 1);
            matched_count += 1;

            let rule = &rules[0];
            let color = rule.get(StyleParamKey::Color).unwrap();
            assert_eq!(color.value, StyleParamValue::U32(0xff228822));

            let style = PolylineStyle {
                cap: Cap::Butt,
                join: Join::Miter,
                half_width_px: 1.5,
                ..Default::default()
            };
            let (vertices, indices) = polyline::build(&feature.lines[0], &style);
            assert_eq!(vertices.len(), polyline::vertex_count(feature.lines[0].len(), &style));
            assert!(!indices.is_empty());
        } else {
            assert!(rules.is_empty(), "the highway feature has no sublayer match and should drop out");
        }
    }
    assert_eq!(matched_count, 1);
}

const BUILDING_GEOJSON: &[u8] = br#"{
    "type": "FeatureCollection",
    "features": [
        {
            "type": "Feature",
            "properties": { "kind": "building", "height": 12.0 },
            "geometry": {
                "type": "Polygon",
                "coordinates": [[
                    [-122.420, 37.770], [-122.420, 37.771],
                    [-122.419, 37.771], [-122.419, 37.770],
                    [-122.420, 37.770]
                ]]
            }
        }
    ]
}"#;

#[test]
fn polygon_features_tessellate_into_extruded_geometry() {
    let tile_id = TileId::new(0, 0, 0);
    let tile_data = decode(TileFormat::GeoJson, BUILDING_GEOJSON, TileSourceId(2), tile_id, &|| false).unwrap();
    let feature = &tile_data.layers[0].features[0];
    assert_eq!(feature.geometry_type, GeometryType::Polygons);

    let style = PolygonStyle {
        min_height: 0.0,
        height: 12.0,
        ..Default::default()
    };
    let (vertices, indices) = polygon::build(&feature.polygons[0], &style);
    assert!(!vertices.is_empty());
    assert_eq!(indices.len() % 3, 0);
}
