//! Reads a GeoJSON fixture from disk (as a real `TileSource`/cache-backed
//! pipeline would) and confirms the decode stage round-trips through a
//! temp file the same as it does through an in-memory byte slice.

use std::fs;
use std::io::Write;

use tangram_core::decode::{decode, TileFormat};
use tangram_core::id::{TileId, TileSourceId};

const FIXTURE: &[u8] = br#"{
    "type": "FeatureCollection",
    "features": [
        {
            "type": "Feature",
            "properties": { "name": "river", "class": "waterway" },
            "geometry": { "type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]] }
        }
    ]
}"#;

#[test]
fn decoding_a_fixture_read_from_a_temp_file_matches_the_in_memory_decode() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("fixture.geojson");
    {
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(FIXTURE).unwrap();
    }

    let from_disk = fs::read(&path).unwrap();
    let tile = TileId::new(0, 0, 0);

    let from_memory = decode(TileFormat::GeoJson, FIXTURE, TileSourceId(1), tile, &|| false).unwrap();
    let from_file = decode(TileFormat::GeoJson, &from_disk, TileSourceId(1), tile, &|| false).unwrap();

    assert_eq!(from_memory.layers.len(), from_file.layers.len());
    assert_eq!(from_memory.layers[0].features.len(), from_file.layers[0].features.len());
    assert_eq!(
        from_memory.layers[0].features[0].props.get("name").unwrap().as_str(),
        from_file.layers[0].features[0].props.get("name").unwrap().as_str()
    );
}
