pub mod geojson;
pub mod mvt;
pub mod pbf;
pub mod topojson;

use crate::errors::TangramError;
use crate::geometry::TileData;
use crate::id::{TileId, TileSourceId};

/// The wire formats a `TileSource` may hand to the decoder, selected by the
/// source's configured media type rather than sniffed from the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileFormat {
    Mvt,
    GeoJson,
    TopoJson,
}

/// Dispatches to the decoder matching `format`. `tile` gives the JSON
/// decoders the tile bounds needed to project lon/lat into tile-local unit
/// coordinates; MVT geometry is already tile-local and ignores it. `cancel`
/// is polled at the decoder's natural safe points (between layers/features
/// for MVT; the JSON decoders have no comparable streaming boundary so they
/// ignore it).
pub fn decode(
    format: TileFormat,
    bytes: &[u8],
    source_id: TileSourceId,
    tile: TileId,
    cancel: &dyn Fn() -> bool,
) -> Result<TileData, TangramError> {
    match format {
        TileFormat::Mvt => mvt::decode(bytes, source_id, cancel),
        TileFormat::GeoJson => geojson::decode(bytes, source_id, tile),
        TileFormat::TopoJson => topojson::decode(bytes, source_id, tile),
    }
}
