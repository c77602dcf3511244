use crate::types::{Record, RegionFeature};
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use geojson::GeoJson;
use std::fs;
use std::path::Path;

/// Column indices resolved once per file. The registry export uses Spanish
/// headers (`latitud`/`longitud`); some exports already carry the canonical
/// English pair. Either convention is accepted; absent columns stay `None`.
struct ColumnMap {
    id: Option<usize>,
    ubigeo: Option<usize>,
    name: Option<usize>,
    entity: Option<usize>,
    departamento: Option<usize>,
    provincia: Option<usize>,
    distrito: Option<usize>,
    latitude: Option<usize>,
    longitude: Option<usize>,
}

impl ColumnMap {
    fn resolve(headers: &csv::StringRecord) -> Self {
        let find = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
        ColumnMap {
            id: find("id_centro_vacunacion"),
            ubigeo: find("id_ubigeo"),
            name: find("nombre"),
            entity: find("entidad_administra"),
            departamento: find("departamento"),
            provincia: find("provincia"),
            distrito: find("distrito"),
            latitude: find("latitud").or_else(|| find("latitude")),
            longitude: find("longitud").or_else(|| find("longitude")),
        }
    }
}

pub fn load_records(path: &Path) -> Result<Vec<Record>> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read CSV file: {:?}", path))?;
    let records = parse_records(&bytes)?;
    println!("Loaded {} records from {:?}", records.len(), path);
    Ok(records)
}

/// Decodes the registry CSV (UTF-8 or Windows-1252, place names carry
/// accented characters) and normalizes rows onto the canonical field set.
pub fn parse_records(bytes: &[u8]) -> Result<Vec<Record>> {
    let content = decode_to_utf8(bytes);
    let mut rdr = ReaderBuilder::new().from_reader(content.as_bytes());
    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();
    let columns = ColumnMap::resolve(&headers);

    let mut records = Vec::new();
    for result in rdr.records() {
        let row = result?;
        records.push(normalize_row(&row, &columns));
    }
    Ok(records)
}

/// Try UTF-8 first; on failure fall back to Windows-1252, which covers the
/// Latin-1 exports the registry actually ships.
fn decode_to_utf8(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

fn normalize_row(row: &csv::StringRecord, columns: &ColumnMap) -> Record {
    let text = |idx: Option<usize>| -> String {
        idx.and_then(|i| row.get(i))
            .unwrap_or("")
            .trim()
            .to_string()
    };
    // Non-numeric coordinate text is treated as missing, never an error.
    let coord = |idx: Option<usize>| -> Option<f64> {
        idx.and_then(|i| row.get(i))
            .and_then(|v| v.trim().parse::<f64>().ok())
    };

    let entity = text(columns.entity);
    Record {
        id: text(columns.id),
        ubigeo: text(columns.ubigeo),
        name: text(columns.name),
        entity: if entity.is_empty() { None } else { Some(entity) },
        departamento: text(columns.departamento),
        provincia: text(columns.provincia),
        distrito: text(columns.distrito),
        latitude: coord(columns.latitude),
        longitude: coord(columns.longitude),
    }
}

pub fn load_regions(path: &Path, name_property: &str) -> Result<Vec<RegionFeature>> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let regions = parse_regions(&bytes, name_property)?;
    println!("Loaded {} region features from {:?}", regions.len(), path);
    Ok(regions)
}

pub fn parse_regions(bytes: &[u8], name_property: &str) -> Result<Vec<RegionFeature>> {
    let geojson = GeoJson::from_reader(bytes).context("Failed to parse GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("Region GeoJSON must be a FeatureCollection")),
    };

    let mut regions = Vec::new();
    for feature in collection.features {
        let name_val = feature
            .properties
            .as_ref()
            .and_then(|props| props.get(name_property));

        let name = match name_val {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => continue, // Skip features without a usable join key
        };

        regions.push(RegionFeature { name, feature });
    }

    Ok(regions)
}
