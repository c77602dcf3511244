use serde::Serialize;

/// One vaccination center row, after column-name normalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: String,
    pub ubigeo: String,
    pub name: String,
    pub entity: Option<String>,
    pub departamento: String,
    pub provincia: String,
    pub distrito: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Per-record coordinate validity flags. Zero coordinates also set the
/// out-of-range flag (0 lies outside the Peru box); the overlap is kept
/// because the summary counts shown to users depend on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub lat_missing: bool,
    pub lon_missing: bool,
    pub lat_zero: bool,
    pub lon_zero: bool,
    pub lat_out_of_range: bool,
    pub lon_out_of_range: bool,
    pub is_valid: bool,
}

/// Scalar counts over one dataset. Sums exceed `total` because a zero
/// coordinate counts as both zero and out-of-range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoordinateSummary {
    pub total: usize,
    pub null_lat: usize,
    pub null_lon: usize,
    pub zero_lat: usize,
    pub zero_lon: usize,
    pub out_of_range_lat: usize,
    pub out_of_range_lon: usize,
    pub valid: usize,
}

/// One ranked (label, count) aggregate entry, ready for pie-style display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub label: String,
    pub count: usize,
}

impl Bucket {
    pub fn new(label: impl Into<String>, count: usize) -> Self {
        Bucket {
            label: label.into(),
            count,
        }
    }
}

/// A departamento polygon feature with its join key already extracted.
#[derive(Debug, Clone)]
pub struct RegionFeature {
    pub name: String,
    pub feature: geojson::Feature,
}

/// Join result for one region feature. `count` is 0 when no aggregate
/// matched the feature's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionCount {
    pub name: String,
    pub count: usize,
    pub tooltip: String,
}
