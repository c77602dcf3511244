use crate::config::Bounds;
use crate::types::{Classification, CoordinateSummary, Record};

/// Classifies one record's coordinate pair against the bounding region.
///
/// A coordinate of exactly 0 sets both the zero flag and the out-of-range
/// flag (0 is outside both Peru intervals). Downstream summary counts rely
/// on that overlap; do not deduplicate it here.
pub fn classify(record: &Record, bounds: &Bounds) -> Classification {
    let lat = record.latitude;
    let lon = record.longitude;

    let lat_missing = lat.is_none();
    let lon_missing = lon.is_none();
    let lat_zero = lat.map_or(false, |v| v == 0.0);
    let lon_zero = lon.map_or(false, |v| v == 0.0);
    let lat_out_of_range = lat.map_or(false, |v| !bounds.contains_lat(v));
    let lon_out_of_range = lon.map_or(false, |v| !bounds.contains_lon(v));

    Classification {
        lat_missing,
        lon_missing,
        lat_zero,
        lon_zero,
        lat_out_of_range,
        lon_out_of_range,
        is_valid: !(lat_missing
            || lon_missing
            || lat_zero
            || lon_zero
            || lat_out_of_range
            || lon_out_of_range),
    }
}

pub fn summarize(records: &[Record], bounds: &Bounds) -> CoordinateSummary {
    let mut summary = CoordinateSummary {
        total: records.len(),
        ..Default::default()
    };
    for record in records {
        let c = classify(record, bounds);
        summary.null_lat += c.lat_missing as usize;
        summary.null_lon += c.lon_missing as usize;
        summary.zero_lat += c.lat_zero as usize;
        summary.zero_lon += c.lon_zero as usize;
        summary.out_of_range_lat += c.lat_out_of_range as usize;
        summary.out_of_range_lon += c.lon_out_of_range as usize;
        summary.valid += c.is_valid as usize;
    }
    summary
}

/// The trusted working set: records whose coordinates are present, nonzero
/// and inside the bounding region, in their original order.
pub fn filter_valid(records: &[Record], bounds: &Bounds) -> Vec<Record> {
    records
        .iter()
        .filter(|r| classify(r, bounds).is_valid)
        .cloned()
        .collect()
}
