use crate::aggregate::{aggregate, RemainderPolicy, REMAINDER_LABEL};
use crate::types::{Record, RegionCount, RegionFeature};
use geojson::FeatureCollection;
use std::collections::HashMap;

/// Label standing in for a missing administering entity.
pub const UNIDENTIFIED_LABEL: &str = "NO IDENTIFICADO";

pub fn count_by_departamento(records: &[Record]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for record in records {
        *counts.entry(record.departamento.clone()).or_insert(0) += 1;
    }
    counts
}

pub fn tooltip(name: &str, count: usize) -> String {
    format!("{}: {} centros", name, count)
}

/// Exact-name join of per-departamento counts onto the region features.
/// Features with no matching count resolve to 0; counts with no matching
/// feature are silently unused. Neither direction is a failure.
pub fn join_counts(
    features: &[RegionFeature],
    counts: &HashMap<String, usize>,
) -> Vec<RegionCount> {
    features
        .iter()
        .map(|f| {
            let count = counts.get(&f.name).copied().unwrap_or(0);
            RegionCount {
                name: f.name.clone(),
                count,
                tooltip: tooltip(&f.name, count),
            }
        })
        .collect()
}

/// The joined structure for map rendering: each input feature with `count`
/// and `tooltip` added to its properties.
pub fn annotate_features(
    features: &[RegionFeature],
    counts: &HashMap<String, usize>,
) -> FeatureCollection {
    let annotated = features
        .iter()
        .map(|f| {
            let count = counts.get(&f.name).copied().unwrap_or(0);
            let mut feature = f.feature.clone();
            let props = feature.properties.get_or_insert_with(Default::default);
            props.insert("count".to_string(), serde_json::json!(count));
            props.insert(
                "tooltip".to_string(),
                serde_json::json!(tooltip(&f.name, count)),
            );
            feature
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features: annotated,
        foreign_members: None,
    }
}

/// Folds each record's entity onto a closed label set: the `top_k` most
/// frequent entities keep their name, a missing entity becomes
/// `NO IDENTIFICADO`, and everything else becomes `OTROS`.
pub fn folded_entities(records: &[Record], top_k: usize) -> Vec<String> {
    let labels: Vec<String> = records
        .iter()
        .map(|r| {
            r.entity
                .clone()
                .unwrap_or_else(|| UNIDENTIFIED_LABEL.to_string())
        })
        .collect();

    let top: Vec<String> = aggregate(&labels, top_k, RemainderPolicy::OmitIfEmpty)
        .into_iter()
        .take(top_k)
        .map(|b| b.label)
        .collect();

    labels
        .into_iter()
        .map(|label| {
            if top.contains(&label) {
                label
            } else {
                REMAINDER_LABEL.to_string()
            }
        })
        .collect()
}

/// Entity-filtered variant: departamento counts restricted to records whose
/// folded entity equals `entity`.
pub fn count_by_departamento_for_entity(
    records: &[Record],
    entity: &str,
    top_k: usize,
) -> HashMap<String, usize> {
    let folded = folded_entities(records, top_k);
    let mut counts = HashMap::new();
    for (record, label) in records.iter().zip(&folded) {
        if label == entity {
            *counts.entry(record.departamento.clone()).or_insert(0) += 1;
        }
    }
    counts
}
