use crate::aggregate::{aggregate, RemainderPolicy};
use crate::classify::{filter_valid, summarize};
use crate::config::{AppConfig, ProcessingConfig};
use crate::data::{parse_records, parse_regions};
use crate::join::{
    annotate_features, count_by_departamento, count_by_departamento_for_entity, folded_entities,
    join_counts, UNIDENTIFIED_LABEL,
};
use crate::types::{Bucket, CoordinateSummary, Record, RegionCount, RegionFeature};
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::sync::Arc;

/// Everything one pipeline run produces. Each field is an independently
/// owned value; re-running on identical input reproduces it exactly.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub records: Vec<Record>,
    pub valid: Vec<Record>,
    pub summary: CoordinateSummary,
    pub entity_buckets: Vec<Bucket>,
    pub region_buckets: Vec<Bucket>,
    pub region_counts: Vec<RegionCount>,
    pub regions: Vec<RegionFeature>,
}

/// Sub-region drill-down for one selected departamento: the provincia
/// buckets plus the region-filtered valid subset for the table view.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Drilldown {
    pub buckets: Vec<Bucket>,
    pub records: Vec<Record>,
}

pub fn run(
    config: &ProcessingConfig,
    records: Vec<Record>,
    regions: Vec<RegionFeature>,
) -> PipelineOutput {
    let summary = summarize(&records, &config.bounds);
    let valid = filter_valid(&records, &config.bounds);

    let entity_labels: Vec<&str> = valid
        .iter()
        .map(|r| r.entity.as_deref().unwrap_or(UNIDENTIFIED_LABEL))
        .collect();
    let entity_buckets = aggregate(
        &entity_labels,
        config.entity_top_n,
        RemainderPolicy::OmitIfEmpty,
    );

    let region_labels: Vec<&str> = valid.iter().map(|r| r.departamento.as_str()).collect();
    let region_buckets = aggregate(
        &region_labels,
        config.region_top_n,
        RemainderPolicy::OmitIfEmpty,
    );

    let counts = count_by_departamento(&valid);
    let region_counts = join_counts(&regions, &counts);

    PipelineOutput {
        records,
        valid,
        summary,
        entity_buckets,
        region_buckets,
        region_counts,
        regions,
    }
}

/// Recomputes the provincia aggregate for one selected departamento and,
/// optionally, one folded entity label. Pure; called per user selection.
pub fn drilldown(
    config: &ProcessingConfig,
    valid: &[Record],
    departamento: &str,
    entity: Option<&str>,
) -> Drilldown {
    let records: Vec<Record> = match entity {
        Some(entity) => {
            let folded = folded_entities(valid, config.entity_fold_k);
            valid
                .iter()
                .zip(&folded)
                .filter(|(r, label)| r.departamento == departamento && label.as_str() == entity)
                .map(|(r, _)| r.clone())
                .collect()
        }
        None => valid
            .iter()
            .filter(|r| r.departamento == departamento)
            .cloned()
            .collect(),
    };

    let labels: Vec<&str> = records.iter().map(|r| r.provincia.as_str()).collect();
    let buckets = aggregate(
        &labels,
        config.subregion_top_n,
        RemainderPolicy::OmitIfEmpty,
    );

    Drilldown { buckets, records }
}

/// The geo-joined view for the map, optionally restricted to one folded
/// entity label.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RegionsView {
    pub counts: Vec<RegionCount>,
    pub collection: geojson::FeatureCollection,
}

pub fn regions_for_entity(
    config: &ProcessingConfig,
    output: &PipelineOutput,
    entity: Option<&str>,
) -> RegionsView {
    let counts = match entity {
        Some(entity) => {
            count_by_departamento_for_entity(&output.valid, entity, config.entity_fold_k)
        }
        None => count_by_departamento(&output.valid),
    };
    RegionsView {
        counts: join_counts(&output.regions, &counts),
        collection: annotate_features(&output.regions, &counts),
    }
}

/// Explicit replacement for the source's process-wide memoized load: the
/// cache key is the SHA-256 of both input files, and a key change is the
/// only invalidation rule.
pub struct DatasetCache {
    config: AppConfig,
    digest: Option<String>,
    output: Option<Arc<PipelineOutput>>,
}

impl DatasetCache {
    pub fn new(config: AppConfig) -> Self {
        DatasetCache {
            config,
            digest: None,
            output: None,
        }
    }

    /// Returns the cached output when the inputs are byte-identical to the
    /// previous load, otherwise rebuilds the whole pipeline.
    pub fn load_or_refresh(&mut self) -> Result<Arc<PipelineOutput>> {
        let csv_bytes = fs::read(&self.config.input.data_csv).with_context(|| {
            format!("Failed to read CSV file: {:?}", self.config.input.data_csv)
        })?;
        let geojson_bytes = fs::read(&self.config.input.regions_geojson).with_context(|| {
            format!(
                "Failed to read GeoJSON file: {:?}",
                self.config.input.regions_geojson
            )
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&csv_bytes);
        hasher.update(&geojson_bytes);
        let digest = hex::encode(hasher.finalize());

        if let Some(output) = &self.output {
            if self.digest.as_deref() == Some(digest.as_str()) {
                return Ok(Arc::clone(output));
            }
        }

        let records = parse_records(&csv_bytes)?;
        let regions = parse_regions(&geojson_bytes, &self.config.input.region_property)?;
        let output = Arc::new(run(&self.config.processing, records, regions));

        self.digest = Some(digest);
        self.output = Some(Arc::clone(&output));
        Ok(output)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Bounds, InputConfig, ServerConfig};
    use std::io::Write;

    fn record(departamento: &str, provincia: &str, entity: Option<&str>, lat: f64) -> Record {
        Record {
            id: "1".to_string(),
            ubigeo: String::new(),
            name: "CENTRO".to_string(),
            entity: entity.map(str::to_string),
            departamento: departamento.to_string(),
            provincia: provincia.to_string(),
            distrito: String::new(),
            latitude: Some(lat),
            longitude: Some(-77.0),
        }
    }

    fn sample_records() -> Vec<Record> {
        vec![
            record("LIMA", "LIMA", Some("MINSA"), -12.0),
            record("LIMA", "HUARAL", Some("MINSA"), -11.5),
            record("LIMA", "LIMA", Some("ESSALUD"), -12.1),
            record("CUSCO", "CUSCO", Some("MINSA"), -13.5),
            record("CUSCO", "CUSCO", None, 0.0), // invalid, dropped from aggregates
        ]
    }

    fn sample_regions() -> Vec<RegionFeature> {
        let geojson = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": { "NOMBDEP": "LIMA" },
                    "geometry": { "type": "Polygon", "coordinates": [[[-77,-12],[-76,-12],[-76,-13],[-77,-12]]] }
                },
                {
                    "type": "Feature",
                    "properties": { "NOMBDEP": "TUMBES" },
                    "geometry": { "type": "Polygon", "coordinates": [[[-81,-4],[-80,-4],[-80,-5],[-81,-4]]] }
                }
            ]
        }"#;
        parse_regions(geojson.as_bytes(), "NOMBDEP").unwrap()
    }

    #[test]
    fn run_produces_consistent_aggregates() {
        let config = ProcessingConfig::default();
        let output = run(&config, sample_records(), sample_regions());

        assert_eq!(output.summary.total, 5);
        assert_eq!(output.summary.valid, 4);
        assert_eq!(output.valid.len(), 4);

        let entity_sum: usize = output.entity_buckets.iter().map(|b| b.count).sum();
        assert_eq!(entity_sum, 4);

        assert_eq!(output.region_buckets[0], Bucket::new("LIMA", 3));
        assert_eq!(output.region_buckets[1], Bucket::new("CUSCO", 1));

        // TUMBES has a polygon but no centers; joins to 0.
        let tumbes = output
            .region_counts
            .iter()
            .find(|c| c.name == "TUMBES")
            .unwrap();
        assert_eq!(tumbes.count, 0);
        assert_eq!(tumbes.tooltip, "TUMBES: 0 centros");
    }

    #[test]
    fn rerunning_on_identical_input_is_deterministic() {
        let config = ProcessingConfig::default();
        let a = run(&config, sample_records(), sample_regions());
        let b = run(&config, sample_records(), sample_regions());
        assert_eq!(a.entity_buckets, b.entity_buckets);
        assert_eq!(a.region_buckets, b.region_buckets);
        assert_eq!(a.region_counts, b.region_counts);
        assert_eq!(a.summary, b.summary);
    }

    #[test]
    fn drilldown_restricts_to_the_selected_departamento() {
        let config = ProcessingConfig::default();
        let valid = filter_valid(&sample_records(), &Bounds::peru());

        let lima = drilldown(&config, &valid, "LIMA", None);
        assert_eq!(lima.records.len(), 3);
        assert_eq!(lima.buckets[0], Bucket::new("LIMA", 2));
        assert_eq!(lima.buckets[1], Bucket::new("HUARAL", 1));

        let nowhere = drilldown(&config, &valid, "LORETO", None);
        assert!(nowhere.buckets.is_empty());
        assert!(nowhere.records.is_empty());
    }

    #[test]
    fn drilldown_entity_filter_uses_folded_labels() {
        let config = ProcessingConfig::default();
        let valid = filter_valid(&sample_records(), &Bounds::peru());

        let minsa = drilldown(&config, &valid, "LIMA", Some("MINSA"));
        assert_eq!(minsa.records.len(), 2);
        let sum: usize = minsa.buckets.iter().map(|b| b.count).sum();
        assert_eq!(sum, 2);
    }

    #[test]
    fn regions_view_honors_the_entity_filter() {
        let config = ProcessingConfig::default();
        let output = run(&config, sample_records(), sample_regions());

        let all = regions_for_entity(&config, &output, None);
        let lima = all.counts.iter().find(|c| c.name == "LIMA").unwrap();
        assert_eq!(lima.count, 3);

        let essalud = regions_for_entity(&config, &output, Some("ESSALUD"));
        let lima = essalud.counts.iter().find(|c| c.name == "LIMA").unwrap();
        assert_eq!(lima.count, 1);
        assert_eq!(lima.tooltip, "LIMA: 1 centros");

        let props = essalud.collection.features[0].properties.as_ref().unwrap();
        assert_eq!(props["count"], serde_json::json!(1));
    }

    #[test]
    fn cache_reuses_output_until_the_input_changes() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("centros.csv");
        let geojson_path = dir.path().join("departamentos.geojson");

        let csv_v1 = "\
id_centro_vacunacion,id_ubigeo,nombre,entidad_administra,departamento,provincia,distrito,latitud,longitud
1,150101,HOSPITAL CENTRAL,MINSA,LIMA,LIMA,LIMA,-12.05,-77.04
";
        let csv_v2 = "\
id_centro_vacunacion,id_ubigeo,nombre,entidad_administra,departamento,provincia,distrito,latitud,longitud
1,150101,HOSPITAL CENTRAL,MINSA,LIMA,LIMA,LIMA,-12.05,-77.04
2,040101,POSTA SUR,ESSALUD,AREQUIPA,AREQUIPA,AREQUIPA,-16.4,-71.5
";
        std::fs::File::create(&csv_path)
            .unwrap()
            .write_all(csv_v1.as_bytes())
            .unwrap();
        std::fs::File::create(&geojson_path)
            .unwrap()
            .write_all(br#"{ "type": "FeatureCollection", "features": [] }"#)
            .unwrap();

        let config = AppConfig {
            input: InputConfig {
                data_csv: csv_path.clone(),
                regions_geojson: geojson_path,
                region_property: "NOMBDEP".to_string(),
            },
            processing: ProcessingConfig::default(),
            server: ServerConfig { port: 0 },
        };

        let mut cache = DatasetCache::new(config);
        let first = cache.load_or_refresh().unwrap();
        assert_eq!(first.summary.total, 1);

        // Same bytes: the same Arc comes back.
        let again = cache.load_or_refresh().unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        // Changed bytes: rebuilt output.
        std::fs::File::create(&csv_path)
            .unwrap()
            .write_all(csv_v2.as_bytes())
            .unwrap();
        let rebuilt = cache.load_or_refresh().unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(rebuilt.summary.total, 2);
    }
}
