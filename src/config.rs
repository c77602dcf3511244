use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub data_csv: PathBuf,
    pub regions_geojson: PathBuf,
    /// Feature property holding the departamento name used as the join key.
    pub region_property: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProcessingConfig {
    #[serde(default = "Bounds::peru")]
    pub bounds: Bounds,
    #[serde(default = "default_entity_top_n")]
    pub entity_top_n: usize,
    #[serde(default = "default_region_top_n")]
    pub region_top_n: usize,
    #[serde(default = "default_subregion_top_n")]
    pub subregion_top_n: usize,
    /// Entities beyond the K most frequent fold into the remainder label
    /// when filtering the map by entidad.
    #[serde(default = "default_entity_fold_k")]
    pub entity_fold_k: usize,
}

/// Closed-interval bounding box for coordinate validation.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct Bounds {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl Bounds {
    pub fn peru() -> Self {
        Bounds {
            lat_min: -18.0,
            lat_max: -0.1,
            lon_min: -81.0,
            lon_max: -68.0,
        }
    }

    pub fn contains_lat(&self, lat: f64) -> bool {
        lat >= self.lat_min && lat <= self.lat_max
    }

    pub fn contains_lon(&self, lon: f64) -> bool {
        lon >= self.lon_min && lon <= self.lon_max
    }
}

fn default_entity_top_n() -> usize {
    4
}

fn default_region_top_n() -> usize {
    5
}

fn default_subregion_top_n() -> usize {
    5
}

fn default_entity_fold_k() -> usize {
    4
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        ProcessingConfig {
            bounds: Bounds::peru(),
            entity_top_n: default_entity_top_n(),
            region_top_n: default_region_top_n(),
            subregion_top_n: default_subregion_top_n(),
            entity_fold_k: default_entity_fold_k(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_defaults_apply_when_section_absent() {
        let toml_str = r#"
            [input]
            data_csv = "data/TB_CENTRO_VACUNACION.csv"
            regions_geojson = "data/departamentos.geojson"
            region_property = "NOMBDEP"

            [server]
            port = 8080
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.processing.entity_top_n, 4);
        assert_eq!(config.processing.region_top_n, 5);
        assert_eq!(config.processing.subregion_top_n, 5);
        assert_eq!(config.processing.bounds.lat_min, -18.0);
        assert_eq!(config.processing.bounds.lon_max, -68.0);
    }

    #[test]
    fn bounds_are_closed_intervals() {
        let b = Bounds::peru();
        assert!(b.contains_lat(-18.0));
        assert!(b.contains_lat(-0.1));
        assert!(!b.contains_lat(0.0));
        assert!(b.contains_lon(-81.0));
        assert!(b.contains_lon(-68.0));
        assert!(!b.contains_lon(-67.9));
    }
}
