use crate::config::AppConfig;
use crate::pipeline::{self, DatasetCache, PipelineOutput};
use crate::types::{Bucket, CoordinateSummary, Record};
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

pub struct AppState {
    pub cache: Mutex<DatasetCache>,
}

pub async fn start_server(config: AppConfig) -> Result<()> {
    let port = config.server.port;
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    let state = Arc::new(AppState {
        cache: Mutex::new(DatasetCache::new(config)),
    });

    println!("Starting server on http://{}", addr);

    let app = Router::new()
        .route("/api/metrics", get(metrics_handler))
        .route("/api/registros", get(registros_handler))
        .route("/api/entidades", get(entidades_handler))
        .route("/api/departamentos", get(departamentos_handler))
        .route("/api/regiones", get(regiones_handler))
        .route("/api/drilldown", get(drilldown_handler))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

type ApiError = (StatusCode, String);

/// Refresh the dataset behind the mutex and hand the output to the handler.
/// The file reads and pipeline rebuild run on the blocking pool so a refresh
/// never stalls a tokio worker.
async fn with_output<T>(
    state: &Arc<AppState>,
    f: impl FnOnce(&DatasetCache, &PipelineOutput) -> T + Send + 'static,
) -> Result<T, ApiError>
where
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || {
        let mut cache = state
            .cache
            .lock()
            .map_err(|_| internal_error("dataset cache poisoned"))?;
        let output = cache
            .load_or_refresh()
            .map_err(|e| internal_error(&format!("{:#}", e)))?;
        Ok(f(&cache, &output))
    })
    .await
    .map_err(|e| internal_error(&format!("refresh task failed: {}", e)))?
}

fn internal_error(msg: &str) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, msg.to_string())
}

async fn metrics_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CoordinateSummary>, ApiError> {
    with_output(&state, |_, output| Json(output.summary)).await
}

/// The tabular outputs for the table renderer: the full normalized record
/// set and the valid-only subset.
#[derive(serde::Serialize)]
pub struct RegistrosResponse {
    pub records: Vec<Record>,
    pub valid: Vec<Record>,
}

async fn registros_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RegistrosResponse>, ApiError> {
    with_output(&state, |_, output| {
        Json(RegistrosResponse {
            records: output.records.clone(),
            valid: output.valid.clone(),
        })
    })
    .await
}

async fn entidades_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Bucket>>, ApiError> {
    with_output(&state, |_, output| Json(output.entity_buckets.clone())).await
}

async fn departamentos_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Bucket>>, ApiError> {
    with_output(&state, |_, output| Json(output.region_buckets.clone())).await
}

#[derive(Deserialize)]
struct RegionesParams {
    entidad: Option<String>,
}

async fn regiones_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RegionesParams>,
) -> Result<Json<pipeline::RegionsView>, ApiError> {
    with_output(&state, move |cache, output| {
        let view = pipeline::regions_for_entity(
            &cache.config().processing,
            output,
            params.entidad.as_deref(),
        );
        Json(view)
    })
    .await
}

#[derive(Deserialize)]
struct DrilldownParams {
    departamento: String,
    entidad: Option<String>,
}

async fn drilldown_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DrilldownParams>,
) -> Result<Json<pipeline::Drilldown>, ApiError> {
    with_output(&state, move |cache, output| {
        let result = pipeline::drilldown(
            &cache.config().processing,
            &output.valid,
            &params.departamento,
            params.entidad.as_deref(),
        );
        Json(result)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InputConfig, ProcessingConfig, ServerConfig};
    use std::io::Write;

    fn state_with_sample_data(dir: &tempfile::TempDir) -> Arc<AppState> {
        let csv_path = dir.path().join("centros.csv");
        let geojson_path = dir.path().join("departamentos.geojson");

        let csv = "\
id_centro_vacunacion,id_ubigeo,nombre,entidad_administra,departamento,provincia,distrito,latitud,longitud
1,150101,HOSPITAL CENTRAL,MINSA,LIMA,LIMA,LIMA,-12.05,-77.04
2,150102,POSTA NORTE,MINSA,LIMA,HUARAL,HUARAL,-11.5,-77.2
3,040101,POSTA SUR,ESSALUD,AREQUIPA,AREQUIPA,AREQUIPA,0,-71.5
";
        std::fs::File::create(&csv_path)
            .unwrap()
            .write_all(csv.as_bytes())
            .unwrap();
        std::fs::File::create(&geojson_path)
            .unwrap()
            .write_all(br#"{ "type": "FeatureCollection", "features": [] }"#)
            .unwrap();

        let config = AppConfig {
            input: InputConfig {
                data_csv: csv_path,
                regions_geojson: geojson_path,
                region_property: "NOMBDEP".to_string(),
            },
            processing: ProcessingConfig::default(),
            server: ServerConfig { port: 0 },
        };

        Arc::new(AppState {
            cache: Mutex::new(DatasetCache::new(config)),
        })
    }

    #[tokio::test]
    async fn refresh_runs_off_the_async_workers() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_sample_data(&dir);

        let summary = with_output(&state, |_, output| output.summary)
            .await
            .unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.valid, 2);
    }

    #[tokio::test]
    async fn registros_exposes_both_record_tables() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_sample_data(&dir);

        let Json(response) = registros_handler(State(state)).await.unwrap();
        assert_eq!(response.records.len(), 3);
        assert_eq!(response.valid.len(), 2);

        // The table renderer consumes this as JSON with canonical names.
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["records"][0]["name"], "HOSPITAL CENTRAL");
        assert_eq!(json["valid"][1]["departamento"], "LIMA");
    }

    #[tokio::test]
    async fn drilldown_returns_the_filtered_subset_with_its_buckets() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_sample_data(&dir);

        let Json(drill) = drilldown_handler(
            State(state),
            Query(DrilldownParams {
                departamento: "LIMA".to_string(),
                entidad: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(drill.records.len(), 2);
        assert_eq!(drill.buckets.len(), 2);
        let json = serde_json::to_value(&drill).unwrap();
        assert_eq!(json["records"][1]["provincia"], "HUARAL");
    }
}
