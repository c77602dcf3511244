pub mod aggregate;
pub mod classify;
pub mod config;
pub mod data;
pub mod join;
pub mod pipeline;
pub mod server;
pub mod types;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use types::Bucket;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once and print the validity metrics and aggregates
    Report {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Restrict the provincia drill-down to this departamento
        #[arg(short, long)]
        departamento: Option<String>,
    },
    /// Serve the pipeline results over the JSON API
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Report {
            config,
            departamento,
        } => {
            let app_config = config::AppConfig::load_from_file(config)?;

            let records = data::load_records(&app_config.input.data_csv)?;
            let regions = data::load_regions(
                &app_config.input.regions_geojson,
                &app_config.input.region_property,
            )?;

            let output = pipeline::run(&app_config.processing, records, regions);
            print_report(&output);

            if let Some(departamento) = departamento {
                let drill = pipeline::drilldown(
                    &app_config.processing,
                    &output.valid,
                    departamento,
                    None,
                );
                println!("\nProvincias de {}:", departamento);
                print_buckets(&drill.buckets);
            }
        }
        Commands::Serve { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            server::start_server(app_config).await?;
        }
    }

    Ok(())
}

fn print_report(output: &pipeline::PipelineOutput) {
    let s = &output.summary;
    println!("Registros totales:        {}", s.total);
    println!("Latitud nula:             {}", s.null_lat);
    println!("Longitud nula:            {}", s.null_lon);
    println!("Latitud cero:             {}", s.zero_lat);
    println!("Longitud cero:            {}", s.zero_lon);
    println!("Latitud fuera de rango:   {}", s.out_of_range_lat);
    println!("Longitud fuera de rango:  {}", s.out_of_range_lon);
    println!("Registros validos:        {}", s.valid);

    println!("\nEntidades administradoras:");
    print_buckets(&output.entity_buckets);

    println!("\nDepartamentos:");
    print_buckets(&output.region_buckets);

    println!("\nCentros por region:");
    for region in &output.region_counts {
        println!("  {}", region.tooltip);
    }
}

fn print_buckets(buckets: &[Bucket]) {
    for bucket in buckets {
        println!("  {}: {}", bucket.label, bucket.count);
    }
}
