use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use world_heightmap::core::upscale_file;
use world_heightmap::{
    BoundingBox, CancellationToken, DatasetPaths, HeightmapConfig, HeightmapPipeline,
    HeightmapRequest, RenderOptions,
};

#[derive(Parser, Debug)]
#[command(name = "world-heightmap")]
#[command(about = "Heightmap toolbox: turn a lon/lat box into a heightmap image")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a heightmap for a bounding box
    Generate {
        /// Western bound in degrees
        #[arg(long, allow_hyphen_values = true)]
        west: f64,

        /// Southern bound in degrees
        #[arg(long, allow_hyphen_values = true)]
        south: f64,

        /// Eastern bound in degrees
        #[arg(long, allow_hyphen_values = true)]
        east: f64,

        /// Northern bound in degrees
        #[arg(long, allow_hyphen_values = true)]
        north: f64,

        /// Elevations below this (metres) are raised to it
        #[arg(long, allow_hyphen_values = true)]
        min_elevation: Option<i32>,

        /// Make water elevation always zero
        #[arg(long)]
        flatten_water: bool,

        /// Burn rivers in (requires --flatten-water)
        #[arg(long)]
        rivers: bool,

        /// Write a normal map instead of a heightmap
        #[arg(long)]
        normal_map: bool,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory holding etopo1.tif, the water mask and rivers.tif
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Output image; ".bmp" is appended when there is no extension
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Block-upscale an image by an integer factor
    Upscale {
        input: PathBuf,
        output: PathBuf,

        /// Upscale factor, e.g. 2
        #[arg(short, long, default_value = "2")]
        factor: u32,
    },
}

fn with_default_extension(path: &Path) -> PathBuf {
    if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension("bmp")
    }
}

#[allow(clippy::too_many_arguments)]
fn generate(
    bbox: BoundingBox,
    min_elevation: Option<i32>,
    flatten_water: bool,
    rivers: bool,
    normal_map: bool,
    config: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    output: PathBuf,
) -> Result<()> {
    let mut config = match config {
        Some(path) => HeightmapConfig::from_file(&path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => HeightmapConfig::default(),
    };
    if let Some(dir) = data_dir {
        config.datasets = DatasetPaths::in_dir(dir);
    }

    let pipeline = HeightmapPipeline::new(config)?;
    let request = HeightmapRequest {
        bbox,
        options: RenderOptions::from_flags(flatten_water, rivers, normal_map, min_elevation),
    };

    let output = with_default_extension(&output);
    let report = pipeline
        .run(&request, &output, &CancellationToken::new())
        .with_context(|| format!("generating heightmap for {}", bbox))?;

    println!(
        "Heightmap has been generated: {} ({}x{}, max elevation {} m)",
        output.display(),
        report.width,
        report.height,
        report.max_elevation
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match args.command {
        Command::Generate {
            west,
            south,
            east,
            north,
            min_elevation,
            flatten_water,
            rivers,
            normal_map,
            config,
            data_dir,
            output,
        } => generate(
            BoundingBox::new(west, south, east, north),
            min_elevation,
            flatten_water,
            rivers,
            normal_map,
            config,
            data_dir,
            output,
        ),
        Command::Upscale { input, output, factor } => {
            let output = with_default_extension(&output);
            upscale_file(&input, &output, factor)
                .with_context(|| format!("upscaling {}", input.display()))?;
            println!("Image has been upscaled: {}", output.display());
            Ok(())
        }
    }
}
