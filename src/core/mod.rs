//! Core heightmap processing stages

pub mod cancel;
pub mod coordinates;
pub mod heightmap;
pub mod normal_map;
pub mod normalize;
pub mod pipeline;
pub mod rivers;
pub mod water_mask;

// Re-export main types
pub use cancel::CancellationToken;
pub use coordinates::CoordinateMapper;
pub use heightmap::sample_heightmap;
pub use normal_map::{to_normal_map, NormalMapParams};
pub use normalize::ElevationNormalizer;
pub use pipeline::{
    HeightmapPipeline, HeightmapRequest, OutputKind, PipelineStage, RenderOptions, RenderReport,
    SurfaceMode,
};
pub use rivers::{overlay_rivers, upscale_file, upscale_image};
pub use water_mask::apply_water_mask;
