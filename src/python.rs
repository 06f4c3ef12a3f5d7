//! Python bindings for the heightmap toolbox front end

use crate::config::{HeightmapConfig, NormalBorder};
use crate::core::{
    to_normal_map, upscale_file, CancellationToken, HeightmapPipeline, HeightmapRequest,
    NormalMapParams, RenderOptions,
};
use crate::types::{BoundingBox, HeightmapError};
use image::{Rgb, RgbImage};
use ndarray::Array3;
use numpy::{IntoPyArray, PyArray3, PyReadonlyArray2};
use pyo3::prelude::*;

fn to_py_err(e: HeightmapError) -> PyErr {
    match e {
        HeightmapError::InvalidBoundingBox(_) | HeightmapError::Config(_) => {
            PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{}", e))
        }
        _ => PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e)),
    }
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(generate_heightmap, m)?)?;
    m.add_function(wrap_pyfunction!(upscale, m)?)?;
    m.add_function(wrap_pyfunction!(normal_map, m)?)?;
    Ok(())
}

/// Generate a heightmap for a bounding box and write it to `output`.
/// Returns the output image size as (width, height).
#[pyfunction]
#[pyo3(signature = (
    west, south, east, north, output,
    flatten_water = false, include_rivers = false, normal_map = false,
    min_elevation = None, config_path = None
))]
#[allow(clippy::too_many_arguments)]
fn generate_heightmap(
    west: f64,
    south: f64,
    east: f64,
    north: f64,
    output: String,
    flatten_water: bool,
    include_rivers: bool,
    normal_map: bool,
    min_elevation: Option<i32>,
    config_path: Option<String>,
) -> PyResult<(u32, u32)> {
    let config = match config_path {
        Some(path) => HeightmapConfig::from_file(path).map_err(to_py_err)?,
        None => HeightmapConfig::default(),
    };
    let pipeline = HeightmapPipeline::new(config).map_err(to_py_err)?;

    let request = HeightmapRequest {
        bbox: BoundingBox::new(west, south, east, north),
        options: RenderOptions::from_flags(flatten_water, include_rivers, normal_map, min_elevation),
    };
    let report = pipeline
        .run(&request, &output, &CancellationToken::new())
        .map_err(to_py_err)?;

    Ok((report.width, report.height))
}

/// Block-upscale an image file by an integer factor
#[pyfunction]
fn upscale(source: String, destination: String, factor: u32) -> PyResult<()> {
    upscale_file(source, destination, factor).map_err(to_py_err)
}

/// Derive a normal map from a 2D uint8 height array; returns (rows, cols, 3)
#[pyfunction]
#[pyo3(signature = (heights, strength = 5.0, clamp_border = false))]
fn normal_map<'py>(
    py: Python<'py>,
    heights: PyReadonlyArray2<'py, u8>,
    strength: f32,
    clamp_border: bool,
) -> PyResult<&'py PyArray3<u8>> {
    let heights = heights.as_array();
    let (rows, cols) = heights.dim();
    let image = RgbImage::from_fn(cols as u32, rows as u32, |x, y| {
        let v = heights[[y as usize, x as usize]];
        Rgb([v, v, v])
    });

    let params = NormalMapParams {
        strength,
        border: if clamp_border { NormalBorder::ClampEdge } else { NormalBorder::Black },
    };
    let normals = to_normal_map(&image, &params, &CancellationToken::new()).map_err(to_py_err)?;

    let array = Array3::from_shape_vec((rows, cols, 3), normals.into_raw())
        .map_err(|e| PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e)))?;
    Ok(array.into_pyarray(py))
}
