use crate::core::{apply_glt, build_band_mask, build_quality_mask, compute_axes, MaskFlag};
use crate::types::{GeoTransform, GranuleId, OrthoError, FILL_VALUE, GLT_NODATA};
use numpy::{IntoPyArray, PyArray1, PyArray2, PyArray3, PyReadonlyArray3, PyReadonlyArrayDyn};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

fn to_py_err(e: OrthoError) -> PyErr {
    match e {
        OrthoError::Validation(_)
        | OrthoError::Shape(_)
        | OrthoError::Selection(_)
        | OrthoError::InvalidFormat(_)
        | OrthoError::MissingField(_) => PyErr::new::<PyValueError, _>(format!("{}", e)),
        _ => PyErr::new::<PyRuntimeError, _>(format!("{}", e)),
    }
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(quality_mask, m)?)?;
    m.add_function(wrap_pyfunction!(band_mask, m)?)?;
    m.add_function(wrap_pyfunction!(glt_remap, m)?)?;
    m.add_function(wrap_pyfunction!(coord_vects, m)?)?;
    m.add_function(wrap_pyfunction!(product_type, m)?)?;
    m.add_function(wrap_pyfunction!(mask_flag_names, m)?)?;
    m.add("FILL_VALUE", FILL_VALUE)?;
    m.add("GLT_NODATA", GLT_NODATA)?;
    Ok(())
}

/// Combine mask-product flag layers into a 0/1 pixel mask
#[pyfunction]
fn quality_mask<'py>(py: Python<'py>, flag_layers: PyReadonlyArray3<f32>, flags: Vec<usize>) -> PyResult<&'py PyArray2<f32>> {
    let qmask = build_quality_mask(flag_layers.as_array(), &flags).map_err(to_py_err)?;
    Ok(qmask.0.into_pyarray(py))
}

/// Unpack a bit-packed band mask to (rows, cols, 285)
#[pyfunction]
fn band_mask<'py>(py: Python<'py>, packed: PyReadonlyArray3<u8>) -> PyResult<&'py PyArray3<u8>> {
    let bmask = build_band_mask(packed.as_array()).map_err(to_py_err)?;
    Ok(bmask.0.into_pyarray(py))
}

#[pyfunction]
#[pyo3(signature = (data, glt, nodata = GLT_NODATA, fill_value = FILL_VALUE))]
fn glt_remap<'py>(
    py: Python<'py>,
    data: PyReadonlyArrayDyn<f32>,
    glt: PyReadonlyArray3<i64>,
    nodata: i64,
    fill_value: f32,
) -> PyResult<&'py PyArray3<f32>> {
    let out = apply_glt(data.as_array(), glt.as_array(), nodata, fill_value).map_err(to_py_err)?;
    Ok(out.into_pyarray(py))
}

/// Longitude and latitude pixel-center axes for a GDAL geotransform
#[pyfunction]
fn coord_vects<'py>(
    py: Python<'py>,
    geotransform: Vec<f64>,
    dim_y: usize,
    dim_x: usize,
) -> PyResult<(&'py PyArray1<f64>, &'py PyArray1<f64>)> {
    let transform = GeoTransform::from_coefficients(&geotransform).map_err(to_py_err)?;
    let (lon, lat) = compute_axes(&transform, (dim_y, dim_x));
    Ok((lon.into_pyarray(py), lat.into_pyarray(py)))
}

/// Product type of a granule id, e.g. "L2A_RFL"
#[pyfunction]
fn product_type(granule: &str) -> PyResult<String> {
    let id = GranuleId::parse(granule).map_err(to_py_err)?;
    Ok(id.product.to_string())
}

#[pyfunction]
fn mask_flag_names() -> Vec<String> {
    MaskFlag::ALL.iter().map(|f| f.to_string()).collect()
}
