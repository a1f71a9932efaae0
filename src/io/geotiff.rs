use crate::types::{OrthoCube, OrthoError, OrthoResult};
use gdal::spatial_ref::SpatialRef;
use gdal::DriverManager;
use ndarray::{ArrayView2, Axis, Ix2, Ix3};
use std::path::Path;

/// Write one orthorectified variable as a (multi-band) GeoTIFF
///
/// Banded variables become one raster band per entry of the band axis.
/// NaN is declared as the no-data value. When the cube carries no WKT
/// spatial reference, geographic WGS 84 is assumed.
pub fn write_geotiff<P: AsRef<Path>>(cube: &OrthoCube, variable: &str, output_path: P) -> OrthoResult<()> {
    let var = cube
        .variable(variable)
        .ok_or_else(|| OrthoError::MissingField(format!("variable '{}' in ortho cube", variable)))?;
    log::info!(
        "Saving {} as GeoTIFF: {}",
        var.name,
        output_path.as_ref().display()
    );

    let data = match var.data.ndim() {
        2 => var
            .data
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|e| OrthoError::Shape(e.to_string()))?
            .insert_axis(Axis(2)),
        _ => var
            .data
            .view()
            .into_dimensionality::<Ix3>()
            .map_err(|e| OrthoError::Shape(e.to_string()))?,
    };
    let (height, width, bands) = data.dim();

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset = driver.create_with_band_type::<f32, _>(
        output_path.as_ref(),
        width as isize,
        height as isize,
        bands as isize,
    )?;

    dataset.set_geo_transform(&cube.geotransform.to_coefficients())?;

    let srs = match &cube.spatial_ref {
        Some(wkt) => SpatialRef::from_wkt(wkt)?,
        None => SpatialRef::from_epsg(4326)?,
    };
    dataset.set_spatial_ref(&srs)?;

    for (band, layer) in data.axis_iter(Axis(2)).enumerate() {
        write_band(&dataset, band + 1, layer, (width, height))?;
    }

    log::info!("GeoTIFF saved: {} band(s), {}x{}", bands, width, height);
    Ok(())
}

fn write_band(
    dataset: &gdal::Dataset,
    index: usize,
    layer: ArrayView2<f32>,
    size: (usize, usize),
) -> OrthoResult<()> {
    let mut rasterband = dataset.rasterband(index as isize)?;
    let flat_data: Vec<f32> = layer.iter().cloned().collect();
    let buffer = gdal::raster::Buffer::new(size, flat_data);
    rasterband.write((0, 0), size, &buffer)?;
    rasterband.set_no_data_value(Some(f64::NAN))?;
    Ok(())
}
