use crate::types::{BoundingBox, GeoTransform};
use ndarray::Array1;

/// Pixel-center longitude and latitude axes of a regular grid
///
/// `grid_shape` is (dim_y, dim_x) and must come from the GLT, not from the
/// sensor cube. Returns `(lon, lat)`.
pub fn compute_axes(transform: &GeoTransform, grid_shape: (usize, usize)) -> (Array1<f64>, Array1<f64>) {
    let (dim_y, dim_x) = grid_shape;

    let lon_origin = transform.top_left_x + 0.5 * transform.pixel_width;
    let lat_origin = transform.top_left_y + 0.5 * transform.pixel_height;

    let lon = Array1::from_shape_fn(dim_x, |x| lon_origin + x as f64 * transform.pixel_width);
    let lat = Array1::from_shape_fn(dim_y, |y| lat_origin + y as f64 * transform.pixel_height);

    (lon, lat)
}

/// Pixel-edge extent of a grid
pub fn grid_bounds(transform: &GeoTransform, grid_shape: (usize, usize)) -> BoundingBox {
    let (dim_y, dim_x) = grid_shape;
    let far_x = transform.top_left_x + dim_x as f64 * transform.pixel_width;
    let far_y = transform.top_left_y + dim_y as f64 * transform.pixel_height;

    BoundingBox {
        min_lon: transform.top_left_x.min(far_x),
        max_lon: transform.top_left_x.max(far_x),
        min_lat: transform.top_left_y.min(far_y),
        max_lat: transform.top_left_y.max(far_y),
    }
}
