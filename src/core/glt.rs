//! Geolocation lookup table (GLT) gather
//!
//! Every geographic cell carries a 1-based (x, y) index into the sensor grid,
//! or the nodata sentinel. Remapping is an exact-index gather: no
//! interpolation, no averaging, unmapped cells keep the fill value.

use crate::types::{GltFields, OrthoError, OrthoResult};
use ndarray::{s, Array3, ArrayView3, ArrayViewD, Axis, Ix2, Ix3};

/// Stack raw `glt_x`/`glt_y` fields into a (rows, cols, 2) index array
///
/// NaN entries become `nodata`; the remaining values are truncated to integers.
pub fn build_glt_index(fields: &GltFields, nodata: i64) -> OrthoResult<Array3<i64>> {
    if fields.glt_x.dim() != fields.glt_y.dim() {
        return Err(OrthoError::Shape(format!(
            "glt_x {:?} and glt_y {:?} have different shapes",
            fields.glt_x.dim(),
            fields.glt_y.dim()
        )));
    }

    let (rows, cols) = fields.glt_x.dim();
    let to_index = |v: f64| if v.is_nan() { nodata } else { v as i64 };

    Ok(Array3::from_shape_fn((rows, cols, 2), |(r, c, k)| {
        if k == 0 {
            to_index(fields.glt_x[[r, c]])
        } else {
            to_index(fields.glt_y[[r, c]])
        }
    }))
}

/// Number of geographic cells where both GLT indices are valid
pub fn valid_cell_count(glt: ArrayView3<i64>, nodata: i64) -> usize {
    glt.lanes(Axis(2))
        .into_iter()
        .filter(|cell| cell[0] != nodata && cell[1] != nodata)
        .count()
}

/// Remap a sensor-space array onto the geographic grid described by `glt`
///
/// `source` is (rows, cols) or (rows, cols, bands); a 2-D source is treated
/// as a single band. `glt` is (geo_rows, geo_cols, 2) holding 1-based
/// (x, y) = (column, row) indices. The result is (geo_rows, geo_cols, bands)
/// with `fill_value` wherever either index equals `nodata`.
///
/// The index array is only borrowed; the 1-based to 0-based conversion is
/// done per cell and never written back.
pub fn apply_glt<T>(source: ArrayViewD<T>, glt: ArrayView3<i64>, nodata: i64, fill_value: T) -> OrthoResult<Array3<T>>
where
    T: Copy,
{
    let source = as_banded(source)?;
    let (src_rows, src_cols, bands) = source.dim();
    let (geo_rows, geo_cols, pair) = glt.dim();

    if pair != 2 {
        return Err(OrthoError::Shape(format!(
            "GLT trailing axis must hold (x, y) pairs, found length {}",
            pair
        )));
    }

    check_index_bounds(glt, nodata, src_rows, src_cols)?;

    let mut output = Array3::from_elem((geo_rows, geo_cols, bands), fill_value);

    for row in 0..geo_rows {
        for col in 0..geo_cols {
            let glt_x = glt[[row, col, 0]];
            let glt_y = glt[[row, col, 1]];
            if glt_x == nodata || glt_y == nodata {
                continue;
            }

            let src_row = (glt_y - 1) as usize;
            let src_col = (glt_x - 1) as usize;
            output
                .slice_mut(s![row, col, ..])
                .assign(&source.slice(s![src_row, src_col, ..]));
        }
    }

    Ok(output)
}

/// View a 2-D or 3-D array as (rows, cols, bands) without copying
fn as_banded<T>(source: ArrayViewD<T>) -> OrthoResult<ArrayView3<T>> {
    match source.ndim() {
        2 => {
            let flat = source
                .into_dimensionality::<Ix2>()
                .map_err(|e| OrthoError::Shape(format!("Failed to view source as 2-D: {}", e)))?;
            Ok(flat.insert_axis(Axis(2)))
        }
        3 => source
            .into_dimensionality::<Ix3>()
            .map_err(|e| OrthoError::Shape(format!("Failed to view source as 3-D: {}", e))),
        n => Err(OrthoError::Shape(format!(
            "source must be 2-D or 3-D, got {} dimensions",
            n
        ))),
    }
}

/// Ensure every valid index lands inside the source grid
fn check_index_bounds(glt: ArrayView3<i64>, nodata: i64, src_rows: usize, src_cols: usize) -> OrthoResult<()> {
    let (geo_rows, geo_cols, _) = glt.dim();

    for row in 0..geo_rows {
        for col in 0..geo_cols {
            let glt_x = glt[[row, col, 0]];
            let glt_y = glt[[row, col, 1]];
            if glt_x == nodata || glt_y == nodata {
                continue;
            }

            let x_ok = glt_x >= 1 && glt_x as u64 <= src_cols as u64;
            let y_ok = glt_y >= 1 && glt_y as u64 <= src_rows as u64;
            if !x_ok || !y_ok {
                return Err(OrthoError::Shape(format!(
                    "GLT cell ({}, {}) points at (x={}, y={}) outside the {}x{} sensor grid",
                    row, col, glt_x, glt_y, src_rows, src_cols
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2, Array3};

    const FILL: f32 = -9999.0;

    fn glt_from_pairs(pairs: &[[(i64, i64); 2]; 2]) -> Array3<i64> {
        Array3::from_shape_fn((2, 2, 2), |(r, c, k)| {
            let (x, y) = pairs[r][c];
            if k == 0 {
                x
            } else {
                y
            }
        })
    }

    #[test]
    fn test_single_band_gather() {
        let source = array![[5.0f32, 6.0], [7.0, 8.0]];
        let glt = glt_from_pairs(&[[(1, 1), (0, 0)], [(2, 1), (1, 2)]]);

        let out = apply_glt(source.view().into_dyn(), glt.view(), 0, FILL).unwrap();

        assert_eq!(out.dim(), (2, 2, 1));
        assert_eq!(out[[0, 0, 0]], 5.0);
        assert_eq!(out[[0, 1, 0]], FILL);
        assert_eq!(out[[1, 0, 0]], 6.0);
        assert_eq!(out[[1, 1, 0]], 7.0);
    }

    #[test]
    fn test_multiband_gather_matches_source_pixels() {
        let source = Array3::from_shape_fn((3, 4, 5), |(r, c, b)| (r * 100 + c * 10 + b) as f32);
        let glt = Array3::from_shape_fn((4, 3, 2), |(r, c, k)| {
            if (r + c) % 3 == 0 {
                0
            } else if k == 0 {
                (c % 4 + 1) as i64
            } else {
                (r % 3 + 1) as i64
            }
        });

        let out = apply_glt(source.view().into_dyn(), glt.view(), 0, FILL).unwrap();
        assert_eq!(out.dim(), (4, 3, 5));

        for r in 0..4 {
            for c in 0..3 {
                let (x, y) = (glt[[r, c, 0]], glt[[r, c, 1]]);
                for b in 0..5 {
                    if x == 0 || y == 0 {
                        assert_eq!(out[[r, c, b]], FILL);
                    } else {
                        let expected = source[[(y - 1) as usize, (x - 1) as usize, b]];
                        assert_eq!(out[[r, c, b]], expected);
                    }
                }
            }
        }
    }

    #[test]
    fn test_single_band_equals_general_path() {
        let flat = Array2::from_shape_fn((3, 3), |(r, c)| (r * 3 + c) as f32);
        let banded = flat.clone().insert_axis(Axis(2));
        let glt = Array3::from_shape_fn((2, 3, 2), |(r, c, k)| if k == 0 { (c + 1) as i64 } else { (r + 2) as i64 });

        let a = apply_glt(flat.view().into_dyn(), glt.view(), 0, FILL).unwrap();
        let b = apply_glt(banded.view().into_dyn(), glt.view(), 0, FILL).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_half_valid_cell_is_unmapped() {
        let source = array![[1.0f32, 2.0], [3.0, 4.0]];
        let glt = glt_from_pairs(&[[(1, 0), (0, 2)], [(2, 2), (1, 1)]]);

        let out = apply_glt(source.view().into_dyn(), glt.view(), 0, FILL).unwrap();
        assert_eq!(out[[0, 0, 0]], FILL);
        assert_eq!(out[[0, 1, 0]], FILL);
        assert_eq!(out[[1, 0, 0]], 4.0);
        assert_eq!(out[[1, 1, 0]], 1.0);
    }

    #[test]
    fn test_custom_sentinel_checked_before_decrement() {
        // Index 0 is not the sentinel here, so it is range-checked, never decremented
        let source = array![[1.0f32, 2.0], [3.0, 4.0]];
        let glt = glt_from_pairs(&[[(-1, -1), (1, 1)], [(2, 2), (-1, 1)]]);

        let out = apply_glt(source.view().into_dyn(), glt.view(), -1, FILL).unwrap();
        assert_eq!(out[[0, 0, 0]], FILL);
        assert_eq!(out[[0, 1, 0]], 1.0);
        assert_eq!(out[[1, 0, 0]], 4.0);
        assert_eq!(out[[1, 1, 0]], FILL);

        let zero_index = glt_from_pairs(&[[(0, 1), (1, 1)], [(1, 1), (1, 1)]]);
        assert!(matches!(
            apply_glt(source.view().into_dyn(), zero_index.view(), -1, FILL),
            Err(OrthoError::Shape(_))
        ));
    }

    #[test]
    fn test_index_array_untouched() {
        let source = array![[5.0f32, 6.0], [7.0, 8.0]];
        let glt = glt_from_pairs(&[[(1, 1), (0, 0)], [(2, 1), (1, 2)]]);
        let before = glt.clone();

        let first = apply_glt(source.view().into_dyn(), glt.view(), 0, FILL).unwrap();
        assert_eq!(glt, before);

        let second = apply_glt(source.view().into_dyn(), glt.view(), 0, FILL).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_out_of_bounds_index_is_shape_error() {
        let source = array![[5.0f32, 6.0], [7.0, 8.0]];
        let glt = glt_from_pairs(&[[(3, 1), (0, 0)], [(1, 1), (1, 1)]]);
        assert!(matches!(
            apply_glt(source.view().into_dyn(), glt.view(), 0, FILL),
            Err(OrthoError::Shape(_))
        ));
    }

    #[test]
    fn test_rejects_unsupported_rank() {
        let source = ndarray::Array1::<f32>::zeros(4);
        let glt = Array3::<i64>::zeros((1, 1, 2));
        assert!(apply_glt(source.view().into_dyn(), glt.view(), 0, FILL).is_err());
    }

    #[test]
    fn test_build_glt_index_coerces_nan() {
        let fields = GltFields {
            glt_x: array![[1.0, f64::NAN], [2.0, 0.0]],
            glt_y: array![[1.0, 3.0], [f64::NAN, 2.0]],
        };
        let index = build_glt_index(&fields, 0).unwrap();

        assert_eq!(index.dim(), (2, 2, 2));
        assert_eq!(index[[0, 0, 0]], 1);
        assert_eq!(index[[0, 1, 0]], 0);
        assert_eq!(index[[0, 1, 1]], 3);
        assert_eq!(index[[1, 0, 1]], 0);
        assert_eq!(valid_cell_count(index.view(), 0), 1);
    }

    #[test]
    fn test_build_glt_index_shape_mismatch() {
        let fields = GltFields {
            glt_x: Array2::zeros((2, 3)),
            glt_y: Array2::zeros((3, 2)),
        };
        assert!(matches!(build_glt_index(&fields, 0), Err(OrthoError::Shape(_))));
    }
}
