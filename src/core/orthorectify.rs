use crate::core::coordinates::{compute_axes, grid_bounds};
use crate::core::glt::{apply_glt, build_glt_index, valid_cell_count};
use crate::core::masks::mask_fill_value;
use crate::types::{
    BoundingBox, OrthoCube, OrthoError, OrthoResult, OrthoVariable, SensorCube, Variable, FILL_VALUE,
    GLT_NODATA,
};
use ndarray::{Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

/// Orthorectification parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrthoParams {
    /// GLT value meaning "unmapped"
    pub glt_nodata: i64,
    /// Sentinel written to unmapped cells before conversion to NaN
    pub fill_value: f32,
    /// Variables that only make sense in sensor space and are not remapped
    pub excluded_variables: Vec<String>,
    /// Remap variables on the rayon pool
    pub parallel: bool,
}

impl Default for OrthoParams {
    fn default() -> Self {
        Self {
            glt_nodata: GLT_NODATA,
            fill_value: FILL_VALUE,
            excluded_variables: vec!["flat_field_update".to_string()],
            parallel: cfg!(feature = "parallel"),
        }
    }
}

/// GLT orthorectification of sensor-space cubes
pub struct Orthorectifier {
    params: OrthoParams,
}

impl Orthorectifier {
    pub fn new(params: OrthoParams) -> Self {
        Self { params }
    }

    /// Processor with default parameters
    pub fn standard() -> Self {
        Self::new(OrthoParams::default())
    }

    pub fn params(&self) -> &OrthoParams {
        &self.params
    }

    /// Remap every data variable and the elevation onto the geographic grid
    ///
    /// The cube is consumed; each variable's sensor buffer is released as soon
    /// as its remap completes.
    pub fn orthorectify(&self, cube: SensorCube) -> OrthoResult<OrthoCube> {
        log::info!("Starting GLT orthorectification of {} ({})", cube.granule_id, cube.product);

        let sensor_shape = cube.sensor_shape();
        let SensorCube {
            granule_id,
            product,
            variables,
            band_coord,
            elevation,
            glt,
            geotransform,
            spatial_ref,
            attributes,
            ..
        } = cube;

        let glt = glt.ok_or_else(|| OrthoError::MissingField("GLT fields glt_x/glt_y".to_string()))?;
        let elevation = elevation.ok_or_else(|| OrthoError::MissingField("elevation (elev)".to_string()))?;
        let geotransform = geotransform.ok_or_else(|| OrthoError::MissingField("geotransform".to_string()))?;

        // Step 1: index array, NaN coerced to the sentinel
        let index = build_glt_index(&glt, self.params.glt_nodata)?;
        drop(glt);
        let (geo_rows, geo_cols, _) = index.dim();
        log::debug!("Sensor grid: {:?}, geographic grid: {}x{}", sensor_shape, geo_rows, geo_cols);

        let variables: Vec<Variable> = variables
            .into_iter()
            .filter(|v| {
                let excluded = self.params.excluded_variables.contains(&v.name);
                if excluded {
                    log::debug!("Skipping sensor-space-only variable '{}'", v.name);
                }
                !excluded
            })
            .collect();

        self.validate_shapes(&variables, &elevation, sensor_shape)?;

        // Step 2: per-variable remap
        let ortho_variables = if self.params.parallel {
            self.remap_variables_parallel(variables, &index)?
        } else {
            self.remap_variables(variables, &index)?
        };

        // Step 3: elevation through the same, untouched index array
        let elevation = self.remap_elevation(elevation, &index)?;

        // Step 4: coordinate axes from the GLT grid
        let (longitude, latitude) = compute_axes(&geotransform, (geo_rows, geo_cols));

        let valid = valid_cell_count(index.view(), self.params.glt_nodata);
        let total = (geo_rows * geo_cols).max(1);
        log::info!(
            "Orthorectification completed: {} variables, {:.1}% coverage",
            ortho_variables.len(),
            valid as f64 / total as f64 * 100.0
        );

        // Step 5: sensor-space coordinates are left behind
        Ok(OrthoCube {
            granule_id,
            product,
            variables: ortho_variables,
            latitude,
            longitude,
            elevation,
            band_coord,
            geotransform,
            spatial_ref,
            attributes,
        })
    }

    /// All remapped variables and the elevation must sit on the sensor grid
    fn validate_shapes(
        &self,
        variables: &[Variable],
        elevation: &Array2<f32>,
        sensor_shape: (usize, usize),
    ) -> OrthoResult<()> {
        if elevation.dim() != sensor_shape {
            return Err(OrthoError::Shape(format!(
                "elevation is {:?}, sensor grid is {:?}",
                elevation.dim(),
                sensor_shape
            )));
        }

        for variable in variables {
            let ndim = variable.data.ndim();
            if ndim != 2 && ndim != 3 {
                return Err(OrthoError::Shape(format!(
                    "variable '{}' has {} dimensions, expected 2 or 3",
                    variable.name, ndim
                )));
            }
            if variable.spatial_shape() != Some(sensor_shape) {
                return Err(OrthoError::Shape(format!(
                    "variable '{}' is {:?}, sensor grid is {:?}",
                    variable.name,
                    variable.data.shape(),
                    sensor_shape
                )));
            }
        }

        Ok(())
    }

    fn remap_variables(&self, variables: Vec<Variable>, index: &Array3<i64>) -> OrthoResult<Vec<OrthoVariable>> {
        variables
            .into_iter()
            .map(|variable| self.remap_variable(variable, index))
            .collect()
    }

    /// Remap variables on the rayon pool, keeping input order
    #[cfg(feature = "parallel")]
    fn remap_variables_parallel(
        &self,
        variables: Vec<Variable>,
        index: &Array3<i64>,
    ) -> OrthoResult<Vec<OrthoVariable>> {
        use rayon::prelude::*;

        log::debug!("Remapping {} variables in parallel", variables.len());

        variables
            .into_par_iter()
            .map(|variable| self.remap_variable(variable, index))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn remap_variables_parallel(
        &self,
        variables: Vec<Variable>,
        index: &Array3<i64>,
    ) -> OrthoResult<Vec<OrthoVariable>> {
        self.remap_variables(variables, index)
    }

    fn remap_variable(&self, variable: Variable, index: &Array3<i64>) -> OrthoResult<OrthoVariable> {
        let Variable {
            name,
            dims,
            data,
            attributes,
        } = variable;

        log::debug!("Remapping '{}' {:?}", name, data.shape());

        let band_dim = if data.ndim() == 3 { dims.get(2).cloned() } else { None };
        let remapped = apply_glt(data.view(), index.view(), self.params.glt_nodata, self.params.fill_value)?;
        drop(data);

        let mut out_dims = vec!["latitude".to_string(), "longitude".to_string()];
        let mut out = match band_dim {
            Some(dim) => {
                out_dims.push(dim);
                remapped.into_dyn()
            }
            None => remapped.index_axis_move(Axis(2), 0).into_dyn(),
        };
        mask_fill_value(&mut out, self.params.fill_value);

        Ok(OrthoVariable {
            name,
            dims: out_dims,
            data: out,
            attributes,
        })
    }

    fn remap_elevation(&self, elevation: Array2<f32>, index: &Array3<i64>) -> OrthoResult<Array2<f32>> {
        let remapped = apply_glt(
            elevation.view().into_dyn(),
            index.view(),
            self.params.glt_nodata,
            self.params.fill_value,
        )?;
        drop(elevation);

        let mut elevation = remapped.index_axis_move(Axis(2), 0);
        mask_fill_value(&mut elevation, self.params.fill_value);
        Ok(elevation)
    }
}

/// Orthorectify a cube with the given parameters
pub fn orthorectify(cube: SensorCube, params: OrthoParams) -> OrthoResult<OrthoCube> {
    Orthorectifier::new(params).orthorectify(cube)
}

impl OrthoCube {
    /// Pixel-edge extent of the geographic grid
    pub fn bounding_box(&self) -> BoundingBox {
        grid_bounds(&self.geotransform, self.grid_shape())
    }
}
