use crate::core::masks::{build_band_mask, mask_fill_value, BandMask, MaskFlag, QualityMask};
use crate::core::selection::{check_band_axis, BandSelection};
use crate::io::granule::{RawData, RawGranule, RawGroup, RawVariable};
use crate::types::{
    AttrValue, BandCoordinate, BandSemantics, GeoTransform, GltFields, GranuleId, OrthoError, OrthoResult, ProductType,
    SensorCube, Variable, FILL_VALUE,
};
use ndarray::{s, Array1, Array2, ArrayD, Axis, Ix2, Ix3, IxDyn, Zip};
use serde::{Deserialize, Serialize};

const LOCATION_GROUP: &str = "location";

/// Dataset assembly parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyParams {
    /// Sentinel replaced with NaN after masking
    pub fill_value: f32,
    /// Skip granule-id parsing and use this product type
    pub product_type: Option<ProductType>,
    /// Restrict the band axis before returning
    pub selection: Option<BandSelection>,
}

impl Default for AssemblyParams {
    fn default() -> Self {
        Self {
            fill_value: FILL_VALUE,
            product_type: None,
            selection: None,
        }
    }
}

/// Builds a validated, masked [`SensorCube`] from a decoded granule
pub struct DatasetAssembler {
    params: AssemblyParams,
}

impl DatasetAssembler {
    pub fn new(params: AssemblyParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(AssemblyParams::default())
    }

    /// Merge root variables with the location and band groups, then apply
    /// the quality mask, the band mask, and fill-to-NaN substitution in
    /// that order.
    ///
    /// The band mask is spectral: it only touches variables on the
    /// wavelength axis of radiance and reflectance products. Observation
    /// layers, mask layers and mineral axes pass through unmasked.
    pub fn assemble(
        &self,
        raw: RawGranule,
        quality_mask: Option<&QualityMask>,
        band_mask: Option<&BandMask>,
    ) -> OrthoResult<SensorCube> {
        let product = match self.params.product_type {
            Some(product) => product,
            None => GranuleId::parse(&raw.name)?.product,
        };
        log::info!("Assembling {} as {}", raw.name, product);

        // Schema checks first: nothing is masked until everything is known to fit
        let location = raw.group(LOCATION_GROUP)?;
        let lat = read_grid_f64(location.require(LOCATION_GROUP, "lat")?)?;
        let lon = read_grid_f64(location.require(LOCATION_GROUP, "lon")?)?;
        let sensor_shape = lat.dim();
        if lon.dim() != sensor_shape {
            return Err(OrthoError::Shape(format!(
                "lon is {:?}, lat is {:?}",
                lon.dim(),
                sensor_shape
            )));
        }

        let elevation = match location.variable("elev") {
            Some(var) => {
                let elev = read_grid_f64(var)?.mapv(|v| v as f32);
                check_grid(&var.name, elev.dim(), sensor_shape)?;
                Some(elev)
            }
            None => None,
        };

        let glt = read_glt(location)?;
        let band_coord = read_band_coordinate(&raw, product)?;
        let geotransform = read_geotransform(&raw)?;
        let spatial_ref = raw
            .root
            .attributes
            .get("spatial_ref")
            .and_then(|v| v.as_text())
            .map(|s| s.to_string());

        let mut variables = raw
            .root
            .variables
            .iter()
            .map(|var| read_data_variable(var, sensor_shape))
            .collect::<OrthoResult<Vec<Variable>>>()?;

        for variable in variables.iter().filter(|v| v.band_dim() == Some(band_coord.dim())) {
            check_band_axis(&variable.name, &variable.data, &band_coord)?;
        }

        if let Some(qmask) = quality_mask {
            check_grid("quality mask", qmask.dim(), sensor_shape)?;
        }
        if let Some(bmask) = band_mask {
            let spectral: Vec<&Variable> = variables
                .iter()
                .filter(|v| on_spectral_axis(v, product, &band_coord))
                .collect();
            check_band_mask(bmask, &spectral, sensor_shape)?;
            if spectral.is_empty() {
                log::warn!("{} has no spectral variables, band mask not applied", product);
            }
        }

        for variable in variables.iter_mut() {
            if let Some(qmask) = quality_mask {
                apply_quality_mask(&mut variable.data, qmask);
            }
            if let Some(bmask) = band_mask {
                if on_spectral_axis(variable, product, &band_coord) {
                    apply_band_mask(&mut variable.data, bmask);
                }
            }
            mask_fill_value(&mut variable.data, self.params.fill_value);
        }

        if let Some(qmask) = quality_mask {
            log::info!("Quality mask excluded {:.1}% of pixels", qmask.excluded_fraction() * 100.0);
        }
        if let Some(bmask) = band_mask {
            log::info!("Band mask excluded {:.1}% of pixel-bands", bmask.excluded_fraction() * 100.0);
        }

        let cube = SensorCube {
            granule_id: raw.name.clone(),
            product,
            variables,
            band_coord,
            lat,
            lon,
            elevation,
            glt,
            geotransform,
            spatial_ref,
            attributes: raw.root.attributes.clone(),
        };

        log::debug!(
            "Assembled {} variables on a {:?} sensor grid",
            cube.variables.len(),
            sensor_shape
        );

        match &self.params.selection {
            Some(selection) => cube.select_bands(selection),
            None => Ok(cube),
        }
    }
}

/// Build a quality mask from the `mask` variable of a mask-product granule
pub fn quality_mask_from_granule(raw: &RawGranule, flags: &[MaskFlag]) -> OrthoResult<QualityMask> {
    let mask_var = raw.root.require("root", "mask")?;
    let layers = mask_var
        .data
        .to_f32()
        .ok_or_else(|| OrthoError::InvalidFormat("mask variable is not numeric".to_string()))?
        .into_dimensionality::<Ix3>()
        .map_err(|e| OrthoError::Shape(format!("mask must be (rows, cols, layers): {}", e)))?;

    if let Ok(params) = raw.group("sensor_band_parameters") {
        if let Some(RawData::Text(labels)) = params.variable("mask_bands").map(|v| &v.data) {
            let used: Vec<&str> = flags
                .iter()
                .filter_map(|f| labels.get(f.index()).map(|s| s.as_str()))
                .collect();
            log::info!("Flags used: {:?}", used);
        }
    }

    QualityMask::from_flags(layers.view(), flags)
}

/// Unpack the `band_mask` variable of a mask-product granule
pub fn band_mask_from_granule(raw: &RawGranule) -> OrthoResult<BandMask> {
    let band_mask_var = raw.root.require("root", "band_mask")?;
    let packed = match &band_mask_var.data {
        RawData::UInt8(a) => a.clone(),
        _ => {
            return Err(OrthoError::InvalidFormat(
                "band_mask must be packed unsigned bytes".to_string(),
            ))
        }
    };
    let packed = packed
        .into_dimensionality::<Ix3>()
        .map_err(|e| OrthoError::Shape(format!("band_mask must be (rows, cols, bytes): {}", e)))?;

    build_band_mask(packed.view())
}

fn check_grid(name: &str, dim: (usize, usize), sensor_shape: (usize, usize)) -> OrthoResult<()> {
    if dim != sensor_shape {
        return Err(OrthoError::Shape(format!(
            "{} is {:?}, sensor grid is {:?}",
            name, dim, sensor_shape
        )));
    }
    Ok(())
}

fn read_grid_f64(var: &RawVariable) -> OrthoResult<Array2<f64>> {
    var.data
        .to_f64()
        .ok_or_else(|| OrthoError::InvalidFormat(format!("'{}' is not numeric", var.name)))?
        .into_dimensionality::<Ix2>()
        .map_err(|e| OrthoError::Shape(format!("'{}' must be 2-D: {}", var.name, e)))
}

/// GLT fields are optional, but both or neither must be present
fn read_glt(location: &RawGroup) -> OrthoResult<Option<GltFields>> {
    match (location.variable("glt_x"), location.variable("glt_y")) {
        (Some(x), Some(y)) => {
            let glt_x = read_grid_f64(x)?;
            let glt_y = read_grid_f64(y)?;
            if glt_x.dim() != glt_y.dim() {
                return Err(OrthoError::Shape(format!(
                    "glt_x {:?} and glt_y {:?} differ",
                    glt_x.dim(),
                    glt_y.dim()
                )));
            }
            Ok(Some(GltFields { glt_x, glt_y }))
        }
        (None, None) => Ok(None),
        (Some(_), None) => Err(OrthoError::MissingField("glt_y in group 'location'".to_string())),
        (None, Some(_)) => Err(OrthoError::MissingField("glt_x in group 'location'".to_string())),
    }
}

fn read_band_coordinate(raw: &RawGranule, product: ProductType) -> OrthoResult<BandCoordinate> {
    let group_name = product.band_group();
    let group = raw.group(group_name)?;
    let coord_var = group.require(group_name, product.band_variable())?;
    let dim = product.band_dim().to_string();

    let coord = match &coord_var.data {
        RawData::Text(labels) => BandCoordinate::Labels {
            dim,
            values: labels.clone(),
        },
        data => {
            let values: Array1<f64> = data
                .to_f64()
                .ok_or_else(|| OrthoError::InvalidFormat(format!("'{}' is not numeric", coord_var.name)))?
                .iter()
                .copied()
                .collect();
            let fwhm = group
                .variable("fwhm")
                .and_then(|v| v.data.to_f64())
                .map(|a| a.iter().copied().collect::<Array1<f64>>());
            if let Some(fwhm) = &fwhm {
                if fwhm.len() != values.len() {
                    return Err(OrthoError::Shape(format!(
                        "fwhm has {} entries, '{}' has {}",
                        fwhm.len(),
                        coord_var.name,
                        values.len()
                    )));
                }
            }
            BandCoordinate::Wavelengths { dim, values, fwhm }
        }
    };

    Ok(coord)
}

/// Geotransform from the root attributes, falling back to the location group
fn read_geotransform(raw: &RawGranule) -> OrthoResult<Option<GeoTransform>> {
    let attr = raw.root.attributes.get("geotransform").or_else(|| {
        raw.groups
            .get(LOCATION_GROUP)
            .and_then(|g| g.attributes.get("geotransform"))
    });

    match attr {
        Some(AttrValue::Numbers(coefficients)) => Ok(Some(GeoTransform::from_coefficients(coefficients)?)),
        Some(other) => Err(OrthoError::InvalidFormat(format!(
            "geotransform must be six numbers, got {:?}",
            other
        ))),
        None => Ok(None),
    }
}

fn read_data_variable(var: &RawVariable, sensor_shape: (usize, usize)) -> OrthoResult<Variable> {
    let data = var
        .data
        .to_f32()
        .ok_or_else(|| OrthoError::InvalidFormat(format!("data variable '{}' is not numeric", var.name)))?;

    let shape = data.shape();
    if shape.len() != 2 && shape.len() != 3 {
        return Err(OrthoError::Shape(format!(
            "data variable '{}' has {} dimensions, expected 2 or 3",
            var.name,
            shape.len()
        )));
    }
    if (shape[0], shape[1]) != sensor_shape {
        return Err(OrthoError::Shape(format!(
            "data variable '{}' is {:?}, sensor grid is {:?}",
            var.name, shape, sensor_shape
        )));
    }

    Ok(Variable {
        name: var.name.clone(),
        dims: var.dims.clone(),
        data,
        attributes: var.attributes.clone(),
    })
}

fn on_spectral_axis(variable: &Variable, product: ProductType, band_coord: &BandCoordinate) -> bool {
    product.band_semantics() == BandSemantics::Spectral && variable.band_dim() == Some(band_coord.dim())
}

/// Spectral variables must carry the same spatial grid and band count as the mask
fn check_band_mask(bmask: &BandMask, variables: &[&Variable], sensor_shape: (usize, usize)) -> OrthoResult<()> {
    let (rows, cols, bands) = bmask.dim();
    check_grid("band mask", (rows, cols), sensor_shape)?;

    for variable in variables {
        if variable.data.len_of(Axis(2)) != bands {
            return Err(OrthoError::Shape(format!(
                "band mask is {:?}, data variable '{}' is {:?}",
                bmask.dim(),
                variable.name,
                variable.data.shape()
            )));
        }
    }
    Ok(())
}

fn apply_quality_mask(data: &mut ArrayD<f32>, qmask: &QualityMask) {
    for ((row, col), &flag) in qmask.0.indexed_iter() {
        if flag != 1.0 {
            continue;
        }
        if data.ndim() == 2 {
            data[IxDyn(&[row, col])] = f32::NAN;
        } else {
            data.slice_mut(s![row, col, ..]).fill(f32::NAN);
        }
    }
}

fn apply_band_mask(data: &mut ArrayD<f32>, bmask: &BandMask) {
    Zip::from(data.view_mut())
        .and(bmask.0.view().into_dyn())
        .for_each(|value, &flag| {
            if flag == 1 {
                *value = f32::NAN;
            }
        });
}
