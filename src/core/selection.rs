use crate::types::{BandCoordinate, OrthoCube, OrthoError, OrthoResult, OrthoVariable, SensorCube};
use ndarray::{ArrayD, Axis};
use serde::{Deserialize, Serialize};

/// Requested subset of the band axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BandSelection {
    /// Nearest wavelengths (nm), with an optional maximum distance
    Wavelengths { targets: Vec<f64>, tolerance: Option<f64> },
    /// Exact labels (mineral names, flag names)
    Labels(Vec<String>),
}

impl BandSelection {
    pub fn wavelengths(targets: Vec<f64>) -> Self {
        BandSelection::Wavelengths { targets, tolerance: None }
    }

    pub fn labels<S: Into<String>>(labels: impl IntoIterator<Item = S>) -> Self {
        BandSelection::Labels(labels.into_iter().map(Into::into).collect())
    }
}

/// Resolve a selection to band indices, in request order
///
/// Wavelengths match the nearest coordinate value (lowest index on ties);
/// labels must match exactly.
pub fn select_band_indices(coord: &BandCoordinate, selection: &BandSelection) -> OrthoResult<Vec<usize>> {
    if coord.is_empty() {
        return Err(OrthoError::Selection(format!(
            "band coordinate '{}' is empty",
            coord.dim()
        )));
    }

    match (coord, selection) {
        (BandCoordinate::Wavelengths { values, .. }, BandSelection::Wavelengths { targets, tolerance }) => {
            if targets.is_empty() {
                return Err(OrthoError::Selection("no wavelengths requested".to_string()));
            }

            targets
                .iter()
                .map(|&target| {
                    let (index, distance) = nearest(values.iter().copied(), target).ok_or_else(|| {
                        OrthoError::Selection(format!("no finite wavelength near {} nm", target))
                    })?;

                    if let Some(tol) = tolerance {
                        if distance > *tol {
                            return Err(OrthoError::Selection(format!(
                                "nearest wavelength to {} nm is {} nm, beyond tolerance {}",
                                target, values[index], tol
                            )));
                        }
                    }
                    Ok(index)
                })
                .collect()
        }
        (BandCoordinate::Labels { values, .. }, BandSelection::Labels(labels)) => {
            if labels.is_empty() {
                return Err(OrthoError::Selection("no labels requested".to_string()));
            }

            labels
                .iter()
                .map(|label| {
                    values
                        .iter()
                        .position(|v| v == label)
                        .ok_or_else(|| OrthoError::Selection(format!("label '{}' not found", label)))
                })
                .collect()
        }
        (BandCoordinate::Wavelengths { .. }, BandSelection::Labels(_)) => Err(OrthoError::Selection(
            "label selection on a wavelength axis".to_string(),
        )),
        (BandCoordinate::Labels { .. }, BandSelection::Wavelengths { .. }) => Err(OrthoError::Selection(
            "wavelength selection on a label axis".to_string(),
        )),
    }
}

/// A variable on the coordinate's axis must be exactly as long as the coordinate
pub fn check_band_axis(name: &str, data: &ArrayD<f32>, coord: &BandCoordinate) -> OrthoResult<()> {
    let bands = data.len_of(Axis(2));
    if bands != coord.len() {
        return Err(OrthoError::Shape(format!(
            "variable '{}' has {} entries along '{}', coordinate has {}",
            name,
            bands,
            coord.dim(),
            coord.len()
        )));
    }
    Ok(())
}

/// Take `indices` along the trailing band axis
fn select_on_axis(data: &ArrayD<f32>, indices: &[usize]) -> ArrayD<f32> {
    data.select(Axis(2), indices)
}

impl SensorCube {
    /// Keep only the selected bands; variables on other axes are untouched
    pub fn select_bands(mut self, selection: &BandSelection) -> OrthoResult<Self> {
        let indices = select_band_indices(&self.band_coord, selection)?;
        let dim = self.band_coord.dim().to_string();

        for variable in self.variables.iter().filter(|v| v.band_dim() == Some(dim.as_str())) {
            check_band_axis(&variable.name, &variable.data, &self.band_coord)?;
        }
        for variable in self.variables.iter_mut() {
            if variable.band_dim() == Some(dim.as_str()) {
                variable.data = select_on_axis(&variable.data, &indices);
            }
        }
        self.band_coord = self.band_coord.select(&indices);

        log::debug!("Selected {} bands along '{}'", indices.len(), dim);
        Ok(self)
    }
}

impl OrthoCube {
    /// Keep only the selected bands; variables on other axes are untouched
    pub fn select_bands(mut self, selection: &BandSelection) -> OrthoResult<Self> {
        let indices = select_band_indices(&self.band_coord, selection)?;
        let dim = self.band_coord.dim().to_string();
        let on_band_axis = |v: &OrthoVariable| v.data.ndim() == 3 && v.dims.get(2) == Some(&dim);

        for variable in self.variables.iter().filter(|v| on_band_axis(*v)) {
            check_band_axis(&variable.name, &variable.data, &self.band_coord)?;
        }
        for variable in self.variables.iter_mut() {
            if on_band_axis(&*variable) {
                variable.data = select_on_axis(&variable.data, &indices);
            }
        }
        self.band_coord = self.band_coord.select(&indices);

        Ok(self)
    }
}

fn nearest(values: impl Iterator<Item = f64>, target: f64) -> Option<(usize, f64)> {
    values
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, v)| (i, (v - target).abs()))
        .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
            Some((_, best_d)) if best_d <= d => best,
            _ => Some((i, d)),
        })
}
