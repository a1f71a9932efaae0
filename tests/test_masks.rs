use ndarray::{Array3, ArrayD, IxDyn};
use orthocube::io::{band_mask_from_granule, quality_mask_from_granule};
use orthocube::{
    AttrValue, BandSelection, DatasetAssembler, MaskFlag, OrthoError, Orthorectifier, RawData, RawGranule, RawGroup,
    RawVariable, BAND_COUNT,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn location(rows: usize, cols: usize) -> RawGroup {
    let ones = |name: &str| {
        RawVariable::new(
            name,
            &["downtrack", "crosstrack"],
            RawData::Float64(ArrayD::from_elem(IxDyn(&[rows, cols]), 1.0)),
        )
    };
    // identity GLT: geographic cell (r, c) takes sensor pixel (r, c)
    let glt_x = ArrayD::from_shape_fn(IxDyn(&[rows, cols]), |i| (i[1] + 1) as i32);
    let glt_y = ArrayD::from_shape_fn(IxDyn(&[rows, cols]), |i| (i[0] + 1) as i32);

    RawGroup::new()
        .with_variable(ones("lat"))
        .with_variable(ones("lon"))
        .with_variable(ones("elev"))
        .with_variable(RawVariable::new("glt_x", &["ortho_y", "ortho_x"], RawData::Int32(glt_x)))
        .with_variable(RawVariable::new("glt_y", &["ortho_y", "ortho_x"], RawData::Int32(glt_y)))
        .with_attribute("geotransform", AttrValue::Numbers(vec![0.0, 1.0, 0.0, 0.0, 0.0, -1.0]))
}

fn mask_granule() -> RawGranule {
    let mut layers = Array3::<f32>::zeros((2, 3, 8));
    layers[[0, 1, 0]] = 1.0; // cloud
    layers[[0, 1, 4]] = 1.0; // dilated cloud on the same pixel
    layers[[1, 2, 2]] = 1.0; // water
    layers[[1, 0, 5]] = 0.2; // AOD

    let mut packed = Array3::<u8>::zeros((2, 3, 36));
    packed[[1, 1, 0]] = 0b0100_0000; // band 1

    let root = RawGroup::new()
        .with_variable(RawVariable::new(
            "mask",
            &["downtrack", "crosstrack", "bands"],
            RawData::Float32(layers.into_dyn()),
        ))
        .with_variable(RawVariable::new(
            "band_mask",
            &["downtrack", "crosstrack", "packed_wavelength_bands"],
            RawData::UInt8(packed.into_dyn()),
        ));

    let labels = MaskFlag::ALL.iter().map(|f| f.to_string()).collect();
    let params = RawGroup::new().with_variable(RawVariable::new("mask_bands", &["bands"], RawData::Text(labels)));

    RawGranule::new("EMIT_L2A_MASK_001_20230316T045211_2307503_004.nc", root)
        .with_group("location", location(2, 3))
        .with_group("sensor_band_parameters", params)
}

fn radiance_granule() -> RawGranule {
    let rad = Array3::<f32>::from_elem((2, 3, BAND_COUNT), 1.0);
    let flat_field = Array3::<f32>::from_elem((2, 3, BAND_COUNT), 0.98);
    let root = RawGroup::new()
        .with_variable(RawVariable::new(
            "radiance",
            &["downtrack", "crosstrack", "bands"],
            RawData::Float32(rad.into_dyn()),
        ))
        .with_variable(RawVariable::new(
            "flat_field_update",
            &["downtrack", "crosstrack", "bands"],
            RawData::Float32(flat_field.into_dyn()),
        ));

    let wavelengths = ArrayD::from_shape_fn(IxDyn(&[BAND_COUNT]), |i| 381.0 + 7.4 * i[0] as f64);
    let params = RawGroup::new().with_variable(RawVariable::new(
        "wavelengths",
        &["bands"],
        RawData::Float64(wavelengths),
    ));

    RawGranule::new("EMIT_L1B_RAD_001_20230316T045211_2307503_004.nc", root)
        .with_group("location", location(2, 3))
        .with_group("sensor_band_parameters", params)
}

#[test]
fn test_masks_from_mask_granule() {
    init_logging();
    let mask = mask_granule();

    let qmask = quality_mask_from_granule(&mask, &[MaskFlag::Cloud, MaskFlag::DilatedCloud, MaskFlag::Water]).unwrap();
    assert_eq!(qmask.dim(), (2, 3));
    assert!(qmask.is_excluded(0, 1));
    assert!(qmask.is_excluded(1, 2));
    assert!(!qmask.is_excluded(1, 0));
    assert!(qmask.0.iter().all(|&v| v == 0.0 || v == 1.0));

    let bmask = band_mask_from_granule(&mask).unwrap();
    assert_eq!(bmask.dim(), (2, 3, BAND_COUNT));
    assert_eq!(bmask.0[[1, 1, 1]], 1);
    assert_eq!(bmask.0.iter().filter(|&&b| b == 1).count(), 1);
}

#[test]
fn test_data_layers_rejected() {
    let mask = mask_granule();
    for flags in [vec![MaskFlag::Aod550], vec![MaskFlag::Cloud, MaskFlag::H2o]] {
        assert!(matches!(
            quality_mask_from_granule(&mask, &flags),
            Err(OrthoError::Validation(_))
        ));
    }
}

#[test]
fn test_masked_radiance_through_orthorectification() {
    init_logging();
    let mask = mask_granule();
    let qmask = quality_mask_from_granule(&mask, &[MaskFlag::Cloud, MaskFlag::Water]).unwrap();
    let bmask = band_mask_from_granule(&mask).unwrap();

    let sensor = DatasetAssembler::standard()
        .assemble(radiance_granule(), Some(&qmask), Some(&bmask))
        .unwrap();
    let rad = &sensor.variable("radiance").unwrap().data;
    assert!(rad[IxDyn(&[0, 1, 0])].is_nan());
    assert!(rad[IxDyn(&[0, 1, BAND_COUNT - 1])].is_nan());
    assert!(rad[IxDyn(&[1, 1, 1])].is_nan());
    assert_eq!(rad[IxDyn(&[1, 1, 0])], 1.0);
    assert_eq!(rad[IxDyn(&[0, 0, 0])], 1.0);

    let ortho = Orthorectifier::standard().orthorectify(sensor).unwrap();
    assert!(ortho.variable("flat_field_update").is_none());
    let rad = &ortho.variable("radiance").unwrap().data;
    assert_eq!(rad.shape(), &[2, 3, BAND_COUNT]);
    assert!(rad[IxDyn(&[0, 1, 5])].is_nan());
    assert!(rad[IxDyn(&[1, 2, 5])].is_nan());
    assert!(rad[IxDyn(&[1, 1, 1])].is_nan());
    assert_eq!(rad[IxDyn(&[1, 1, 2])], 1.0);
}

#[test]
fn test_mask_product_keeps_flag_labels() {
    let params = orthocube::AssemblyParams {
        selection: Some(BandSelection::labels(["Water flag", "Cloud flag"])),
        ..Default::default()
    };
    let sensor = DatasetAssembler::new(params).assemble(mask_granule(), None, None).unwrap();

    match &sensor.band_coord {
        orthocube::BandCoordinate::Labels { values, .. } => {
            assert_eq!(values, &vec!["Water flag".to_string(), "Cloud flag".to_string()])
        }
        other => panic!("expected labels, got {:?}", other),
    }
    let layers = &sensor.variable("mask").unwrap().data;
    assert_eq!(layers.shape(), &[2, 3, 2]);
    assert_eq!(layers[IxDyn(&[1, 2, 0])], 1.0);
    assert_eq!(layers[IxDyn(&[0, 1, 1])], 1.0);
}
