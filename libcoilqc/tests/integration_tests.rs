use coilqc::segmentation::{ScriptedConfirmer, FOREGROUND_SEED};
use coilqc::*;
use ndarray::Array2;

const DATE: &str = "20240312";
const SERIES: &str = "101530";

/// 64x64 image with a bright 40x40 square at rows/cols 12..52
///
/// `seed` shifts the texture so repeats differ pixel by pixel.
fn square_image(level: f64, seed: usize) -> Image {
    Image::new(Array2::from_shape_fn((64, 64), |(r, c)| {
        let inside = (12..52).contains(&r) && (12..52).contains(&c);
        if inside {
            level + ((r * 7 + c * 3 + seed) % 5) as f64
        } else {
            10.0 + 2.0 * ((r + c + seed) % 3) as f64
        }
    }))
    .unwrap()
}

fn combined(repeat: u8, slice: u32) -> AcquisitionUnit {
    AcquisitionUnit::new(
        AcquisitionKey::combined(DATE, SERIES, repeat, slice),
        square_image(1000.0, usize::from(repeat)),
    )
    .with_bandwidth(130.0)
}

fn element(repeat: u8, slice: u32, element: u32) -> AcquisitionUnit {
    AcquisitionUnit::new(
        AcquisitionKey::element(DATE, SERIES, repeat, slice, element),
        square_image(400.0 + 100.0 * f64::from(element), usize::from(repeat) + 2),
    )
}

fn two_element_set(repeats: u8) -> AcquisitionSet {
    let mut set = AcquisitionSet::new();
    for repeat in 0..repeats {
        set.insert(combined(repeat, 0)).unwrap();
        for e in 1..=2 {
            set.insert(element(repeat, 0, e)).unwrap();
        }
    }
    set
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn session(element_count: u32) -> AnalysisSession {
    init_logging();
    AnalysisSession::new(
        CoilConfig::new(element_count, 0.1, 0.3),
        AnalysisConfig::default(),
    )
    .unwrap()
}

#[test]
fn test_square_phantom_masks() {
    let mut set = AcquisitionSet::new();
    set.insert(combined(0, 0)).unwrap();
    set.insert(combined(1, 0)).unwrap();

    let masks = session(1).segment(&set, &mut AutoAccept).unwrap();
    let slice = &masks[&0];

    assert_eq!(slice.accepted.count(), 40 * 40);
    assert_eq!(slice.phantom.count(), 32 * 32);
    assert_eq!(slice.air.count(), 416);
    assert!(slice.phantom.is_subset_of(&slice.accepted));
    assert!(slice.air.is_disjoint_from(&slice.accepted));
    assert!(slice.phantom.is_disjoint_from(&slice.air));
}

#[test]
fn test_full_session_with_elements() {
    let set = two_element_set(2);
    let outcome = session(2).run(&set, &mut AutoAccept).unwrap();

    assert_eq!(outcome.report.results.len(), 6);
    assert_eq!(outcome.report.missing_repeats().count(), 0);
    for result in &outcome.report.results {
        let nema = result.snr.nema.unwrap();
        assert!(nema > 0.0);
        assert!(result.snr.noise_std > 0.0);
        assert!(result.snr.noise_av > 0.0);
        match result.key.category {
            ImageCategory::Combined => {
                let uniformity = result.uniformity.unwrap();
                assert!(uniformity > 0.9 && uniformity <= 1.0);
            }
            ImageCategory::DelRec => assert!(result.uniformity.is_none()),
        }
        assert_eq!(result.group.members, 2);
    }

    // NEMA is shared by both repeats of a pair
    let first = outcome
        .report
        .get(&AcquisitionKey::combined(DATE, SERIES, 0, 0))
        .unwrap();
    let second = outcome
        .report
        .get(&AcquisitionKey::combined(DATE, SERIES, 1, 0))
        .unwrap();
    assert_eq!(first.snr.nema, second.snr.nema);
    assert_eq!(first.group, second.group);

    // 3 methods x (combined + one element slice)
    assert_eq!(outcome.tables.len(), 6);
}

#[test]
fn test_single_repeat_has_no_nema() {
    let set = two_element_set(1);
    let outcome = session(2).run(&set, &mut AutoAccept).unwrap();

    assert_eq!(outcome.report.missing_repeats().count(), 3);
    for result in &outcome.report.results {
        assert_eq!(result.snr.nema, None);
        assert_eq!(result.snr.nema_status, NemaStatus::MissingRepeat);
        assert_eq!(result.group.nema, None);
        assert_eq!(result.group.noise_av, Some(result.snr.noise_av));
        assert_eq!(result.group.noise_std, Some(result.snr.noise_std));
        assert_eq!(result.group.uniformity, result.uniformity);
    }
}

#[test]
fn test_element_count_mismatch_is_configuration_error() {
    let set = two_element_set(2);
    let err = session(4).run(&set, &mut AutoAccept).unwrap_err();
    assert!(matches!(
        err,
        QcError::CountMismatch {
            expected: 4,
            found: 2,
            ..
        }
    ));
    assert!(err.is_fatal());
}

#[test]
fn test_retry_thresholds_carry_over() {
    let mut set = AcquisitionSet::new();
    for slice in 0..2 {
        set.insert(combined(0, slice)).unwrap();
    }
    let revised = ThresholdPair::new(0.05, 0.5);
    let mut confirmer = ScriptedConfirmer::new([
        Decision::Retry(revised),
        Decision::Accept,
        Decision::Accept,
    ]);

    init_logging();
    let session = AnalysisSession::new(
        CoilConfig::new(1, 0.1, 0.3).with_slice_count(2),
        AnalysisConfig::default(),
    )
    .unwrap();
    let masks = session.segment(&set, &mut confirmer).unwrap();

    assert_eq!(
        confirmer.seen(),
        [ThresholdPair::new(0.1, 0.3), revised, revised]
    );
    assert_eq!(masks[&0].thresholds, revised);
    assert_eq!(masks[&1].thresholds, revised);
}

#[test]
fn test_blank_image_is_degenerate() {
    let mut set = AcquisitionSet::new();
    set.insert(AcquisitionUnit::new(
        AcquisitionKey::combined(DATE, SERIES, 0, 3),
        Image::new(Array2::from_elem((16, 16), 5.0)).unwrap(),
    ))
    .unwrap();

    let err = session(1).run(&set, &mut AutoAccept).unwrap_err();
    assert!(matches!(
        err,
        QcError::SegmentationDegenerate { slice: 3, .. }
    ));
}

#[test]
fn test_element_images_without_reference() {
    let mut set = AcquisitionSet::new();
    set.insert(element(0, 0, 1)).unwrap();
    let err = session(1).run(&set, &mut AutoAccept).unwrap_err();
    assert!(matches!(err, QcError::MissingReference { slice: 0 }));
}

#[test]
fn test_foreground_seed_label() {
    assert_eq!(FOREGROUND_SEED, 2);
    assert!(!VERSION.is_empty());
}

#[test]
fn test_bundled_coil_registry() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../config/coils.toml");
    let registry = CoilRegistry::load(path).unwrap();
    assert_eq!(registry.scanner("47009").unwrap().name, "PHT_Ambition_X");

    let spine = registry.coil("47009", "Spine").unwrap();
    assert_eq!(spine.element_count, 12);
    assert_eq!(spine.thresholds(), ThresholdPair::new(0.1, 0.2));
    assert!(AnalysisSession::new(spine, AnalysisConfig::default()).is_ok());
}
