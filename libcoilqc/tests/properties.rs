use coilqc::segmentation::SliceMasks;
use coilqc::snr::{nema_snr, single_image_snr};
use coilqc::uniformity::integral_uniformity;
use coilqc::*;
use ndarray::Array2;
use proptest::prelude::*;

fn mask_strategy() -> impl Strategy<Value = Mask> {
    (3usize..20, 3usize..20).prop_flat_map(|(rows, cols)| {
        proptest::collection::vec(any::<bool>(), rows * cols).prop_map(move |bits| {
            Mask::new(Array2::from_shape_vec((rows, cols), bits).unwrap())
        })
    })
}

fn image_strategy(rows: usize, cols: usize) -> impl Strategy<Value = Image> {
    proptest::collection::vec(1.0f64..4096.0, rows * cols)
        .prop_map(move |samples| Image::from_vec(rows, cols, samples).unwrap())
}

proptest! {
    #[test]
    fn contract_by_zero_is_identity(mask in mask_strategy()) {
        prop_assert_eq!(mask.contract(0), mask);
    }

    #[test]
    fn contraction_only_shrinks(mask in mask_strategy(), iterations in 1usize..4) {
        let contracted = mask.contract(iterations);
        prop_assert!(contracted.is_subset_of(&mask));
        prop_assert!(contracted.count() <= mask.count());
    }

    #[test]
    fn derived_masks_are_disjoint(mask in mask_strategy(), p in 0usize..4, a in 0usize..4) {
        let masks = SliceMasks::from_accepted(mask, ThresholdPair::default(), p, a);
        prop_assert!(masks.phantom.is_subset_of(&masks.accepted));
        prop_assert!(masks.air.is_disjoint_from(&masks.accepted));
        prop_assert!(masks.phantom.is_disjoint_from(&masks.air));
    }

    #[test]
    fn uniformity_never_exceeds_one(image in image_strategy(12, 12)) {
        let roi = Mask::new(Array2::from_shape_fn((12, 12), |(r, c)| {
            (3..9).contains(&r) && (3..9).contains(&c)
        }));
        let uniformity = integral_uniformity(&image, &roi).unwrap();
        prop_assert!(uniformity <= 1.0);
        prop_assert!(uniformity >= 0.0);
    }

    #[test]
    fn nema_is_symmetric_for_equal_signal(
        samples in proptest::collection::vec(1.0f64..1000.0, 32),
    ) {
        // Reversing the samples keeps the phantom mean while changing every pixel pairing
        let mut reversed = samples.clone();
        reversed.reverse();
        prop_assume!(samples != reversed);
        let first = Image::from_vec(4, 8, samples).unwrap();
        let second = Image::from_vec(4, 8, reversed).unwrap();
        let phantom = Mask::filled((4, 8), true);
        let forward = nema_snr(&first, &second, &phantom, 1.0).unwrap();
        let backward = nema_snr(&second, &first, &phantom, 1.0).unwrap();
        prop_assert!((forward - backward).abs() <= 0.011);
    }

    #[test]
    fn doubling_scale_doubles_noise_snr(
        image in image_strategy(8, 8),
        sd in 0.5f64..1.0,
        mean in 1.0f64..12.0,
    ) {
        let phantom = Mask::new(Array2::from_shape_fn((8, 8), |(r, _)| r < 4));
        let air = phantom.invert();
        let single = |scale| single_image_snr(&image, &phantom, &air, scale, 1.0);
        if let (Ok(base), Ok(doubled)) = (
            single(ScaleFactor::new(sd, mean)),
            single(ScaleFactor::new(2.0 * sd, 2.0 * mean)),
        ) {
            prop_assert!((doubled.noise_av - 2.0 * base.noise_av).abs() <= 0.021);
            prop_assert!((doubled.noise_std - 2.0 * base.noise_std).abs() <= 0.021);
        }
    }
}
