// End-to-end checks of the engine's published guarantees through the public API.

use proptest::prelude::*;

use rasterfe::canvas::PixelBuffer;
use rasterfe::ops::compositing::{self, BooleanOp};
use rasterfe::ops::edges::{self, CannyParams};
use rasterfe::ops::filters::{self, Kernel};
use rasterfe::ops::histogram::Histogram;
use rasterfe::ops::{stego, transform};
use rasterfe::{EngineError, OperationFamily, Workspace};

fn noise(w: u32, h: u32, seed: u32) -> PixelBuffer {
    let mut state = seed.wrapping_mul(2654435761).wrapping_add(1);
    let mut data = Vec::with_capacity((w * h * 4) as usize);
    for _ in 0..w * h * 4 {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        data.push((state >> 24) as u8);
    }
    PixelBuffer::from_raw(w, h, data).unwrap()
}

// ---------------------------------------------------------------------------
//  Snapshot families
// ---------------------------------------------------------------------------

#[test]
fn reapplying_a_family_equals_restore_then_apply() {
    let original = noise(17, 11, 3);

    let mut tweaked = Workspace::new();
    tweaked.load(original.clone());
    tweaked.apply_rotation(33.0).unwrap();
    tweaked.apply_rotation(71.0).unwrap();

    let mut direct = Workspace::new();
    direct.load(original.clone());
    direct.apply_rotation(33.0).unwrap();
    direct.restore(OperationFamily::Rotation).unwrap();
    assert_eq!(direct.base(), Some(&original));
    direct.apply_rotation(71.0).unwrap();

    assert_eq!(tweaked.base(), direct.base());
}

#[test]
fn boolean_toggling_never_compounds() {
    let original = noise(8, 8, 9);
    let overlay = noise(8, 8, 10);
    let mut ws = Workspace::new();
    ws.load(original.clone());
    for op in [BooleanOp::And, BooleanOp::Or, BooleanOp::Xor, BooleanOp::And] {
        ws.apply_boolean(Some(&overlay), op, (0, 0)).unwrap();
    }
    let expected = compositing::boolean(&original, Some(&overlay), BooleanOp::And, (0, 0)).unwrap();
    assert_eq!(ws.base(), Some(&expected));
    ws.restore(OperationFamily::Boolean).unwrap();
    assert_eq!(ws.base(), Some(&original));
}

#[test]
fn restoring_twice_reports_missing_snapshot() {
    let mut ws = Workspace::new();
    ws.load(noise(4, 4, 1));
    ws.apply_distortion(10.0, 5).unwrap();
    ws.restore(OperationFamily::Distortion).unwrap();
    assert!(matches!(
        ws.restore(OperationFamily::Distortion),
        Err(EngineError::NoSnapshot(OperationFamily::Distortion))
    ));
}

#[test]
fn loading_a_new_image_drops_snapshots() {
    let mut ws = Workspace::new();
    ws.load(noise(4, 4, 1));
    ws.apply_rotation(90.0).unwrap();
    ws.load(noise(5, 5, 2));
    assert!(!ws.has_snapshot(OperationFamily::Rotation));
}

// ---------------------------------------------------------------------------
//  Algorithms
// ---------------------------------------------------------------------------

#[test]
fn identity_kernel_is_a_no_op() {
    let img = noise(9, 7, 4);
    for size in [1, 3, 5, 7] {
        assert_eq!(filters::convolve(&img, &Kernel::identity(size).unwrap()), img);
    }
}

#[test]
fn four_right_angle_turns_restore_the_image() {
    let img = noise(13, 6, 5);
    let mut cur = img.clone();
    for _ in 0..4 {
        cur = transform::rotate(&cur, 90.0).unwrap();
    }
    assert_eq!(cur, img);
}

#[test]
fn white_and_black_gives_opaque_black() {
    let white = PixelBuffer::new_filled(2, 2, [255, 255, 255, 255]);
    let black = PixelBuffer::new_filled(2, 2, [0, 0, 0, 0]);
    let out = compositing::boolean(&white, Some(&black), BooleanOp::And, (0, 0)).unwrap();
    for y in 0..2 {
        for x in 0..2 {
            assert_eq!(out.pixel(x, y), [0, 0, 0, 255]);
        }
    }
}

#[test]
fn gaussian_kernel_is_normalized_by_its_sum() {
    for (size, sigma) in [(3, 0.8), (5, 1.4), (9, 3.0)] {
        let kernel = Kernel::gaussian(size, sigma).unwrap();
        assert!((kernel.sum() * kernel.multiplier() - 1.0).abs() < 1e-5);
    }
    let flat = PixelBuffer::new_filled(12, 10, [37, 142, 201, 99]);
    assert_eq!(filters::gaussian_blur(&flat, 7, 2.0).unwrap(), flat);
}

#[test]
fn canny_on_a_flat_image_finds_nothing() {
    let flat = PixelBuffer::new_filled(16, 16, [90, 90, 90, 255]);
    let edges = edges::canny(&flat, &CannyParams::default()).unwrap();
    assert!(edges.data().chunks_exact(4).all(|px| px[..3] == [0, 0, 0]));
}

#[test]
fn even_kernel_sizes_are_rejected_without_side_effects() {
    let mut ws = Workspace::new();
    let img = noise(6, 6, 8);
    ws.load(img.clone());
    let generation = ws.generation();
    let err = ws.apply(|b| filters::box_blur(b, 4)).unwrap_err();
    assert!(matches!(err, EngineError::InvalidParameter { .. }));
    assert_eq!(ws.generation(), generation);
    assert_eq!(ws.base(), Some(&img));
}

#[test]
fn stego_rejects_messages_over_capacity() {
    let img = noise(6, 6, 2); // (108 - 32) / 8 = 9 bytes
    assert_eq!(stego::capacity(6, 6), 9);
    assert!(stego::embed(&img, "123456789").is_ok());
    assert!(matches!(
        stego::embed(&img, "1234567890"),
        Err(EngineError::CapacityExceeded { needed: 10, capacity: 9 })
    ));
}

proptest! {
    #[test]
    fn histogram_channels_sum_to_pixel_count(w in 1u32..24, h in 1u32..24, seed in any::<u32>()) {
        let img = noise(w, h, seed);
        let hist = Histogram::build(&img);
        let n = (w * h) as u64;
        for bins in [&hist.red, &hist.green, &hist.blue, &hist.gray] {
            prop_assert_eq!(bins.iter().map(|&c| c as u64).sum::<u64>(), n);
        }
    }

    #[test]
    fn stego_round_trips_any_text(msg in "\\PC{1,60}", seed in any::<u32>()) {
        let img = noise(32, 32, seed);
        prop_assume!(msg.len() <= stego::capacity(32, 32));
        let carrier = stego::embed(&img, &msg).unwrap();
        prop_assert_eq!(stego::extract(&carrier).unwrap(), msg);
    }

    #[test]
    fn arbitrary_rotation_bounds_contain_the_source(w in 1u32..40, h in 1u32..40, deg in 0.0f64..360.0) {
        let (bw, bh) = transform::rotated_bounds(w, h, deg);
        let r = deg.to_radians();
        let need_w = w as f64 * r.cos().abs() + h as f64 * r.sin().abs();
        let need_h = w as f64 * r.sin().abs() + h as f64 * r.cos().abs();
        prop_assert!(bw as f64 + 1e-3 >= need_w);
        prop_assert!(bh as f64 + 1e-3 >= need_h);
    }
}
