//! Unit tests for mask post-processing

use canvas_ai_service::backend::traits::{PredictedMask, RawMask};
use canvas_ai_service::segmentation::{automatic, guided, mask_bbox, MAX_AUTOMATIC_MASKS};
use image::{GrayImage, Luma};

fn raw(bbox: [u32; 4], confidence: f32) -> RawMask {
    RawMask {
        bbox,
        confidence,
        area: 42,
        mask: None,
    }
}

fn rect_mask(width: u32, height: u32, rect: Option<[u32; 4]>) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| match rect {
        Some([x0, y0, x1, y1]) if x >= x0 && x <= x1 && y >= y0 && y <= y1 => Luma([255]),
        _ => Luma([0]),
    })
}

#[test]
fn test_automatic_caps_at_ten() {
    let candidates = (0..25).map(|_| raw([0, 0, 5, 5], 0.9)).collect();
    let masks = automatic(candidates, 0.0, 100, 100);
    assert_eq!(masks.len(), MAX_AUTOMATIC_MASKS);
    assert_eq!(masks[0].label, "Object 1");
    assert_eq!(masks[9].label, "Object 10");
}

#[test]
fn test_automatic_threshold_is_inclusive() {
    let candidates = vec![
        raw([0, 0, 5, 5], 0.5),
        raw([0, 0, 5, 5], 0.49),
        raw([0, 0, 5, 5], 0.8),
    ];
    let masks = automatic(candidates, 0.5, 100, 100);

    assert_eq!(masks.len(), 2);
    assert!(masks.iter().all(|m| m.confidence >= 0.5));
    // Labels keep the rank the model gave them
    assert_eq!(masks[0].label, "Object 1");
    assert_eq!(masks[1].label, "Object 3");
}

#[test]
fn test_automatic_only_considers_first_ten() {
    let mut candidates: Vec<_> = (0..10).map(|_| raw([0, 0, 1, 1], 0.1)).collect();
    candidates.push(raw([0, 0, 1, 1], 0.99));

    assert!(automatic(candidates, 0.5, 10, 10).is_empty());
}

#[test]
fn test_automatic_boxes_stay_inside_image() {
    let candidates = vec![
        raw([90, 95, 40, 40], 0.9),
        raw([150, 0, 10, 10], 0.9),
        raw([0, 0, 100, 80], 0.9),
    ];
    for mask in automatic(candidates, 0.0, 100, 80) {
        let b = mask.bbox;
        assert!(b.x + b.width <= 100, "{:?}", b);
        assert!(b.y + b.height <= 80, "{:?}", b);
    }
}

#[test]
fn test_guided_box_from_mask() {
    let predictions = vec![PredictedMask {
        mask: rect_mask(100, 100, Some([10, 20, 30, 60])),
        score: 0.95,
    }];
    let masks = guided(predictions, 0.5);

    assert_eq!(masks.len(), 1);
    let b = masks[0].bbox;
    assert_eq!((b.x, b.y, b.width, b.height), (10, 20, 20, 40));
    assert_eq!(masks[0].area, 21 * 41);
    assert_eq!(masks[0].label, "Mask 1");
}

#[test]
fn test_guided_skips_empty_and_low_scoring_masks() {
    let predictions = vec![
        PredictedMask {
            mask: rect_mask(50, 50, None),
            score: 0.99,
        },
        PredictedMask {
            mask: rect_mask(50, 50, Some([0, 0, 4, 4])),
            score: 0.3,
        },
        PredictedMask {
            mask: rect_mask(50, 50, Some([5, 5, 49, 49])),
            score: 0.9,
        },
    ];
    let masks = guided(predictions, 0.9);

    assert_eq!(masks.len(), 1);
    assert_eq!(masks[0].label, "Mask 3");
    let b = masks[0].bbox;
    assert!(b.x + b.width <= 50 && b.y + b.height <= 50);
}

#[test]
fn test_mask_bbox_of_empty_mask_is_none() {
    assert!(mask_bbox(&GrayImage::new(16, 16)).is_none());
}

#[test]
fn test_single_pixel_mask() {
    let mut mask = GrayImage::new(16, 16);
    mask.put_pixel(15, 15, Luma([1]));
    let b = mask_bbox(&mask).unwrap();
    assert_eq!((b.x, b.y, b.width, b.height), (15, 15, 0, 0));
}
