mod common;

use cardlens::{CardDetector, DetectionConfig, ScanError, ScanPipeline};
use common::*;

fn bbox_ratio(quad: &cardlens::Quadrilateral) -> f64 {
    let corners = quad.corners();
    let xs = corners.iter().map(|p| p.x);
    let ys = corners.iter().map(|p| p.y);
    let w = (xs.clone().max().unwrap() - xs.min().unwrap() + 1) as f64;
    let h = (ys.clone().max().unwrap() - ys.min().unwrap() + 1) as f64;
    w.max(h) / w.min(h)
}

#[test]
fn three_separated_cards_are_found() {
    let img = three_card_photo();
    let quads = CardDetector::default().detect_quadrilaterals(&img);

    assert_eq!(quads.len(), 3);
    for quad in &quads {
        let ratio = bbox_ratio(quad);
        assert!((1.10..=2.20).contains(&ratio), "ratio {ratio} out of range");
        assert!(quad.area() > 5000.0);
    }
}

#[test]
fn cards_on_a_coloured_table_are_found() {
    for body in [CARD_BODY, WHITE_CARD] {
        let img = photo_on(400, 300, WOOD, body, &[CardSpec::titled(140, 60)]);
        let quads = CardDetector::default().detect_quadrilaterals(&img);
        assert_eq!(quads.len(), 1, "card {body:?} on wood");
        assert!((1.10..=2.20).contains(&bbox_ratio(&quads[0])));
    }
}

#[test]
fn corners_hug_the_card_outline() {
    let img = synthetic_photo(300, 260, &[CardSpec::titled(60, 40)]);
    let quads = CardDetector::default().detect_quadrilaterals(&img);
    assert_eq!(quads.len(), 1);

    let q = &quads[0];
    let near = |p: imageproc::point::Point<i32>, x: i32, y: i32| {
        (p.x - x).abs() <= 2 && (p.y - y).abs() <= 2
    };
    let (right, bottom) = (60 + CARD_W as i32 - 1, 40 + CARD_H as i32 - 1);
    assert!(near(q.top_left(), 60, 40), "{:?}", q.top_left());
    assert!(near(q.top_right(), right, 40), "{:?}", q.top_right());
    assert!(near(q.bottom_right(), right, bottom), "{:?}", q.bottom_right());
    assert!(near(q.bottom_left(), 60, bottom), "{:?}", q.bottom_left());
}

#[test]
fn extracted_cards_are_upright_and_full_size() {
    let pipeline = ScanPipeline::new(&DetectionConfig::default()).unwrap();
    let cards = pipeline.extract_cards(&three_card_photo()).unwrap();

    assert_eq!(cards.len(), 3);
    for (i, card) in cards.iter().enumerate() {
        assert_eq!(card.index, i);
        assert_eq!(card.image.dimensions(), (240, 336));
        // centre of the card body
        let px = card.image.get_pixel(120, 200);
        assert!(px.0.iter().all(|c| c.abs_diff(CARD_BODY[0]) <= 1), "{px:?}");
    }
}

#[test]
fn titled_nameplate_is_all_ink() {
    let pipeline = ScanPipeline::new(&DetectionConfig::default()).unwrap();
    let cards = pipeline.extract_cards(&three_card_photo()).unwrap();
    let plate = pipeline.nameplate_extractor().extract(&cards[0]).unwrap();

    assert_eq!(plate.image.dimensions(), (216, 20));
    assert!(plate.image.pixels().all(|p| p[0] == 255));
}

#[test]
fn detection_is_deterministic() {
    let bytes = png_bytes(&three_card_photo());
    let pipeline = ScanPipeline::new(&DetectionConfig::default()).unwrap();

    let first = pipeline.extract_cards(&ScanPipeline::decode(&bytes).unwrap()).unwrap();
    let second = pipeline.extract_cards(&ScanPipeline::decode(&bytes).unwrap()).unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.index, b.index);
        assert_eq!(a.image.as_raw(), b.image.as_raw());
    }
}

#[test]
fn undecodable_upload_and_empty_table_are_distinct() {
    let pipeline = ScanPipeline::new(&DetectionConfig::default()).unwrap();

    let err = ScanPipeline::decode(b"\x89PNG but not really").unwrap_err();
    assert!(matches!(err, ScanError::Decode(_)));

    let empty = synthetic_photo(300, 300, &[]);
    let decoded = ScanPipeline::decode(&png_bytes(&empty)).unwrap();
    assert!(matches!(
        pipeline.extract_cards(&decoded),
        Err(ScanError::NoCardsDetected)
    ));
}

#[test]
fn small_cards_fall_below_the_area_floor() {
    let config = DetectionConfig::default().with_min_contour_area(40_000.0);
    let pipeline = ScanPipeline::new(&config).unwrap();
    assert!(matches!(
        pipeline.extract_cards(&three_card_photo()),
        Err(ScanError::NoCardsDetected)
    ));
}
