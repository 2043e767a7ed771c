#![allow(dead_code)]

use std::io::Cursor;
use std::time::Duration;

use cardlens::{
    CardLookup, CardRecord, LookupError, RecognitionError, RecognitionRequest, Recognizer,
};
use image::{ImageFormat, Rgb, RgbImage};

pub const BACKGROUND: Rgb<u8> = Rgb([30, 30, 30]);
pub const CARD_BODY: Rgb<u8> = Rgb([150, 150, 150]);
pub const TITLE_BAND: Rgb<u8> = Rgb([40, 40, 40]);

pub const CARD_W: u32 = 120;
pub const CARD_H: u32 = 168;

/// One card drawn into a synthetic photograph.
#[derive(Debug, Clone, Copy)]
pub struct CardSpec {
    pub x: u32,
    pub y: u32,
    /// Draw a dark title band across the top, where the nameplate is read.
    pub titled: bool,
}

impl CardSpec {
    pub fn titled(x: u32, y: u32) -> Self {
        Self { x, y, titled: true }
    }

    pub fn blank(x: u32, y: u32) -> Self {
        Self { x, y, titled: false }
    }
}

pub const WOOD: Rgb<u8> = Rgb([140, 100, 60]);
pub const WHITE_CARD: Rgb<u8> = Rgb([230, 230, 230]);

/// Draws neutral grey cards on a dark table.
pub fn synthetic_photo(width: u32, height: u32, cards: &[CardSpec]) -> RgbImage {
    photo_on(width, height, BACKGROUND, CARD_BODY, cards)
}

/// Draws cards of `body` colour on a table of `table` colour.
pub fn photo_on(
    width: u32,
    height: u32,
    table: Rgb<u8>,
    body: Rgb<u8>,
    cards: &[CardSpec],
) -> RgbImage {
    let mut img = RgbImage::from_pixel(width, height, table);
    for card in cards {
        fill(&mut img, card.x, card.y, CARD_W, CARD_H, body);
        if card.titled {
            fill(&mut img, card.x + 3, card.y + 3, CARD_W - 6, 18, TITLE_BAND);
        }
    }
    img
}

/// Three titled cards in a row with wide gaps between them.
pub fn three_card_photo() -> RgbImage {
    synthetic_photo(
        560,
        260,
        &[
            CardSpec::titled(30, 40),
            CardSpec::titled(210, 40),
            CardSpec::titled(390, 40),
        ],
    )
}

pub fn png_bytes(img: &RgbImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .expect("Failed to encode test image");
    buf.into_inner()
}

fn fill(img: &mut RgbImage, x0: u32, y0: u32, w: u32, h: u32, color: Rgb<u8>) {
    for y in y0..y0 + h {
        for x in x0..x0 + w {
            img.put_pixel(x, y, color);
        }
    }
}

/// Reads `name` off any nameplate that is mostly ink, and nothing otherwise.
pub struct FakeRecognizer {
    pub name: String,
    pub delay: Duration,
}

impl FakeRecognizer {
    pub fn reading(name: &str) -> Self {
        Self {
            name: name.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn slow(name: &str, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            delay,
        }
    }
}

impl Recognizer for FakeRecognizer {
    fn recognize(&self, request: &RecognitionRequest) -> Result<String, RecognitionError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let plate = image::load_from_memory(&request.image_png)
            .map_err(|e| RecognitionError::InvalidImage(e.to_string()))?
            .to_luma8();
        let total = plate.pixels().len().max(1);
        let ink = plate.pixels().filter(|p| p[0] == 255).count();
        if ink * 2 > total {
            Ok(format!("  {}\n", self.name))
        } else {
            Ok(String::new())
        }
    }
}

/// Backend that crashes its calling task.
pub struct PanickingLookup;

impl CardLookup for PanickingLookup {
    async fn lookup_fuzzy(&self, name: &str) -> Result<CardRecord, LookupError> {
        panic!("lookup backend crashed on {name}");
    }
}

/// Backend that never answers in time.
pub struct StalledLookup;

impl CardLookup for StalledLookup {
    async fn lookup_fuzzy(&self, _name: &str) -> Result<CardRecord, LookupError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(LookupError::Unavailable("stalled".into()))
    }
}

pub fn sample_catalog() -> cardlens::CatalogLookup {
    cardlens::CatalogLookup::new(vec![
        CardRecord::named("Sol Ring"),
        CardRecord::named("Lightning Bolt"),
        CardRecord::named("Counterspell"),
    ])
}
