//! Unit tests for the image codec

use canvas_ai_service::codec::{base64, decode_image, encode_image, encode_mask, ImageStore};
use canvas_ai_service::AppError;
use image::{GrayImage, Luma, Rgb, RgbImage};
use tempfile::TempDir;

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
    })
}

#[test]
fn test_round_trip_is_lossless() {
    for (width, height) in [(1, 1), (17, 5), (64, 64)] {
        let image = gradient(width, height);
        let encoded = encode_image(&image).unwrap();
        let decoded = decode_image(&encoded).unwrap();
        assert_eq!(decoded, image);
    }
}

#[test]
fn test_decode_accepts_bare_base64() {
    let image = gradient(4, 3);
    let encoded = encode_image(&image).unwrap();
    let bare = base64::strip_header(&encoded);

    assert_eq!(decode_image(bare).unwrap(), image);
}

#[test]
fn test_decode_rejects_garbage() {
    let result = decode_image("data:image/png;base64,not*base64");
    assert!(matches!(result, Err(AppError::Decode(_))));

    let not_an_image = base64::encode(b"plain text, not pixels");
    assert!(matches!(decode_image(&not_an_image), Err(AppError::Decode(_))));
}

#[test]
fn test_mask_encodes_as_png() {
    let mut mask = GrayImage::new(8, 8);
    mask.put_pixel(3, 4, Luma([255]));
    let encoded = encode_mask(&mask).unwrap();

    assert!(encoded.starts_with("data:image/png;base64,"));
    let decoded = image::load_from_memory(&base64::decode(&encoded).unwrap())
        .unwrap()
        .to_luma8();
    assert_eq!(decoded, mask);
}

#[tokio::test]
async fn test_store_writes_png_and_returns_url() {
    let dir = TempDir::new().unwrap();
    let store = ImageStore::new(dir.path().join("images"), "http://localhost:5000/images");

    let url = store.save_png(b"\x89PNG fake").await.unwrap();
    assert!(url.starts_with("http://localhost:5000/images/"));
    assert!(url.ends_with(".png"));

    let filename = url.rsplit('/').next().unwrap();
    let written = std::fs::read(store.storage_path().join(filename)).unwrap();
    assert_eq!(written, b"\x89PNG fake");
}
