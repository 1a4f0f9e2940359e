//! Codec module - transport encoding of images and storage of generated output

pub mod base64;
pub mod image;
pub mod store;

pub use self::image::{decode_image, encode_image, encode_mask};
pub use store::ImageStore;
