use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbaImage};

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Png)
}

pub fn gif_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Gif)
}

fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(RgbaImage::new(width, height))
        .write_to(&mut Cursor::new(&mut buf), format)
        .expect("encode test image");
    buf
}
