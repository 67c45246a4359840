//! Overlay drawing for annotated output images and the tuning console.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_ellipse_mut};

use crate::oval::OvalResult;
use crate::types::Point;

pub const OVAL_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const LANDMARK_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const LABEL_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub const LANDMARK_RADIUS: i32 = 3;

/// Draw the ellipse inscribed in the oval box, 2px thick. Does nothing for a
/// failed oval.
pub fn draw_oval(img: &mut RgbImage, oval: &OvalResult, color: Rgb<u8>) {
    if !oval.success {
        return;
    }
    let c = oval.rect.center();
    let center = (c.x as i32, c.y as i32);
    let rx = oval.rect.width / 2;
    let ry = oval.rect.height / 2;
    draw_hollow_ellipse_mut(img, center, rx, ry, color);
    if rx > 1 && ry > 1 {
        draw_hollow_ellipse_mut(img, center, rx - 1, ry - 1, color);
    }
}

/// Draw a filled marker at every point.
pub fn draw_landmarks(img: &mut RgbImage, points: &[Point], color: Rgb<u8>) {
    for p in points {
        draw_filled_circle_mut(img, (p.x as i32, p.y as i32), LANDMARK_RADIUS, color);
    }
}

/// Draw index labels next to points, `labels[i]` belonging to `points[i]`.
pub fn draw_labels(img: &mut RgbImage, points: &[Point], labels: &[usize], color: Rgb<u8>) {
    for (p, label) in points.iter().zip(labels) {
        draw_number(img, p.x as i32 + 2, p.y as i32 - 2, *label, color);
    }
}

/// Expand a grayscale raster to RGB for display or saving.
pub fn gray_to_rgb(gray: &image::GrayImage) -> RgbImage {
    image::DynamicImage::ImageLuma8(gray.clone()).to_rgb8()
}

/// 3x5 bitmap digits.
const DIGITS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b010, 0b010, 0b010],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

fn draw_number(img: &mut RgbImage, x: i32, y: i32, value: usize, color: Rgb<u8>) {
    let mut cursor = x;
    for ch in value.to_string().bytes() {
        let bitmap = DIGITS[(ch - b'0') as usize];
        for (row, bits) in bitmap.iter().enumerate() {
            for col in 0..3 {
                if (bits >> (2 - col)) & 1 == 1 {
                    put_clipped(img, cursor + col, y + row as i32, color);
                }
            }
        }
        cursor += 4;
    }
}

fn put_clipped(img: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}
