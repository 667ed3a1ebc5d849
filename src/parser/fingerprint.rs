//! XObject fingerprints: exact digests and perceptual image hashes.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Object, Stream};
use md5::{Digest, Md5};

use super::backend::stream_bytes;

/// Images larger than this many pixels are not decoded for hashing.
const MAX_HASH_PIXELS: u64 = 25_000_000;

/// MD5 of raw bytes.
pub fn digest(bytes: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Perceptual hash of an image XObject, when its samples can be decoded.
///
/// JPEG (`DCTDecode`) images are decoded with the `image` crate; 8-bit
/// `DeviceGray`/`DeviceRGB` sample data is read directly after the stream
/// filters are undone. Anything else yields `None` and is compared by
/// digest only.
pub fn image_hash(stream: &Stream) -> Option<u64> {
    decode_image(stream).map(|img| difference_hash(&img))
}

fn decode_image(stream: &Stream) -> Option<DynamicImage> {
    let dict = &stream.dict;
    let width = dict.get(b"Width").ok()?.as_i64().ok()?;
    let height = dict.get(b"Height").ok()?.as_i64().ok()?;
    if width <= 0 || height <= 0 || (width as u64) * (height as u64) > MAX_HASH_PIXELS {
        return None;
    }
    let (width, height) = (width as u32, height as u32);

    let filters = filter_names(stream);
    if filters.last().map(Vec::as_slice) == Some(b"DCTDecode".as_slice()) {
        if filters.len() != 1 {
            return None;
        }
        return image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg).ok();
    }

    if dict.get(b"BitsPerComponent").ok()?.as_i64().ok()? != 8 {
        return None;
    }
    let samples = stream_bytes(stream).ok()?;
    let pixels = width as usize * height as usize;

    match dict.get(b"ColorSpace").ok()?.as_name().ok()? {
        b"DeviceGray" => {
            let data = samples.get(..pixels)?.to_vec();
            GrayImage::from_raw(width, height, data).map(DynamicImage::ImageLuma8)
        }
        b"DeviceRGB" => {
            let data = samples.get(..pixels * 3)?.to_vec();
            RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8)
        }
        _ => None,
    }
}

fn filter_names(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|o| o.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

/// 64-bit difference hash: compare horizontally adjacent pixels of a 9×8
/// grayscale thumbnail.
pub fn difference_hash(image: &DynamicImage) -> u64 {
    let small = image.resize_exact(9, 8, FilterType::Triangle).to_luma8();
    let mut hash = 0u64;
    for y in 0..8 {
        for x in 0..8 {
            let left = small.get_pixel(x, y)[0];
            let right = small.get_pixel(x + 1, y)[0];
            hash = (hash << 1) | u64::from(left > right);
        }
    }
    hash
}

/// Number of differing bits.
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Dictionary};

    fn gradient(width: u32, height: u32, invert: bool) -> Vec<u8> {
        let mut data = Vec::new();
        for _y in 0..height {
            for x in 0..width {
                let v = (x * 255 / width.max(1)) as u8;
                data.push(if invert { 255 - v } else { v });
            }
        }
        data
    }

    fn gray_stream(width: i64, height: i64, data: Vec<u8>) -> Stream {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "BitsPerComponent" => 8i64,
                "ColorSpace" => "DeviceGray",
            },
            data,
        )
    }

    #[test]
    fn test_digest_is_stable() {
        assert_eq!(digest(b"abc"), digest(b"abc"));
        assert_ne!(digest(b"abc"), digest(b"abd"));
    }

    #[test]
    fn test_near_identical_images_hash_close() {
        let a = gray_stream(64, 32, gradient(64, 32, false));
        let mut noisy = gradient(64, 32, false);
        noisy[5] = noisy[5].saturating_add(3);
        let b = gray_stream(64, 32, noisy);
        let c = gray_stream(64, 32, gradient(64, 32, true));

        let ha = image_hash(&a).unwrap();
        let hb = image_hash(&b).unwrap();
        let hc = image_hash(&c).unwrap();
        assert!(hamming_distance(ha, hb) <= 2);
        assert!(hamming_distance(ha, hc) > 32);
    }

    #[test]
    fn test_undecodable_image_has_no_hash() {
        let stream = Stream::new(Dictionary::new(), vec![1, 2, 3]);
        assert_eq!(image_hash(&stream), None);

        let short = gray_stream(64, 32, vec![0; 10]);
        assert_eq!(image_hash(&short), None);
    }

    #[test]
    fn test_hamming_distance() {
        assert_eq!(hamming_distance(0, 0), 0);
        assert_eq!(hamming_distance(0b1011, 0b0001), 2);
        assert_eq!(hamming_distance(u64::MAX, 0), 64);
    }
}
