//! Row bitmap encoding for raster transfer
//!
//! Each image row becomes one packet payload: a 6-byte row header followed by the
//! row's pixels packed one bit per dot, MSB first, 1 = dark.
//!
//! ```text
//! legacy: row_hi row_lo 00 00 00 01 | bits...
//! V5:     row_hi row_lo 00 lit_lo lit_hi 01 | bits...
//! ```

use image::GrayImage;

/// Grayscale values below this are printed
pub const DEFAULT_THRESHOLD: u8 = 128;

/// Threshold a row of grayscale pixels and pack it MSB first.
///
/// The last byte is zero-padded when the row width is not a multiple of 8.
pub fn encode_row(pixels: &[u8], threshold: u8) -> Vec<u8> {
    let mut bits = vec![0u8; pixels.len().div_ceil(8)];
    for (i, &pixel) in pixels.iter().enumerate() {
        if pixel < threshold {
            bits[i / 8] |= 0x80 >> (i % 8);
        }
    }
    bits
}

/// Number of dots a row will burn
pub fn lit_pixel_count(pixels: &[u8], threshold: u8) -> u16 {
    pixels.iter().filter(|&&p| p < threshold).count() as u16
}

/// Legacy row payload: fixed header, no pixel counts
pub fn legacy_row(row: u16, pixels: &[u8]) -> Vec<u8> {
    let [row_hi, row_lo] = row.to_be_bytes();
    let mut payload = vec![row_hi, row_lo, 0, 0, 0, 1];
    payload.extend(encode_row(pixels, DEFAULT_THRESHOLD));
    payload
}

/// V5 row payload: header carries the row's lit pixel count
pub fn v5_row(row: u16, pixels: &[u8]) -> Vec<u8> {
    let [row_hi, row_lo] = row.to_be_bytes();
    let [lit_lo, lit_hi] = lit_pixel_count(pixels, DEFAULT_THRESHOLD).to_le_bytes();
    let mut payload = vec![row_hi, row_lo, 0, lit_lo, lit_hi, 1];
    payload.extend(encode_row(pixels, DEFAULT_THRESHOLD));
    payload
}

/// V5 start-print sub-command payload (9 bytes)
pub fn v5_start_print(total_pages: u16) -> [u8; 9] {
    let [pages_hi, pages_lo] = total_pages.to_be_bytes();
    [pages_hi, pages_lo, 0, 0, 0, 0, 0, 0, 0]
}

/// V5 set-dimension sub-command payload (13 bytes)
pub fn v5_set_dimension(rows: u16, cols: u16, copies: u16) -> [u8; 13] {
    let mut payload = [0u8; 13];
    payload[0..2].copy_from_slice(&rows.to_be_bytes());
    payload[2..4].copy_from_slice(&cols.to_be_bytes());
    payload[4..6].copy_from_slice(&copies.to_be_bytes());
    payload
}

/// Pixel rows of `image`, top to bottom
pub fn image_rows(image: &GrayImage) -> impl Iterator<Item = &[u8]> {
    image.as_raw().chunks(image.width().max(1) as usize)
}
