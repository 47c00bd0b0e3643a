// src/keypad.rs
//
// Virtual keypad decoder. Sites that randomize the on-screen order of their
// numeric keypad keep the glyph *rendering* fixed, so each key image can be
// identified by a pixel fingerprint sampled from a small region where the
// digit ink lives. Position is re-derived every login attempt; shape never
// changes.

use crate::error::{Result, ScrapeError};

/// Sub-rectangle of each key image that is sampled. Coordinates are a
/// property of the site's known rendering size, not of the image content.
#[derive(Clone, Copy, Debug)]
pub struct SampleRegion {
    pub x0: u32,
    pub y0: u32,
    pub width: u32,
    pub height: u32,
}

impl SampleRegion {
    pub fn bits(&self) -> usize {
        (self.width * self.height) as usize
    }
}

/// Read-only pixel access. The decoder never touches an image format
/// directly; `decode_key_image` adapts PNG bytes into this.
pub trait PixelGrid {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn rgba(&self, x: u32, y: u32) -> [u8; 4];
}

impl PixelGrid for image::RgbaImage {
    fn width(&self) -> u32 {
        image::RgbaImage::width(self)
    }
    fn height(&self) -> u32 {
        image::RgbaImage::height(self)
    }
    fn rgba(&self, x: u32, y: u32) -> [u8; 4] {
        self.get_pixel(x, y).0
    }
}

/// Decode raw key-image bytes (PNG) into a pixel grid.
pub fn decode_key_image(bytes: &[u8]) -> Result<image::RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

// Reference fingerprints for the stock key rendering (28x28 or larger; the
// sample region needs at least 27x27), sampled over x in 19..27, y in 17..27,
// column by column. 80 bits per glyph.
const DIGIT_FINGERPRINTS: [(char, &str); 10] = [
    ('0', "00111111001111111111111111111111000000111000000001111111111111111111110011111100"),
    ('1', "00000000000011000000011100000001100000001111111111111111111100000000000000000000"),
    ('2', "00100000111110000111111000011111000011111000011101111111100111111100010111000001"),
    ('3', "00100001001110000111111000011111001000011101100001111111011111111111110000011110"),
    ('4', "00000011000000111100000111010001111001001111111111111111111111111111110000000100"),
    ('5', "00000001001111100111111110011110010000011001000001100110011110011111110000111110"),
    ('6', "00011111000111111110111111111111001100011000100001110011001111001111110100011110"),
    ('7', "10000000001000000000100000111110011111111011111100111110000011100000001100000000"),
    ('8', "00000011001111111111111111111110001000011000100001111111111111111111110010011110"),
    ('9', "00111000001111110011111111001110000100011000010011111111111111111111110011111100"),
];

/// Known reference fingerprints, keyed by the canonical character each one
/// renders. Immutable once built.
pub struct GlyphTable {
    entries: Vec<(char, String)>,
}

impl GlyphTable {
    /// The stock 10-digit table matching `SampleRegion { 19, 17, 8, 10 }`
    /// and ink threshold 450.
    pub fn digits() -> Self {
        GlyphTable {
            entries: DIGIT_FINGERPRINTS
                .iter()
                .map(|(ch, fp)| (*ch, s!(*fp)))
                .collect(),
        }
    }

    pub fn new(entries: Vec<(char, String)>) -> Self {
        GlyphTable { entries }
    }

    /// Reference fingerprint for one character, if the table knows it.
    pub fn fingerprint_of(&self, ch: char) -> Option<&str> {
        self.entries
            .iter()
            .find(|(c, _)| *c == ch)
            .map(|(_, fp)| fp.as_str())
    }

    pub fn lookup(&self, fingerprint: &str) -> Option<char> {
        self.entries
            .iter()
            .find(|(_, fp)| fp == fingerprint)
            .map(|(ch, _)| *ch)
    }
}

/// Samples key images and resolves them against a glyph table.
pub struct KeypadDecoder {
    table: GlyphTable,
    region: SampleRegion,
    /// A pixel counts as ink when its green+blue sum is below this.
    /// Isolates reddish ink against a lighter background.
    ink_threshold: u16,
}

impl KeypadDecoder {
    /// Decoder for the stock digit keypad rendering.
    pub fn digits() -> Self {
        KeypadDecoder {
            table: GlyphTable::digits(),
            region: SampleRegion { x0: 19, y0: 17, width: 8, height: 10 },
            ink_threshold: 450,
        }
    }

    pub fn new(table: GlyphTable, region: SampleRegion, ink_threshold: u16) -> Self {
        KeypadDecoder { table, region, ink_threshold }
    }

    /// Binarized bit-string for one key image: column by column over the
    /// sample region, `1` where the pixel is ink.
    pub fn fingerprint(&self, img: &dyn PixelGrid) -> Result<String> {
        let r = self.region;
        if img.width() < r.x0 + r.width || img.height() < r.y0 + r.height {
            return Err(ScrapeError::Parse(format!(
                "key image {}x{} smaller than sample region",
                img.width(),
                img.height()
            )));
        }
        let mut bits = String::with_capacity(r.bits());
        for x in r.x0..r.x0 + r.width {
            for y in r.y0..r.y0 + r.height {
                let [_, g, b, _] = img.rgba(x, y);
                bits.push(if (g as u16 + b as u16) < self.ink_threshold { '1' } else { '0' });
            }
        }
        Ok(bits)
    }

    /// Resolve one captured keypad into a position → character mapping.
    ///
    /// Fails rather than guesses: an unmatched image is `UnrecognizedGlyph`,
    /// two keys resolving to the same character is `DuplicateGlyph`. A
    /// silently wrong digit would corrupt the submitted secret.
    pub fn build_mapping(&self, images: &[impl PixelGrid]) -> Result<KeypadMapping> {
        let mut keys = Vec::with_capacity(images.len());
        for (i, img) in images.iter().enumerate() {
            let fp = self.fingerprint(img)?;
            let ch = self
                .table
                .lookup(&fp)
                .ok_or(ScrapeError::UnrecognizedGlyph(i))?;
            if keys.contains(&ch) {
                return Err(ScrapeError::DuplicateGlyph(ch));
            }
            keys.push(ch);
        }
        Ok(KeypadMapping { keys })
    }
}

/// Per-attempt correspondence between key position and displayed character.
/// Discarded after the login attempt it was captured for.
pub struct KeypadMapping {
    keys: Vec<char>,
}

impl KeypadMapping {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn char_at(&self, index: usize) -> Option<char> {
        self.keys.get(index).copied()
    }

    /// Translate a cleartext secret into the positional code the site
    /// expects: the decimal index of each secret character, concatenated in
    /// input order.
    pub fn encode(&self, secret: &str) -> Result<String> {
        let mut code = String::with_capacity(secret.len());
        for ch in secret.chars() {
            let pos = self
                .keys
                .iter()
                .position(|k| *k == ch)
                .ok_or(ScrapeError::UnknownCharacter(ch))?;
            code.push_str(&pos.to_string());
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: image::Rgba<u8> = image::Rgba([255, 255, 255, 255]);
    const INK: image::Rgba<u8> = image::Rgba([200, 30, 40, 255]);

    /// Render a synthetic key image whose sampled fingerprint equals the
    /// reference bit-string for `digit`.
    fn key_image(digit: char) -> image::RgbaImage {
        let fp = DIGIT_FINGERPRINTS
            .iter()
            .find(|(ch, _)| *ch == digit)
            .map(|(_, fp)| *fp)
            .unwrap();
        let mut img = image::RgbaImage::from_pixel(28, 28, WHITE);
        for (i, bit) in fp.bytes().enumerate() {
            if bit == b'1' {
                let x = 19 + (i as u32) / 10;
                let y = 17 + (i as u32) % 10;
                img.put_pixel(x, y, INK);
            }
        }
        img
    }

    fn keypad(order: &str) -> Vec<image::RgbaImage> {
        order.chars().map(key_image).collect()
    }

    #[test]
    fn fingerprint_matches_reference() {
        let dec = KeypadDecoder::digits();
        for (ch, fp) in DIGIT_FINGERPRINTS {
            assert_eq!(dec.fingerprint(&key_image(ch)).unwrap(), fp, "digit {ch}");
        }
    }

    #[test]
    fn mapping_is_a_bijection() {
        let dec = KeypadDecoder::digits();
        let mapping = dec.build_mapping(&keypad("3145926870")).unwrap();
        assert_eq!(mapping.len(), 10);
        let mut seen = Vec::new();
        for i in 0..10 {
            let ch = mapping.char_at(i).unwrap();
            assert!(!seen.contains(&ch));
            seen.push(ch);
        }
    }

    #[test]
    fn encode_round_trips_through_mapping() {
        let dec = KeypadDecoder::digits();
        let mapping = dec.build_mapping(&keypad("9086714325")).unwrap();
        let secret = "314271";
        let code = mapping.encode(secret).unwrap();
        // Each emitted index, looked up in the mapping, reproduces the secret.
        let decoded: String = code
            .chars()
            .map(|c| mapping.char_at(c.to_digit(10).unwrap() as usize).unwrap())
            .collect();
        assert_eq!(decoded, secret);
    }

    #[test]
    fn encode_known_layout() {
        let dec = KeypadDecoder::digits();
        let mapping = dec.build_mapping(&keypad("0123456789")).unwrap();
        assert_eq!(mapping.encode("2017").unwrap(), "2017");
    }

    #[test]
    fn unknown_secret_character_fails() {
        let dec = KeypadDecoder::digits();
        let mapping = dec.build_mapping(&keypad("0123456789")).unwrap();
        assert!(matches!(
            mapping.encode("12a4"),
            Err(ScrapeError::UnknownCharacter('a'))
        ));
    }

    #[test]
    fn unrecognized_glyph_fails_without_partial_mapping() {
        let dec = KeypadDecoder::digits();
        let mut images = keypad("0123");
        // Blank image: all-zero fingerprint, not in the table.
        images.insert(2, image::RgbaImage::from_pixel(28, 28, WHITE));
        assert!(matches!(
            dec.build_mapping(&images),
            Err(ScrapeError::UnrecognizedGlyph(2))
        ));
    }

    #[test]
    fn duplicate_key_fails() {
        let dec = KeypadDecoder::digits();
        let images = keypad("0120");
        assert!(matches!(
            dec.build_mapping(&images),
            Err(ScrapeError::DuplicateGlyph('0'))
        ));
    }

    #[test]
    fn undersized_image_is_rejected() {
        let dec = KeypadDecoder::digits();
        let img = image::RgbaImage::from_pixel(10, 10, WHITE);
        assert!(dec.fingerprint(&img).is_err());
    }
}
