//! Encoding side helpers for building test streams.

use std::collections::HashMap;

/// Reference LZW encoder producing `(code, width)` pairs, clear code first
/// and end of information last. Emits a clear code whenever the dictionary
/// fills up.
pub(crate) fn lzw_encode(pixels: &[u8], root: u8) -> Vec<(u16, u8)> {
    let clear_code = 1u16 << root;
    let end_of_information_code = clear_code + 1;

    let mut width = root + 1;
    let mut next_code = end_of_information_code + 1;
    let mut table: HashMap<(u16, u8), u16> = HashMap::new();
    let mut codes = vec![(clear_code, width)];

    let Some((&first, rest)) = pixels.split_first() else {
        codes.push((end_of_information_code, width));
        return codes;
    };

    let mut current = u16::from(first);
    for &pixel in rest {
        if let Some(&code) = table.get(&(current, pixel)) {
            current = code;
            continue;
        }

        codes.push((current, width));
        if next_code >= 1 << width && width < 12 {
            width += 1;
        }

        if next_code < 4096 {
            table.insert((current, pixel), next_code);
            next_code += 1;
        } else {
            codes.push((clear_code, width));
            table.clear();
            width = root + 1;
            next_code = end_of_information_code + 1;
        }
        current = u16::from(pixel);
    }

    codes.push((current, width));
    if next_code >= 1 << width && width < 12 {
        width += 1;
    }
    codes.push((end_of_information_code, width));
    codes
}

/// Packs codes LSB first.
pub(crate) fn pack_codes(codes: &[(u16, u8)]) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut buffer: u32 = 0;
    let mut bits = 0;

    for &(code, width) in codes {
        buffer |= u32::from(code) << bits;
        bits += width;
        while bits >= 8 {
            bytes.push(buffer as u8);
            buffer >>= 8;
            bits -= 8;
        }
    }
    if bits > 0 {
        bytes.push(buffer as u8);
    }
    bytes
}

/// Splits `data` into sub-blocks of at most `size` bytes and appends the block
/// terminator.
pub(crate) fn frame_sub_blocks(data: &[u8], size: usize) -> Vec<u8> {
    let mut framed = Vec::new();
    for chunk in data.chunks(size.min(255)) {
        framed.push(chunk.len() as u8);
        framed.extend_from_slice(chunk);
    }
    framed.push(0);
    framed
}

pub(crate) struct Xorshift(u32);

impl Xorshift {
    pub(crate) fn new(seed: u32) -> Self {
        Self(seed)
    }

    pub(crate) fn below(&mut self, bound: u8) -> u8 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 17;
        self.0 ^= self.0 << 5;
        (self.0 % u32::from(bound)) as u8
    }
}

/// One image for [`build_gif`].
pub(crate) struct TestImage {
    pub(crate) left: u16,
    pub(crate) top: u16,
    pub(crate) width: u16,
    pub(crate) height: u16,
    pub(crate) root: u8,
    pub(crate) pixels: Vec<u8>,
    pub(crate) local_color_table: Option<Vec<u8>>,
    pub(crate) interlaced: bool,
    /// `(disposal method, transparent index)` for a graphic control extension.
    pub(crate) control: Option<(u8, Option<u8>)>,
}

impl TestImage {
    pub(crate) fn new(width: u16, height: u16, root: u8, pixels: Vec<u8>) -> Self {
        Self {
            left: 0,
            top: 0,
            width,
            height,
            root,
            pixels,
            local_color_table: None,
            interlaced: false,
            control: None,
        }
    }
}

/// Size of the color table field for a table of `entries` colors.
fn table_size_bits(entries: usize) -> u8 {
    let mut bits = 0;
    while (2usize << bits) < entries {
        bits += 1;
    }
    bits
}

pub(crate) fn build_gif(width: u16, height: u16, global_color_table: Option<&[u8]>, background: u8, images: &[TestImage]) -> Vec<u8> {
    let mut gif = b"GIF89a".to_vec();
    gif.extend_from_slice(&width.to_le_bytes());
    gif.extend_from_slice(&height.to_le_bytes());

    let packed = match global_color_table {
        Some(table) => 0b1111_0000 | table_size_bits(table.len() / 3),
        None => 0b0111_0000,
    };
    gif.extend_from_slice(&[packed, background, 0]);
    if let Some(table) = global_color_table {
        gif.extend_from_slice(table);
    }

    // a comment and a looping application extension, both skipped by the parser
    gif.extend_from_slice(&[0x21, 0xfe, 3, b'h', b'e', b'y', 0]);
    gif.extend_from_slice(&[0x21, 0xff, 11]);
    gif.extend_from_slice(b"NETSCAPE2.0");
    gif.extend_from_slice(&[3, 1, 0, 0, 0]);

    for image in images {
        if let Some((disposal, transparent)) = image.control {
            let packed = (disposal << 2) | u8::from(transparent.is_some());
            gif.extend_from_slice(&[0x21, 0xf9, 4, packed, 10, 0, transparent.unwrap_or(0), 0]);
        }

        gif.push(0x2c);
        for field in [image.left, image.top, image.width, image.height] {
            gif.extend_from_slice(&field.to_le_bytes());
        }

        let mut packed = if image.interlaced { 0b0100_0000 } else { 0 };
        if let Some(table) = &image.local_color_table {
            packed |= 0b1000_0000 | table_size_bits(table.len() / 3);
        }
        gif.push(packed);
        if let Some(table) = &image.local_color_table {
            gif.extend_from_slice(table);
        }

        gif.push(image.root);
        gif.extend(frame_sub_blocks(&pack_codes(&lzw_encode(&image.pixels, image.root)), 255));
    }

    gif.push(0x3b);
    gif
}
