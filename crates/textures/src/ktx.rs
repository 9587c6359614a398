//! KTX 1.1 container parsing for block-compressed textures.
//!
//! Only what compressed 2D textures need is read: the header, the key/value
//! section (skipped), and the mip levels. Array textures, cube maps, 3D
//! textures, and uncompressed payloads are rejected.
use fabric::Codec;

use crate::error::DecodeError;

pub const KTX_IDENTIFIER: [u8; 12] = [
    0xAB, 0x4B, 0x54, 0x58, 0x20, 0x31, 0x31, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A,
];
const HEADER_LEN: usize = 64;
const ENDIAN_REFERENCE: u32 = 0x0403_0201;

const GL_COMPRESSED_RGB_S3TC_DXT1: u32 = 0x83F0;
const GL_COMPRESSED_RGBA_S3TC_DXT1: u32 = 0x83F1;
const GL_COMPRESSED_RGBA_S3TC_DXT3: u32 = 0x83F2;
const GL_COMPRESSED_RGBA_S3TC_DXT5: u32 = 0x83F3;
const GL_ETC1_RGB8: u32 = 0x8D64;
const GL_COMPRESSED_RGB_PVRTC_4BPPV1: u32 = 0x8C00;
const GL_COMPRESSED_RGB_PVRTC_2BPPV1: u32 = 0x8C01;
const GL_COMPRESSED_RGBA_PVRTC_4BPPV1: u32 = 0x8C02;
const GL_COMPRESSED_RGBA_PVRTC_2BPPV1: u32 = 0x8C03;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressedFormat {
    Bc1Rgba,
    Bc2Rgba,
    Bc3Rgba,
    Etc1Rgb,
    Pvrtc4Rgb,
    Pvrtc2Rgb,
    Pvrtc4Rgba,
    Pvrtc2Rgba,
}

impl CompressedFormat {
    pub fn from_gl_internal_format(value: u32) -> Option<Self> {
        let format = match value {
            GL_COMPRESSED_RGB_S3TC_DXT1 | GL_COMPRESSED_RGBA_S3TC_DXT1 => CompressedFormat::Bc1Rgba,
            GL_COMPRESSED_RGBA_S3TC_DXT3 => CompressedFormat::Bc2Rgba,
            GL_COMPRESSED_RGBA_S3TC_DXT5 => CompressedFormat::Bc3Rgba,
            GL_ETC1_RGB8 => CompressedFormat::Etc1Rgb,
            GL_COMPRESSED_RGB_PVRTC_4BPPV1 => CompressedFormat::Pvrtc4Rgb,
            GL_COMPRESSED_RGB_PVRTC_2BPPV1 => CompressedFormat::Pvrtc2Rgb,
            GL_COMPRESSED_RGBA_PVRTC_4BPPV1 => CompressedFormat::Pvrtc4Rgba,
            GL_COMPRESSED_RGBA_PVRTC_2BPPV1 => CompressedFormat::Pvrtc2Rgba,
            _ => return None,
        };
        Some(format)
    }

    pub fn codec(self) -> Codec {
        match self {
            CompressedFormat::Bc1Rgba | CompressedFormat::Bc2Rgba | CompressedFormat::Bc3Rgba => {
                Codec::S3tc
            }
            CompressedFormat::Etc1Rgb => Codec::Etc1,
            CompressedFormat::Pvrtc4Rgb
            | CompressedFormat::Pvrtc2Rgb
            | CompressedFormat::Pvrtc4Rgba
            | CompressedFormat::Pvrtc2Rgba => Codec::Pvrtc,
        }
    }

    /// Bytes per 4x4 block for the block formats; `None` for PVRTC.
    pub fn block_bytes(self) -> Option<usize> {
        match self {
            CompressedFormat::Bc1Rgba | CompressedFormat::Etc1Rgb => Some(8),
            CompressedFormat::Bc2Rgba | CompressedFormat::Bc3Rgba => Some(16),
            _ => None,
        }
    }

    /// Expected byte length of one mip level, when it can be computed.
    pub fn level_len(self, width: u32, height: u32) -> Option<usize> {
        let block = self.block_bytes()?;
        let blocks_x = width.max(1).div_ceil(4) as usize;
        let blocks_y = height.max(1).div_ceil(4) as usize;
        Some(blocks_x * blocks_y * block)
    }
}

/// A compressed 2D texture with its mip chain, largest level first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KtxTexture {
    pub format: CompressedFormat,
    pub width: u32,
    pub height: u32,
    pub levels: Vec<Vec<u8>>,
}

pub fn is_ktx(bytes: &[u8]) -> bool {
    bytes.starts_with(&KTX_IDENTIFIER)
}

pub fn parse(bytes: &[u8]) -> Result<KtxTexture, DecodeError> {
    if !is_ktx(bytes) {
        return Err(DecodeError::Ktx("missing KTX 1.1 identifier".to_string()));
    }
    if bytes.len() < HEADER_LEN {
        return Err(DecodeError::Ktx(format!(
            "header truncated ({} bytes)",
            bytes.len()
        )));
    }

    let little_endian = match read_u32(bytes, 12, true) {
        Some(ENDIAN_REFERENCE) => true,
        Some(value) if value.swap_bytes() == ENDIAN_REFERENCE => false,
        _ => return Err(DecodeError::Ktx("invalid endianness marker".to_string())),
    };
    let field = |offset: usize| {
        read_u32(bytes, offset, little_endian)
            .ok_or_else(|| DecodeError::Ktx(format!("field at byte {offset} is truncated")))
    };

    let gl_type = field(16)?;
    let gl_internal_format = field(28)?;
    let width = field(36)?;
    let height = field(40)?;
    let depth = field(44)?;
    let array_elements = field(48)?;
    let faces = field(52)?;
    let mip_levels = field(56)?.max(1);
    let key_value_len = field(60)? as usize;

    if gl_type != 0 {
        return Err(DecodeError::Unsupported(
            "uncompressed KTX payloads are not supported".to_string(),
        ));
    }
    if depth > 1 || array_elements > 0 || faces != 1 {
        return Err(DecodeError::Unsupported(format!(
            "only 2D KTX textures are supported (depth {depth}, array elements {array_elements}, faces {faces})"
        )));
    }
    if width == 0 || height == 0 {
        return Err(DecodeError::Ktx("zero-sized texture".to_string()));
    }
    let format = CompressedFormat::from_gl_internal_format(gl_internal_format).ok_or_else(|| {
        DecodeError::Unsupported(format!(
            "compressed internal format 0x{gl_internal_format:04X}"
        ))
    })?;

    let mut offset = HEADER_LEN
        .checked_add(key_value_len)
        .ok_or_else(|| DecodeError::Ktx("key/value length overflows".to_string()))?;

    // A full chain ends at 1x1, and every level needs at least its size field.
    let max_levels = 32 - width.max(height).leading_zeros();
    if mip_levels > max_levels {
        return Err(DecodeError::Ktx(format!(
            "{mip_levels} mip levels exceed the {max_levels} a {width}x{height} texture can have"
        )));
    }
    let remaining = bytes.len().saturating_sub(offset);
    if mip_levels as usize > remaining / 4 {
        return Err(DecodeError::Ktx(format!(
            "{mip_levels} mip levels do not fit in {remaining} bytes"
        )));
    }

    let mut levels = Vec::with_capacity(mip_levels as usize);
    for level in 0..mip_levels {
        let size = read_u32(bytes, offset, little_endian).ok_or_else(|| {
            DecodeError::Ktx(format!("mip level {level} size is truncated"))
        })? as usize;
        let start = offset + 4;
        let data = start
            .checked_add(size)
            .and_then(|end| bytes.get(start..end))
            .ok_or_else(|| DecodeError::Ktx(format!("mip level {level} data is truncated")))?;

        let level_width = width.checked_shr(level).unwrap_or(0).max(1);
        let level_height = height.checked_shr(level).unwrap_or(0).max(1);
        if let Some(expected) = format.level_len(level_width, level_height) {
            if expected != size {
                return Err(DecodeError::Ktx(format!(
                    "mip level {level} holds {size} bytes, expected {expected}"
                )));
            }
        }
        levels.push(data.to_vec());
        // data fit inside `bytes`, so padding to 4 cannot overflow
        offset = (start + size + 3) & !3;
    }

    Ok(KtxTexture {
        format,
        width,
        height,
        levels,
    })
}

fn read_u32(bytes: &[u8], offset: usize, little_endian: bool) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
    Some(if little_endian {
        u32::from_le_bytes(raw)
    } else {
        u32::from_be_bytes(raw)
    })
}

/// Builds a little-endian KTX 1.1 container; used by tests and fixtures.
pub fn encode(format_gl: u32, width: u32, height: u32, levels: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&KTX_IDENTIFIER);
    let header = [
        ENDIAN_REFERENCE,
        0, // glType
        1, // glTypeSize
        0, // glFormat
        format_gl,
        0, // glBaseInternalFormat
        width,
        height,
        0, // pixelDepth
        0, // numberOfArrayElements
        1, // numberOfFaces
        levels.len() as u32,
        0, // bytesOfKeyValueData
    ];
    for value in header {
        out.extend_from_slice(&value.to_le_bytes());
    }
    for level in levels {
        out.extend_from_slice(&(level.len() as u32).to_le_bytes());
        out.extend_from_slice(level);
        while out.len() % 4 != 0 {
            out.push(0);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_level_bc1() {
        let bytes = encode(GL_COMPRESSED_RGBA_S3TC_DXT1, 4, 4, &[vec![7u8; 8]]);
        let texture = parse(&bytes).unwrap();
        assert_eq!(texture.format, CompressedFormat::Bc1Rgba);
        assert_eq!(texture.format.codec(), Codec::S3tc);
        assert_eq!((texture.width, texture.height), (4, 4));
        assert_eq!(texture.levels, vec![vec![7u8; 8]]);
    }

    #[test]
    fn parses_mip_chain() {
        let levels = vec![vec![1u8; 32], vec![2u8; 8], vec![3u8; 8]];
        let bytes = encode(GL_ETC1_RGB8, 8, 8, &levels);
        let texture = parse(&bytes).unwrap();
        assert_eq!(texture.format.codec(), Codec::Etc1);
        assert_eq!(texture.levels, levels);
    }

    #[test]
    fn parses_big_endian_header() {
        let mut bytes = encode(GL_COMPRESSED_RGBA_S3TC_DXT5, 4, 4, &[vec![0u8; 16]]);
        for chunk in bytes[12..].chunks_exact_mut(4) {
            chunk.reverse();
        }
        // level payload bytes are all zero, so reversing them is harmless
        let texture = parse(&bytes).unwrap();
        assert_eq!(texture.format, CompressedFormat::Bc3Rgba);
    }

    #[test]
    fn rejects_bad_containers() {
        assert!(parse(b"not a ktx file").is_err());

        let mut truncated = encode(GL_COMPRESSED_RGBA_S3TC_DXT1, 4, 4, &[vec![0u8; 8]]);
        truncated.truncate(70);
        assert!(matches!(parse(&truncated), Err(DecodeError::Ktx(_))));

        let wrong_size = encode(GL_COMPRESSED_RGBA_S3TC_DXT1, 8, 8, &[vec![0u8; 8]]);
        assert!(matches!(parse(&wrong_size), Err(DecodeError::Ktx(_))));

        let unknown = encode(0x1234, 4, 4, &[vec![0u8; 8]]);
        assert!(matches!(parse(&unknown), Err(DecodeError::Unsupported(_))));
    }

    fn set_mip_levels(bytes: &mut [u8], levels: u32) {
        bytes[56..60].copy_from_slice(&levels.to_le_bytes());
    }

    #[test]
    fn rejects_huge_mip_count() {
        let mut bytes = encode(GL_COMPRESSED_RGBA_S3TC_DXT1, 1, 1, &[vec![0u8; 8]]);
        set_mip_levels(&mut bytes, u32::MAX);
        assert!(matches!(parse(&bytes), Err(DecodeError::Ktx(_))));
    }

    #[test]
    fn rejects_more_levels_than_the_edge_allows() {
        // 33 well-formed 8-byte levels for a 1x1 texture
        let levels = vec![vec![0u8; 8]; 33];
        let bytes = encode(GL_COMPRESSED_RGBA_S3TC_DXT1, 1, 1, &levels);
        assert!(matches!(parse(&bytes), Err(DecodeError::Ktx(_))));

        // 8x8 allows four levels; a fifth 1x1 level is one too many
        let levels = vec![vec![0u8; 32], vec![0u8; 8], vec![0u8; 8], vec![0u8; 8], vec![0u8; 8]];
        let bytes = encode(GL_ETC1_RGB8, 8, 8, &levels);
        assert!(matches!(parse(&bytes), Err(DecodeError::Ktx(_))));
    }

    #[test]
    fn rejects_mip_count_beyond_the_payload() {
        let mut bytes = encode(GL_COMPRESSED_RGBA_S3TC_DXT1, 1024, 1, &[vec![0u8; 8]]);
        bytes.truncate(HEADER_LEN + 4);
        set_mip_levels(&mut bytes, 11);
        assert!(matches!(parse(&bytes), Err(DecodeError::Ktx(_))));
    }

    #[test]
    fn rejects_truncated_level_data() {
        let mut bytes = encode(GL_ETC1_RGB8, 8, 8, &[vec![1u8; 32], vec![2u8; 8]]);
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(parse(&bytes), Err(DecodeError::Ktx(_))));

        let mut oversized = encode(GL_COMPRESSED_RGBA_S3TC_DXT1, 4, 4, &[vec![0u8; 8]]);
        oversized[HEADER_LEN..HEADER_LEN + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(parse(&oversized), Err(DecodeError::Ktx(_))));
    }
}
