use fabric::{Codec, InMemoryImage};
use image::imageops::flip_vertical_in_place;

use crate::error::DecodeError;
use crate::fetch::FetchedResource;
use crate::ktx::{self, KtxTexture};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    D2,
    Cube,
}

/// Texture data ready for upload. RGBA rows run bottom to top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedTexture {
    Rgba {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
    /// Six square faces in `positiveX, negativeX, positiveY, negativeY,
    /// positiveZ, negativeZ` order.
    Cube { size: u32, faces: Vec<Vec<u8>> },
    Compressed(KtxTexture),
}

impl DecodedTexture {
    pub fn kind(&self) -> TextureKind {
        match self {
            DecodedTexture::Cube { .. } => TextureKind::Cube,
            DecodedTexture::Rgba { .. } | DecodedTexture::Compressed(_) => TextureKind::D2,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            DecodedTexture::Rgba { width, height, .. } => (*width, *height),
            DecodedTexture::Cube { size, .. } => (*size, *size),
            DecodedTexture::Compressed(texture) => (texture.width, texture.height),
        }
    }

    pub fn from_in_memory(image: &InMemoryImage) -> Self {
        DecodedTexture::Rgba {
            width: image.width,
            height: image.height,
            pixels: image.pixels.to_vec(),
        }
    }
}

/// Decodes an encoded image. KTX containers are accepted as well and come back
/// compressed.
pub fn decode_image(bytes: &[u8]) -> Result<DecodedTexture, DecodeError> {
    if ktx::is_ktx(bytes) {
        return Ok(DecodedTexture::Compressed(ktx::parse(bytes)?));
    }
    let (width, height, pixels) = decode_rgba(bytes)?;
    Ok(DecodedTexture::Rgba {
        width,
        height,
        pixels,
    })
}

/// Decodes a compressed texture fetched for `expected`.
pub fn decode_compressed(bytes: &[u8], expected: Codec) -> Result<DecodedTexture, DecodeError> {
    if !ktx::is_ktx(bytes) {
        return Err(DecodeError::Unsupported(
            "compressed textures must be KTX 1.1 containers".to_string(),
        ));
    }
    let texture = ktx::parse(bytes)?;
    let found = texture.format.codec();
    if found != expected {
        return Err(DecodeError::CodecMismatch { expected, found });
    }
    Ok(DecodedTexture::Compressed(texture))
}

/// Assembles a cube map from six fetched faces.
pub fn decode_cube(faces: Vec<FetchedResource>) -> Result<DecodedTexture, DecodeError> {
    if faces.len() != 6 {
        return Err(DecodeError::CubeFaces(format!(
            "expected 6 faces, found {}",
            faces.len()
        )));
    }

    let mut size = None;
    let mut data = Vec::with_capacity(6);
    for (index, face) in faces.into_iter().enumerate() {
        let (width, height, pixels) = match face {
            FetchedResource::Bytes(bytes) => decode_rgba(&bytes)?,
            FetchedResource::Image(image) => (image.width, image.height, image.pixels.to_vec()),
        };
        if width != height {
            return Err(DecodeError::CubeFaces(format!(
                "face {index} is {width}x{height}"
            )));
        }
        match size {
            None => size = Some(width),
            Some(expected) if expected != width => {
                return Err(DecodeError::CubeFaces(format!(
                    "face {index} is {width}px, face 0 is {expected}px"
                )))
            }
            Some(_) => {}
        }
        data.push(pixels);
    }

    Ok(DecodedTexture::Cube {
        size: size.unwrap_or(1),
        faces: data,
    })
}

fn decode_rgba(bytes: &[u8]) -> Result<(u32, u32, Vec<u8>), DecodeError> {
    let image = image::load_from_memory(bytes).map_err(|err| DecodeError::Image(err.to_string()))?;
    let mut rgba = image.to_rgba8();
    flip_vertical_in_place(&mut rgba);
    let (width, height) = rgba.dimensions();
    Ok((width, height, rgba.into_raw()))
}
