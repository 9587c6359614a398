use textures::{
    CompressedFormat, DecodedTexture, GpuTexture, KtxTexture, TextureError, TextureKind,
    TextureUploader,
};
use wgpu::util::{DeviceExt, TextureDataOrder};

/// The GPU side of a [`GpuTexture`] created by [`WgpuTextureUploader`].
pub struct UploadedTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// Uploads decoded material textures onto the renderer's device.
#[derive(Clone)]
pub struct WgpuTextureUploader {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl WgpuTextureUploader {
    pub(crate) fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }

    fn create(
        &self,
        label: &str,
        size: wgpu::Extent3d,
        mip_level_count: u32,
        format: wgpu::TextureFormat,
        kind: TextureKind,
        data: &[u8],
    ) -> Result<UploadedTexture, TextureError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.device.create_texture_with_data(
            &self.queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            data,
        );
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(TextureError::Upload(format!("{label}: {error}")));
        }
        let view = create_view(&texture, label, kind);
        Ok(UploadedTexture { texture, view })
    }

    fn upload_compressed(&self, label: &str, ktx: &KtxTexture) -> Result<UploadedTexture, TextureError> {
        let (format, feature) = match ktx.format {
            CompressedFormat::Bc1Rgba => (
                wgpu::TextureFormat::Bc1RgbaUnorm,
                wgpu::Features::TEXTURE_COMPRESSION_BC,
            ),
            CompressedFormat::Bc2Rgba => (
                wgpu::TextureFormat::Bc2RgbaUnorm,
                wgpu::Features::TEXTURE_COMPRESSION_BC,
            ),
            CompressedFormat::Bc3Rgba => (
                wgpu::TextureFormat::Bc3RgbaUnorm,
                wgpu::Features::TEXTURE_COMPRESSION_BC,
            ),
            CompressedFormat::Etc1Rgb => (
                wgpu::TextureFormat::Etc2Rgb8Unorm,
                wgpu::Features::TEXTURE_COMPRESSION_ETC2,
            ),
            other => {
                return Err(TextureError::Upload(format!(
                    "{label}: {other:?} has no GPU format on this renderer"
                )))
            }
        };
        if !self.device.features().contains(feature) {
            return Err(TextureError::Upload(format!(
                "{label}: device lacks {feature:?}"
            )));
        }
        if ktx.width % 4 != 0 || ktx.height % 4 != 0 {
            return Err(TextureError::Upload(format!(
                "{label}: compressed textures must be a multiple of 4 texels, got {}x{}",
                ktx.width, ktx.height
            )));
        }

        let data: Vec<u8> = ktx.levels.concat();
        self.create(
            label,
            wgpu::Extent3d {
                width: ktx.width,
                height: ktx.height,
                depth_or_array_layers: 1,
            },
            ktx.levels.len() as u32,
            format,
            TextureKind::D2,
            &data,
        )
    }
}

impl TextureUploader for WgpuTextureUploader {
    fn upload(&mut self, label: &str, texture: &DecodedTexture) -> Result<GpuTexture, TextureError> {
        let uploaded = match texture {
            DecodedTexture::Rgba {
                width,
                height,
                pixels,
            } => self.create(
                label,
                wgpu::Extent3d {
                    width: *width,
                    height: *height,
                    depth_or_array_layers: 1,
                },
                1,
                wgpu::TextureFormat::Rgba8Unorm,
                TextureKind::D2,
                pixels,
            )?,
            DecodedTexture::Cube { size, faces } => {
                let data: Vec<u8> = faces.concat();
                self.create(
                    label,
                    wgpu::Extent3d {
                        width: *size,
                        height: *size,
                        depth_or_array_layers: 6,
                    },
                    1,
                    wgpu::TextureFormat::Rgba8Unorm,
                    TextureKind::Cube,
                    &data,
                )?
            }
            DecodedTexture::Compressed(ktx) => self.upload_compressed(label, ktx)?,
        };
        let (width, height) = texture.dimensions();
        tracing::debug!(texture = label, width, height, kind = ?texture.kind(), "uploaded texture");
        Ok(GpuTexture::new(texture.kind(), width, height, uploaded))
    }
}

fn create_view(texture: &wgpu::Texture, label: &str, kind: TextureKind) -> wgpu::TextureView {
    match kind {
        TextureKind::D2 => texture.create_view(&wgpu::TextureViewDescriptor::default()),
        TextureKind::Cube => texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&format!("{label} cube view")),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            array_layer_count: Some(6),
            ..Default::default()
        }),
    }
}

/// Opaque white textures bound wherever a material texture is not ready, plus
/// the one sampler every material texture uses.
pub(crate) struct Placeholders {
    pub image: UploadedTexture,
    pub cube: UploadedTexture,
    pub sampler: wgpu::Sampler,
}

impl Placeholders {
    pub(crate) fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let white = [255u8; 4];
        let image = create_placeholder(device, queue, "placeholder texture", 1, &white, TextureKind::D2);
        let faces = white.repeat(6);
        let cube = create_placeholder(device, queue, "placeholder cube map", 6, &faces, TextureKind::Cube);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("material sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self {
            image,
            cube,
            sampler,
        }
    }

    pub(crate) fn view(&self, kind: TextureKind) -> &wgpu::TextureView {
        match kind {
            TextureKind::D2 => &self.image.view,
            TextureKind::Cube => &self.cube.view,
        }
    }
}

fn create_placeholder(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    layers: u32,
    data: &[u8],
    kind: TextureKind,
) -> UploadedTexture {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        data,
    );
    let view = create_view(&texture, label, kind);
    UploadedTexture { texture, view }
}
