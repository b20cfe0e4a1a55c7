//! Moving CPU-side assets onto the GPU and into the registry.
//!
//! Meshes become GPU-only vertex buffers. Textures go through a staging
//! buffer into an sRGB image with a full mip chain, generated on the GPU by
//! successive linear blits. Everything created here has engine lifetime.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use lumen_resources::{ImageData, MeshData};
use lumen_rhi::image::{
    ImageView, Sampler, check_linear_blit, record_layout_transition, record_mip_chain,
};
use lumen_rhi::memory::{GpuContext, Lifetime, MemoryUsage};
use lumen_rhi::upload::UploadContext;
use lumen_scene::{Mesh, MeshId, Registry, SceneError, Texture, TextureId};

use crate::error::RenderResult;

/// Format every texture is uploaded in.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Uploads `data` as a vertex buffer and registers it as mesh `name`.
///
/// # Errors
///
/// Fails with [`SceneError::Duplicate`] before touching the GPU if `name` is
/// taken, with `RhiError::EmptyBuffer` for a mesh without vertices, or with
/// any allocation or submission error.
pub fn upload_mesh(
    ctx: &mut GpuContext,
    upload: &UploadContext,
    registry: &mut Registry,
    name: &str,
    data: MeshData,
) -> RenderResult<MeshId> {
    if registry.mesh_id(name).is_some() {
        return Err(SceneError::Duplicate {
            kind: "mesh",
            name: name.to_owned(),
        }
        .into());
    }

    let vertex_buffer = upload.upload_buffer(
        ctx,
        &format!("mesh '{name}'"),
        data.as_bytes(),
        vk::BufferUsageFlags::VERTEX_BUFFER,
    )?;
    info!("Mesh '{}' uploaded: {} vertices", name, data.vertex_count());

    let id = registry.insert_mesh(Mesh {
        name: name.to_owned(),
        vertices: data.vertices,
        vertex_buffer,
    })?;
    Ok(id)
}

/// Uploads `data` as a mip-mapped texture and registers it as `name`.
///
/// One blocking submission copies level 0 from a staging buffer and then
/// records the whole mip chain; on return every level is in
/// `SHADER_READ_ONLY_OPTIMAL`.
///
/// # Errors
///
/// Fails with `ResourceError::InvalidImage` if `data` is not a tightly
/// packed RGBA8 image, [`SceneError::Duplicate`] if `name` is taken,
/// `RhiError::UnsupportedFormat` when the device cannot linearly blit
/// [`TEXTURE_FORMAT`], or any allocation or submission error.
pub fn upload_texture(
    ctx: &mut GpuContext,
    upload: &UploadContext,
    registry: &mut Registry,
    name: &str,
    data: &ImageData,
) -> RenderResult<TextureId> {
    // The copy region is sized from the extent, the staging buffer from the pixels.
    data.validate()?;
    if registry.texture_id(name).is_some() {
        return Err(SceneError::Duplicate {
            kind: "texture",
            name: name.to_owned(),
        }
        .into());
    }
    let device = Arc::clone(ctx.device());
    check_linear_blit(&device, TEXTURE_FORMAT)?;

    let staging = ctx.allocate_buffer(
        &format!("texture '{name}' staging"),
        data.byte_len() as vk::DeviceSize,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryUsage::CpuToGpu,
        Lifetime::Transient,
    )?;
    staging.write_bytes(0, &data.pixels)?;

    let mip_levels = data.mip_levels();
    let extent = vk::Extent3D {
        width: data.width,
        height: data.height,
        depth: 1,
    };
    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(TEXTURE_FORMAT)
        .extent(extent)
        .mip_levels(mip_levels)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(
            vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::SAMPLED,
        )
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);
    let image = ctx.allocate_image(
        &format!("texture '{name}'"),
        &image_info,
        MemoryUsage::GpuOnly,
        Lifetime::Engine,
    )?;

    upload.submit_once(|cmd| {
        record_layout_transition(cmd, image.handle(), mip_levels);
        let region = vk::BufferImageCopy::default()
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .image_extent(extent);
        cmd.copy_buffer_to_image(
            staging.handle(),
            image.handle(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
        record_mip_chain(cmd, image.handle(), extent, mip_levels);
    })?;
    drop(staging);

    let view = ImageView::new(
        Arc::clone(&device),
        image.handle(),
        TEXTURE_FORMAT,
        vk::ImageAspectFlags::COLOR,
        mip_levels,
    )?;
    let sampler = Sampler::new(device, mip_levels)?;
    let (view_handle, sampler_handle) = (view.handle(), sampler.handle());
    ctx.defer(format!("texture '{name}' view"), view);
    ctx.defer(format!("texture '{name}' sampler"), sampler);

    info!(
        "Texture '{}' uploaded: {}x{}, {} mip level(s)",
        name, data.width, data.height, mip_levels
    );

    let id = registry.insert_texture(Texture {
        name: name.to_owned(),
        image,
        view: view_handle,
        sampler: sampler_handle,
    })?;
    Ok(id)
}
