//! The engine: one owned context for every GPU object of a window.
//!
//! [`Engine`] bootstraps Vulkan for a [`Window`], builds the render pass,
//! depth buffer, descriptor model and frame ring, and then renders the
//! objects of its [`Registry`] one frame at a time.
//!
//! # Resource Destruction Order
//!
//! 1. Wait for the device to go idle
//! 2. Frame ring, framebuffers and swapchain (owned by the backend)
//! 3. Upload context
//! 4. Deletion queue, newest first: materials, textures, meshes, frame
//!    buffers, descriptor pool and layouts, render pass, depth buffer
//! 5. Surface
//! 6. Device (with its allocator)
//! 7. Instance
//!
//! `ManuallyDrop` keeps this order explicit in [`Drop`].

use std::mem::ManuallyDrop;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use glam::Vec3;
use tracing::{debug, error, info, warn};

use lumen_core::config::CameraConfig;
use lumen_core::{EngineConfig, FailurePolicy};
use lumen_platform::{Surface, Window};
use lumen_resources::{ImageData, MeshData};
use lumen_rhi::command::CommandRecorder;
use lumen_rhi::device::Device;
use lumen_rhi::instance::Instance;
use lumen_rhi::memory::GpuContext;
use lumen_rhi::physical_device::{PresentTarget, select_physical_device};
use lumen_rhi::pipeline::{GraphicsPipelineBuilder, PipelineLayout};
use lumen_rhi::render_pass::{Framebuffer, RenderPass};
use lumen_rhi::shader::{Shader, ShaderStage};
use lumen_rhi::swapchain::Swapchain;
use lumen_rhi::sync::FRAME_TIMEOUT_NS;
use lumen_rhi::upload::UploadContext;
use lumen_rhi::{RhiError, RhiResult};
use lumen_scene::{Camera, Material, MaterialId, MeshId, Registry, SceneError, TextureId};

use crate::assets;
use crate::depth_buffer::{DEPTH_FORMAT, DepthBuffer};
use crate::descriptors::{DescriptorModel, FrameSets};
use crate::draw::DrawStats;
use crate::error::{RenderError, RenderResult};
use crate::frame::{FrameRing, SubmitSync};
use crate::orchestrator::{FrameBackend, FrameData, FrameOrchestrator, RenderTarget};
use crate::overlay::Overlay;
use crate::ubo::MeshPushConstants;

/// Vertex shader shared by every material.
pub const MESH_VERTEX_SHADER: &str = "tri_mesh_ssbo.vert.spv";
pub const DEFAULT_LIT_SHADER: &str = "default_lit.frag.spv";
pub const TEXTURED_LIT_SHADER: &str = "textured_lit.frag.spv";

pub const DEFAULT_MATERIAL: &str = "defaultmesh";
pub const TEXTURED_MATERIAL: &str = "texturedmesh";

/// Camera described by `config`, with the aspect ratio of `extent`.
pub fn camera_from_config(config: &CameraConfig, extent: vk::Extent2D) -> Camera {
    let mut camera = Camera::look_at(
        Vec3::from_array(config.position),
        Vec3::from_array(config.target),
        Vec3::from_array(config.up),
    )
    .with_perspective(config.fov_degrees, 1.0, config.near, config.far);
    camera.set_aspect_from_extent(extent.width, extent.height);
    camera
}

/// Applies `policy` to GPU failures only.
///
/// Errors in the asset itself ([`RenderError::is_asset_error`]) are logged
/// and returned whatever the policy.
pub fn enforce_on_gpu_errors<T>(
    policy: FailurePolicy,
    context: &str,
    result: RenderResult<T>,
) -> RenderResult<T> {
    match result {
        Err(e) if e.is_asset_error() => {
            warn!("{} skipped: {}", context, e);
            Err(e)
        }
        result => policy.enforce(context, result),
    }
}

/// The single push constant range of every material pipeline.
pub fn mesh_push_constant_range() -> vk::PushConstantRange {
    vk::PushConstantRange::default()
        .stage_flags(vk::ShaderStageFlags::VERTEX)
        .offset(0)
        .size(MeshPushConstants::SIZE as u32)
}

// ============================================================================
// SwapchainBackend
// ============================================================================

/// [`FrameBackend`] over the frame ring and a real swapchain.
///
/// Fields drop in declaration order: slot objects, then framebuffers, then
/// the swapchain whose image views the framebuffers reference.
pub struct SwapchainBackend {
    frames: FrameRing,
    framebuffers: Vec<Framebuffer>,
    swapchain: Swapchain,
    render_pass: vk::RenderPass,
    device: Arc<Device>,
}

impl SwapchainBackend {
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    #[inline]
    pub fn frames(&self) -> &FrameRing {
        &self.frames
    }
}

impl FrameBackend for SwapchainBackend {
    fn wait_for_slot(&mut self, slot: usize) -> RenderResult<()> {
        self.frames.slot(slot).wait_until_free(FRAME_TIMEOUT_NS)?;
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> RenderResult<u32> {
        let semaphore = self.frames.slot(slot).present_semaphore().handle();
        let (image_index, suboptimal) =
            self.swapchain.acquire_next_image(semaphore, FRAME_TIMEOUT_NS)?;
        if suboptimal {
            debug!("Acquired image {} from a suboptimal swapchain", image_index);
        }
        Ok(image_index)
    }

    fn write_frame_data(&mut self, slot: usize, data: &FrameData<'_>) -> RenderResult<()> {
        self.frames.write_frame_data(slot, data)?;
        Ok(())
    }

    fn frame_sets(&self, slot: usize) -> FrameSets {
        self.frames.slot(slot).sets()
    }

    fn padded_scene_size(&self) -> vk::DeviceSize {
        self.frames.padded_scene_size()
    }

    fn max_objects(&self) -> usize {
        self.frames.max_objects() as usize
    }

    fn render_target(&self, image_index: u32) -> RenderResult<RenderTarget> {
        let framebuffer = self
            .framebuffers
            .get(image_index as usize)
            .ok_or(RenderError::NoFramebuffer(image_index))?;
        Ok(RenderTarget {
            render_pass: self.render_pass,
            framebuffer: framebuffer.handle(),
            extent: self.swapchain.extent(),
        })
    }

    fn begin_commands(&mut self, slot: usize) -> RenderResult<&mut dyn CommandRecorder> {
        let cmd = self.frames.slot_mut(slot).begin_commands()?;
        Ok(cmd)
    }

    fn submit(&mut self, slot: usize) -> RenderResult<()> {
        self.frames
            .slot(slot)
            .submit(&self.device, SubmitSync::Present)?;
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RenderResult<()> {
        let queue = self.device.present_queue().ok_or_else(|| {
            RhiError::SwapchainError("Device was created without a present queue".to_string())
        })?;
        let wait = self.frames.slot(slot).render_semaphore().handle();
        if self.swapchain.present(queue, image_index, wait)? {
            debug!("Presented image {} to a suboptimal swapchain", image_index);
        }
        Ok(())
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Owns every GPU object of one window and renders its registry.
pub struct Engine {
    backend: ManuallyDrop<SwapchainBackend>,
    upload: ManuallyDrop<UploadContext>,
    descriptors: ManuallyDrop<DescriptorModel>,
    ctx: ManuallyDrop<GpuContext>,
    surface: ManuallyDrop<Surface>,
    device: ManuallyDrop<Arc<Device>>,
    instance: ManuallyDrop<Instance>,

    depth: DepthBuffer,
    render_pass: vk::RenderPass,
    registry: Registry,
    orchestrator: FrameOrchestrator,
    camera: Camera,
    policy: FailurePolicy,
    shader_dir: PathBuf,
}

impl Engine {
    /// Initializes Vulkan for `window`.
    ///
    /// Failures go through the configured failure policy.
    ///
    /// # Errors
    ///
    /// Returns an error (under [`FailurePolicy::Propagate`]) if any step of
    /// the bootstrap fails. Everything created before the failure is
    /// released.
    pub fn new(window: &Window, config: &EngineConfig) -> RenderResult<Self> {
        let policy = config.policy.on_gpu_error;
        policy.enforce("engine initialization", Self::init(window, config))
    }

    fn init(window: &Window, config: &EngineConfig) -> RenderResult<Self> {
        info!(
            "Initializing engine ({}x{})",
            window.width(),
            window.height()
        );

        let extensions = window.required_extensions()?;
        let instance = Instance::new(&config.window.title, config.renderer.validation, &extensions)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let info = select_physical_device(
            instance.handle(),
            Some(PresentTarget {
                surface: surface.handle(),
                loader: surface.loader(),
            }),
        )?;
        info!(
            "Selected GPU: {} ({})",
            info.device_name(),
            info.device_type_name()
        );
        let device = Device::new(&instance, &info)?;
        let mut ctx = GpuContext::new(Arc::clone(&device));

        let swapchain = Swapchain::new(
            &instance,
            Arc::clone(&device),
            surface.handle(),
            window.width(),
            window.height(),
            config.renderer.vsync,
        )?;
        let extent = swapchain.extent();

        let depth = DepthBuffer::new(&mut ctx, extent)?;
        let render_pass = RenderPass::new(Arc::clone(&device), swapchain.format(), DEPTH_FORMAT)?;
        let render_pass_handle = render_pass.handle();
        ctx.defer("render pass", render_pass);

        let framebuffers = swapchain
            .image_views()
            .map(|view| {
                Framebuffer::new(
                    Arc::clone(&device),
                    render_pass_handle,
                    &[view, depth.image_view()],
                    extent,
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        let descriptors = DescriptorModel::new(&mut ctx)?;
        let frames = FrameRing::new(&mut ctx, &descriptors, config.renderer.max_objects)?;
        let upload = UploadContext::new(Arc::clone(&device))?;

        let camera = camera_from_config(&config.camera, extent);

        info!(
            "Engine initialized: {} swapchain images, {}x{}",
            swapchain.image_count(),
            extent.width,
            extent.height
        );

        Ok(Self {
            backend: ManuallyDrop::new(SwapchainBackend {
                frames,
                framebuffers,
                swapchain,
                render_pass: render_pass_handle,
                device: Arc::clone(&device),
            }),
            upload: ManuallyDrop::new(upload),
            descriptors: ManuallyDrop::new(descriptors),
            ctx: ManuallyDrop::new(ctx),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            instance: ManuallyDrop::new(instance),
            depth,
            render_pass: render_pass_handle,
            registry: Registry::new(),
            orchestrator: FrameOrchestrator::new(config.renderer.clear_flash),
            camera,
            policy: config.policy.on_gpu_error,
            shader_dir: config.renderer.shader_dir.clone(),
        })
    }

    // ========================================================================
    // Assets
    // ========================================================================

    /// Uploads a mesh and registers it under `name`.
    ///
    /// Duplicate names and empty meshes are returned as errors; only GPU
    /// failures go through the failure policy.
    pub fn upload_mesh(&mut self, name: &str, data: MeshData) -> RenderResult<MeshId> {
        let result = assets::upload_mesh(
            &mut self.ctx,
            &self.upload,
            &mut self.registry,
            name,
            data,
        );
        enforce_on_gpu_errors(self.policy, "mesh upload", result)
    }

    /// Uploads a texture with its mip chain and registers it under `name`.
    ///
    /// Like [`Engine::upload_mesh`], only GPU failures go through the
    /// failure policy.
    pub fn upload_texture(&mut self, name: &str, data: &ImageData) -> RenderResult<TextureId> {
        let result = assets::upload_texture(
            &mut self.ctx,
            &self.upload,
            &mut self.registry,
            name,
            data,
        );
        enforce_on_gpu_errors(self.policy, "texture upload", result)
    }

    /// Builds a material pipeline from [`MESH_VERTEX_SHADER`] and
    /// `fragment_shader` (both under the configured shader directory).
    ///
    /// With `texture`, the pipeline layout gets the texture set and the
    /// material a set bound to that texture.
    ///
    /// Returns `Ok(None)` if a shader cannot be loaded: the error is logged
    /// and the material is skipped.
    ///
    /// # Errors
    ///
    /// [`SceneError::Duplicate`] if `name` is taken,
    /// [`RenderError::NotFound`] for an unknown texture, or any Vulkan error.
    pub fn create_material(
        &mut self,
        name: &str,
        fragment_shader: &str,
        texture: Option<&str>,
    ) -> RenderResult<Option<MaterialId>> {
        let result = self.build_material(name, fragment_shader, texture);
        enforce_on_gpu_errors(self.policy, "material creation", result)
    }

    fn build_material(
        &mut self,
        name: &str,
        fragment_shader: &str,
        texture: Option<&str>,
    ) -> RenderResult<Option<MaterialId>> {
        if self.registry.material_id(name).is_some() {
            return Err(SceneError::Duplicate {
                kind: "material",
                name: name.to_owned(),
            }
            .into());
        }
        let texture = texture
            .map(|texture_name| {
                self.registry
                    .texture_by_name(texture_name)
                    .map(|t| (t.view, t.sampler))
                    .ok_or_else(|| RenderError::NotFound {
                        kind: "texture",
                        name: texture_name.to_owned(),
                    })
            })
            .transpose()?;

        let device = Arc::clone(&*self.device);
        let Some(vertex) = self.load_shader(MESH_VERTEX_SHADER, ShaderStage::Vertex) else {
            return Ok(None);
        };
        let Some(fragment) = self.load_shader(fragment_shader, ShaderStage::Fragment) else {
            return Ok(None);
        };

        let layout = PipelineLayout::new(
            Arc::clone(&device),
            &self.descriptors.material_layouts(texture.is_some()),
            &[mesh_push_constant_range()],
        )?;
        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex)
            .fragment_shader(&fragment)
            .render_pass(self.render_pass)
            .extent(self.backend.extent())
            .build(device, &layout)?;

        let texture_set = texture
            .map(|(view, sampler)| self.descriptors.allocate_texture_set(view, sampler))
            .transpose()?;

        let material = Material {
            name: name.to_owned(),
            pipeline: pipeline.handle(),
            layout: layout.handle(),
            texture_set,
        };
        self.ctx.defer(format!("material '{name}' layout"), layout);
        self.ctx.defer(format!("material '{name}' pipeline"), pipeline);

        let id = self.registry.insert_material(material)?;
        info!(
            "Material '{}' created ({}{})",
            name,
            fragment_shader,
            if texture_set.is_some() { ", textured" } else { "" }
        );
        Ok(Some(id))
    }

    fn load_shader(&self, file: &str, stage: ShaderStage) -> Option<Shader> {
        let path = self.shader_path(file);
        match Shader::from_spirv_file(Arc::clone(&*self.device), &path, stage) {
            Ok(shader) => Some(shader),
            Err(e) => {
                error!(
                    "Failed to load {} shader '{}': {}",
                    stage,
                    path.display(),
                    e
                );
                None
            }
        }
    }

    fn shader_path(&self, file: &str) -> PathBuf {
        self.shader_dir.join(file)
    }

    // ========================================================================
    // Frames
    // ========================================================================

    /// Renders one frame, optionally with an overlay on top.
    ///
    /// Failures go through the configured failure policy.
    pub fn draw(&mut self, overlay: Option<&mut dyn Overlay>) -> RenderResult<DrawStats> {
        let result =
            self.orchestrator
                .draw_frame(&mut *self.backend, &self.registry, &self.camera, overlay);
        self.policy.enforce("draw", result)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[inline]
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    #[inline]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    #[inline]
    pub fn orchestrator(&self) -> &FrameOrchestrator {
        &self.orchestrator
    }

    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.orchestrator.frame_number()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.backend.extent()
    }

    #[inline]
    pub fn depth_buffer(&self) -> &DepthBuffer {
        &self.depth
    }

    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    #[inline]
    pub fn shader_dir(&self) -> &Path {
        &self.shader_dir
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during engine drop: {:?}", e);
        }

        unsafe {
            ManuallyDrop::drop(&mut self.backend);
            ManuallyDrop::drop(&mut self.upload);
        }

        debug!("Flushing {} teardown action(s)", self.ctx.pending_teardown());
        self.ctx.flush();

        unsafe {
            ManuallyDrop::drop(&mut self.ctx);
            ManuallyDrop::drop(&mut self.descriptors);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Engine destroyed");
    }
}
