//! Lumen sample viewer.
//!
//! Opens a fixed-size window, builds the sample scene and renders it until
//! Escape is pressed or the window is closed.

mod scene;
mod stats;

use anyhow::Result;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event_loop::ControlFlow;
use winit::window::WindowId;

use lumen_core::{EngineConfig, FrameTimer};
use lumen_platform::{ActiveEventLoop, EventLoop, KeyCode, PhysicalKey, Window, WindowEvent};
use lumen_renderer::{Engine, Overlay};
use lumen_scene::MeshId;

use crate::stats::StatsOverlay;

const CONFIG_PATH: &str = "lumen.toml";

struct App {
    config: EngineConfig,
    // Dropped before the window it renders to.
    engine: Option<Engine>,
    window: Option<Window>,
    overlay: StatsOverlay,
    timer: FrameTimer,
    model: Option<MeshId>,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            engine: None,
            window: None,
            overlay: StatsOverlay::new(),
            timer: FrameTimer::new(),
            model: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, &self.config.window)?;
        let mut engine = Engine::new(&window, &self.config)?;
        self.model = scene::build(&mut engine, &self.config)?;

        info!("Initialization complete, entering main loop");
        self.engine = Some(engine);
        self.window = Some(window);
        Ok(())
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        if let Some(model) = self.model {
            let transform = scene::spin(self.timer.elapsed_secs());
            for object in engine.registry_mut().renderables_mut() {
                if object.mesh == model {
                    object.transform = transform;
                }
            }
        }

        if let Err(e) = engine.draw(Some(&mut self.overlay)) {
            error!("Stopping after draw failure: {}", e);
            event_loop.exit();
            return;
        }

        if let Some(fps) = self.timer.frame() {
            info!("{:.1} FPS (frame {})", fps, engine.frame_number());
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.start(event_loop) {
            error!("Failed to start: {:#}", e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if self.overlay.handle_event(&event) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    info!("Escape pressed, shutting down");
                    event_loop.exit();
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // The surface must go before the window.
        self.engine = None;
        self.window = None;
    }
}

fn main() -> Result<()> {
    let (config, source) = EngineConfig::load_or_default(CONFIG_PATH)?;
    lumen_core::init_logging(&config.logging.filter)?;
    info!("Starting lumen");
    source.report();

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
