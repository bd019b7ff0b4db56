//! Hairpeel - hair rendering demo with streamed textures

use std::path::PathBuf;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{DeviceEvent, DeviceId, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{CursorGrabMode, Fullscreen, Window, WindowId},
};

use hairpeel::asset::{build_materials, load_pending, scan_textures, AssetRegistry, TextureCategory};
use hairpeel::core::{
    camera::Camera,
    camera_controller::FlyController,
    config::AppConfig,
    input::InputState,
    logging,
    time::FrameTimer,
    Error, Result,
};
use hairpeel::render::{
    context::GpuContext,
    mesh::MeshLibrary,
    scene::Scene,
    shaders::{ShaderLibrary, ShaderRole},
    GpuTexture, Renderer, WgpuUploadBackend,
};
use hairpeel::streaming::{DecodeQueue, TextureStreamer};

/// Everything that needs a window and device
struct AppState {
    window: Arc<Window>,
    gpu: GpuContext,
    renderer: Renderer,
    streamer: TextureStreamer<WgpuUploadBackend>,
    registry: AssetRegistry<GpuTexture>,
    scene: Scene,
    decode: DecodeQueue,
}

impl AppState {
    fn new(event_loop: &ActiveEventLoop, config: &AppConfig) -> Result<Self> {
        let mut window_attrs = Window::default_attributes()
            .with_title(config.window.title.clone())
            .with_inner_size(PhysicalSize::new(config.window.width, config.window.height));
        if config.window.fullscreen {
            window_attrs = window_attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        let window = Arc::new(
            event_loop
                .create_window(window_attrs)
                .map_err(|e| Error::Window(e.to_string()))?,
        );

        let gpu = pollster::block_on(GpuContext::new(window.clone(), config.window.vsync))?;
        log::info!("GPU: {}", gpu.adapter.get_info().name);

        let shaders = ShaderLibrary::load(&config.assets.shader_dir);
        let backend = WgpuUploadBackend::new(
            gpu.device.clone(),
            gpu.queue.clone(),
            shaders.source(ShaderRole::Mipmap),
        );
        let mut streamer = TextureStreamer::new(backend, &config.streaming);

        let mut registry = AssetRegistry::new();
        let report = scan_textures(&config.assets.texture_root, &mut registry);
        log::info!(
            "Found {} textures under {}",
            report.registered.len(),
            config.assets.texture_root.display()
        );
        let summary = load_pending(&mut registry);
        log::info!(
            "Decoded {} textures ({} missing, {} failed)",
            summary.loaded,
            summary.missing,
            summary.failed
        );
        let fonts = streamer.bake_category_now(&mut registry, TextureCategory::Font);
        log::debug!("Baked {} font textures", fonts);
        let materials = build_materials(&mut registry);
        log::info!("Built {} materials", materials);

        let meshes = MeshLibrary::demo();
        let scene = Scene::demo(&meshes, &registry);
        let renderer = Renderer::new(&gpu, &meshes, shaders, config);
        let decode = DecodeQueue::new(config.streaming.decode_workers)?;

        Ok(Self {
            window,
            gpu,
            renderer,
            streamer,
            registry,
            scene,
            decode,
        })
    }

    /// Pick up textures added to the asset directories since startup
    fn rescan(&mut self, root: &std::path::Path) {
        let report = scan_textures(root, &mut self.registry);
        if report.registered.is_empty() {
            log::info!("Rescan found no new textures");
            return;
        }
        let submitted = self.decode.submit_pending(&mut self.registry);
        let materials = build_materials(&mut self.registry);
        self.streamer.reset_mipmap_flag();
        log::info!(
            "Rescan registered {} textures, {} queued for decode, {} materials",
            report.registered.len(),
            submitted,
            materials
        );
    }

    fn reload_shaders(&mut self) {
        match self.renderer.reload_shaders(&self.gpu.device) {
            Ok(()) => {
                let shaders = self.renderer.shaders();
                self.streamer
                    .backend_mut()
                    .rebuild_mipmap_pipeline(shaders.source(ShaderRole::Mipmap));
                log::info!(
                    "Reloaded shaders from {} (generation {})",
                    shaders.dir().display(),
                    shaders.generation()
                );
            }
            Err(e) => log::warn!("Shader reload failed, keeping current pipelines: {}", e),
        }
    }
}

struct App {
    config: AppConfig,
    state: Option<AppState>,
    camera: Camera,
    controller: FlyController,
    input: InputState,
    timer: FrameTimer,
    cursor_grabbed: bool,
}

impl App {
    fn new(config: AppConfig) -> Self {
        let aspect = config.window.width as f32 / config.window.height.max(1) as f32;
        Self {
            camera: Camera::from_config(&config.camera, aspect),
            controller: FlyController::new(config.camera.speed, config.camera.sensitivity),
            config,
            state: None,
            input: InputState::new(),
            timer: FrameTimer::new(),
            cursor_grabbed: false,
        }
    }

    fn toggle_cursor_grab(&mut self) {
        if let Some(state) = &self.state {
            let window = &state.window;
            self.cursor_grabbed = !self.cursor_grabbed;

            if self.cursor_grabbed {
                window
                    .set_cursor_grab(CursorGrabMode::Confined)
                    .or_else(|_| window.set_cursor_grab(CursorGrabMode::Locked))
                    .ok();
                window.set_cursor_visible(false);
            } else {
                window.set_cursor_grab(CursorGrabMode::None).ok();
                window.set_cursor_visible(true);
            }

            self.input.set_mouse_captured(self.cursor_grabbed);
        }
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, code: KeyCode) {
        match code {
            KeyCode::Escape => {
                if self.cursor_grabbed {
                    self.toggle_cursor_grab();
                } else {
                    event_loop.exit();
                }
            }
            KeyCode::Tab => self.toggle_cursor_grab(),
            _ => {}
        }

        let Some(state) = &mut self.state else {
            return;
        };
        match code {
            KeyCode::KeyE => {
                if state.renderer.peel_count_mut().increment() {
                    log::info!("Hair peel count: {}", state.renderer.peel_count().get());
                }
            }
            KeyCode::KeyQ => {
                if state.renderer.peel_count_mut().decrement() {
                    log::info!("Hair peel count: {}", state.renderer.peel_count().get());
                }
            }
            KeyCode::KeyH => state.reload_shaders(),
            KeyCode::KeyR => state.rescan(&self.config.assets.texture_root),
            KeyCode::KeyF => {
                let fullscreen = match state.window.fullscreen() {
                    Some(_) => None,
                    None => Some(Fullscreen::Borderless(None)),
                };
                state.window.set_fullscreen(fullscreen);
            }
            _ => {}
        }
    }

    fn frame(&mut self) {
        self.timer.tick();
        let dt = self.timer.delta_secs();
        self.controller.update(&mut self.camera, &self.input, dt);
        self.camera.update_water_state(self.config.water.height);

        let Some(state) = &mut self.state else {
            return;
        };

        let decoded = state.decode.apply(&mut state.registry);
        if decoded > 0 {
            log::debug!("Applied {} background decodes", decoded);
        }
        state.streamer.tick(&mut state.registry);
        state.streamer.generate_next_mipmap(&mut state.registry);
        state.streamer.loading_complete(&state.registry);

        let result = state.renderer.render(
            &state.gpu,
            &state.scene,
            &state.registry,
            &self.camera,
            self.timer.elapsed_secs(),
        );
        if let Err(e) = result {
            // Lost or outdated surface; reconfigure and try again next frame
            log::warn!("Frame skipped: {}", e);
            let (width, height) = state.gpu.size();
            state.gpu.resize(width, height);
        }

        state.window.set_title(&format!(
            "{} - {:.1} FPS | peels {} | E/Q=peels, H=reload shaders, R=rescan, F=fullscreen, Tab=mouse",
            self.config.window.title,
            self.timer.fps(),
            state.renderer.peel_count().get()
        ));
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        match AppState::new(event_loop, &self.config) {
            Ok(state) => {
                let size = state.window.inner_size();
                self.camera.set_aspect(size.width as f32, size.height as f32);
                log::info!("Window created: {}x{}", size.width, size.height);
                self.state = Some(state);
            }
            Err(e) => {
                log::error!("Startup failed: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        self.input.process_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if size.width > 0 && size.height > 0 {
                    if let Some(state) = &mut self.state {
                        state.gpu.resize(size.width, size.height);
                        state.renderer.resize(&state.gpu.device, size.width, size.height);
                        self.camera.set_aspect(size.width as f32, size.height as f32);
                    }
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() && !event.repeat {
                    if let PhysicalKey::Code(code) = event.physical_key {
                        self.handle_key(event_loop, code);
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if state.is_pressed() && button == winit::event::MouseButton::Left && !self.cursor_grabbed {
                    self.toggle_cursor_grab();
                }
            }
            WindowEvent::RedrawRequested => {
                self.frame();
                self.input.end_frame();
                if let Some(state) = &self.state {
                    state.window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.input.process_mouse_motion(delta);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }
}

fn main() {
    logging::init();
    log::info!("Hairpeel starting...");

    let args: Vec<String> = std::env::args().collect();
    let mut config = match parse_path_arg(&args, "--config", "-c") {
        Some(path) => match AppConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("Failed to load config {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => AppConfig::default(),
    };
    if let Some(root) = parse_path_arg(&args, "--assets", "-a") {
        log::info!("Asset root: {}", root.display());
        config.assets.texture_root = root;
    }

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let mut app = App::new(config);

    event_loop.run_app(&mut app).expect("Event loop error");
}

/// Value following `long` or `short` on the command line
fn parse_path_arg(args: &[String], long: &str, short: &str) -> Option<PathBuf> {
    args.iter()
        .position(|a| a == long || a == short)
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}
