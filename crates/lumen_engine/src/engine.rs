//! The engine: startup, the frame loop and teardown
//!
//! [`Engine`] owns everything the loop drives. Hooks, bindings and scene entities get
//! an [`EngineContext`], the part of the engine that is safe to reach from a callback:
//! the window, the backend, the scene root, settings, resources and the optional
//! audio and physics collaborators. Every accessor for a singleton that might not
//! exist yet logs a warning and returns `None` instead of panicking.

use thiserror::Error;

use crate::audio::SoundManager;
use crate::config::{BackendKind, ConfigError, EngineConfig};
use crate::event::EventQueue;
use crate::foundation::logging::{self, ConsoleBuffer, DEFAULT_CONSOLE_CAPACITY};
use crate::foundation::math::ColorRgba;
use crate::foundation::time::{Clock, FrameTiming, MonotonicClock};
use crate::input::{ButtonPhase, InputRouter, Key, Keybind, Mousebind};
use crate::lifecycle::LifecycleHooks;
use crate::physics::PhysicsProvider;
use crate::presence::RichPresence;
use crate::render::ubo::{UBO_PV_BINDING, UBO_PV_NAME};
use crate::render::{
    BuiltinShader, ClearFlags, HeadlessBackend, OpenGlBackend, RenderBackend, RenderError, RenderSurface,
    ShaderHandle, TextureDescriptor, TextureHandle, UboPv, UniformBufferHandle, VulkanBackend,
};
use crate::resource::{
    FilesystemProvider, InternetProvider, PrimitiveMeshLoader, ResourceCache, ResourceId, TextureResource,
};
use crate::scene::{Camera, ConsoleEntity, EntityId, FrameContext, ProfilerEntity, SceneRoot};
use crate::script::ScriptProvider;
use crate::settings::{
    SettingType, SettingsError, SettingsStore, DEFAULT_MAX_DIRECTIONAL_LIGHTS, DEFAULT_MAX_POINT_LIGHTS,
    DEFAULT_MAX_SPOT_LIGHTS, DEFAULT_PHYSICS_SUB_STEPS, DEFAULT_WINDOW_HEIGHT, DEFAULT_WINDOW_WIDTH,
};
use crate::window::{
    self, ContextApi, GlfwPlatform, HeadlessPlatform, Platform, PlatformEvent, Viewport, WindowDescriptor,
    WindowError, WindowHandle, WindowId, WindowManager,
};

#[cfg(feature = "audio")]
use crate::audio::RodioSoundManager;
#[cfg(feature = "physics")]
use crate::physics::RapierPhysicsProvider;

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Window or platform failure
    #[error(transparent)]
    Window(#[from] WindowError),

    /// Render backend failure
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Settings could not be read or written
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Configuration file error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An operation that needs a started engine was called before `init`
    #[error("Engine is not initialized")]
    NotInitialized,
}

/// Device objects every frame relies on
#[derive(Debug, Clone, Copy)]
struct BuiltinResources {
    ubo_pv: UniformBufferHandle,
    basic_shader: ShaderHandle,
    white_texture: TextureHandle,
}

/// Engine state reachable from hooks, bindings and entities
///
/// Fields are declared in teardown order for the case where the engine is dropped
/// without `stop`: device objects go before the windows whose contexts own them, and
/// windows go before the platform.
pub struct EngineContext {
    scene: Option<SceneRoot>,
    console_entity: Option<EntityId>,
    sound: Option<Box<dyn SoundManager>>,
    physics: Option<Box<dyn PhysicsProvider>>,
    backend: Option<Box<dyn RenderBackend>>,
    window: Option<WindowHandle>,
    windows: WindowManager,
    platform: Option<Box<dyn Platform>>,
    settings: Option<SettingsStore>,
    resources: ResourceCache,
    events: EventQueue,
    clock: Box<dyn Clock>,
    timing: FrameTiming,
    console: ConsoleBuffer,
    builtins: Option<BuiltinResources>,
    title: String,
    backend_kind: BackendKind,
    language: String,
    clear_color: ColorRgba,
    started: bool,
    frame_open: bool,
    cursor_reset: bool,
}

fn missing<T>(what: &str) -> Option<T> {
    log::warn!("{what} requested before the engine created it");
    None
}

impl EngineContext {
    fn new(title: String, backend_kind: BackendKind, clock: Box<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            scene: None,
            console_entity: None,
            sound: None,
            physics: None,
            backend: None,
            window: None,
            windows: WindowManager::new(),
            platform: None,
            settings: None,
            resources: ResourceCache::new(),
            events: EventQueue::new(),
            clock,
            timing: FrameTiming::starting_at(now),
            console: ConsoleBuffer::new(DEFAULT_CONSOLE_CAPACITY),
            builtins: None,
            title,
            backend_kind,
            language: String::new(),
            clear_color: ColorRgba::BLACK,
            started: false,
            frame_open: false,
            cursor_reset: false,
        }
    }

    /// Whether `init` has completed and `stop` has not run yet
    pub const fn is_started(&self) -> bool {
        self.started
    }

    /// Persistent settings
    pub fn settings(&self) -> Option<&SettingsStore> {
        match &self.settings {
            Some(settings) => Some(settings),
            None => missing("Settings"),
        }
    }

    /// Persistent settings, mutably
    pub fn settings_mut(&mut self) -> Option<&mut SettingsStore> {
        match &mut self.settings {
            Some(settings) => Some(settings),
            None => missing("Settings"),
        }
    }

    fn setting<T: SettingType>(&self, category: &str, key: &str, fallback: T) -> T {
        match &self.settings {
            Some(settings) => settings.get_or(category, key, fallback),
            None => fallback,
        }
    }

    /// The resource cache
    pub const fn resources(&self) -> &ResourceCache {
        &self.resources
    }

    /// The resource cache, mutably
    pub fn resources_mut(&mut self) -> &mut ResourceCache {
        &mut self.resources
    }

    /// The primary window
    pub fn window(&self) -> Option<&WindowHandle> {
        match &self.window {
            Some(window) => Some(window),
            None => missing("Primary window"),
        }
    }

    /// The primary window, mutably
    pub fn window_mut(&mut self) -> Option<&mut WindowHandle> {
        match &mut self.window {
            Some(window) => Some(window),
            None => missing("Primary window"),
        }
    }

    /// Secondary windows
    pub const fn windows(&self) -> &WindowManager {
        &self.windows
    }

    /// The render backend
    pub fn backend_mut(&mut self) -> Option<&mut dyn RenderBackend> {
        match self.backend.as_deref_mut() {
            Some(backend) => Some(backend),
            None => missing("Render backend"),
        }
    }

    /// The scene root
    pub fn root(&self) -> Option<&SceneRoot> {
        match &self.scene {
            Some(scene) => Some(scene),
            None => missing("Scene root"),
        }
    }

    /// The scene root, mutably
    pub fn root_mut(&mut self) -> Option<&mut SceneRoot> {
        match &mut self.scene {
            Some(scene) => Some(scene),
            None => missing("Scene root"),
        }
    }

    /// Scene root and backend together, for adding or removing GPU-backed entities
    pub fn root_and_backend_mut(&mut self) -> Option<(&mut SceneRoot, &mut dyn RenderBackend)> {
        match (&mut self.scene, self.backend.as_deref_mut()) {
            (Some(scene), Some(backend)) => {
                let backend: &mut dyn RenderBackend = backend;
                Some((scene, backend))
            }
            _ => missing("Scene root or render backend"),
        }
    }

    /// The sound manager; `None` when audio is disabled or failed to start
    pub fn sound_manager_mut(&mut self) -> Option<&mut dyn SoundManager> {
        match self.sound.as_deref_mut() {
            Some(sound) => Some(sound),
            None => missing("Sound manager"),
        }
    }

    /// The physics provider; `None` when physics is disabled
    pub fn physics_provider_mut(&mut self) -> Option<&mut dyn PhysicsProvider> {
        match self.physics.as_deref_mut() {
            Some(physics) => Some(physics),
            None => missing("Physics provider"),
        }
    }

    /// The engine event queue
    pub fn events_mut(&mut self) -> &mut EventQueue {
        &mut self.events
    }

    /// Frame timing as of the last sample
    pub const fn timing(&self) -> &FrameTiming {
        &self.timing
    }

    /// Seconds between the last two samples
    pub fn delta(&self) -> f64 {
        self.timing.delta()
    }

    /// Log lines captured for the console
    pub const fn console(&self) -> &ConsoleBuffer {
        &self.console
    }

    /// UI language tag from settings
    pub fn language(&self) -> &str {
        &self.language
    }

    /// The primary window's UI context
    pub fn ui_context(&self) -> Option<&egui::Context> {
        self.window().map(|window| window.ui().context())
    }

    /// Shader every [`crate::scene::MeshEntity`] can draw with
    pub fn basic_shader(&self) -> Option<ShaderHandle> {
        match self.builtins {
            Some(builtins) => Some(builtins.basic_shader),
            None => missing("Basic shader"),
        }
    }

    /// One opaque white texel
    pub fn white_texture(&self) -> Option<TextureHandle> {
        match self.builtins {
            Some(builtins) => Some(builtins.white_texture),
            None => missing("White texture"),
        }
    }

    /// Set the color frames are cleared to
    ///
    /// The backend premultiplies it by alpha.
    pub fn set_clear_color(&mut self, color: ColorRgba) {
        self.clear_color = color;
        if let Some(backend) = self.backend.as_deref_mut() {
            backend.set_clear_color(self.clear_color);
        }
    }

    /// Lock the cursor to the primary window, or release it
    ///
    /// The next cursor sample after a change reseeds mouse deltas so the switch does
    /// not register as a jump.
    pub fn capture_mouse(&mut self, capture: bool) {
        let Some(window) = self.window_mut() else {
            return;
        };
        window.set_mouse_captured(capture);
        self.cursor_reset = true;
    }

    /// Whether the cursor is locked to the primary window
    pub fn is_mouse_captured(&self) -> bool {
        self.window.as_ref().is_some_and(WindowHandle::is_mouse_captured)
    }

    /// Set the primary window icon from an image resource
    ///
    /// A bare path is read through the `file` provider.
    ///
    /// # Panics
    ///
    /// Panics when the engine is not started or the image cannot be loaded.
    #[track_caller]
    pub fn set_icon(&mut self, path: &str) {
        assert!(self.started, "Engine must be initialized before setting the window icon");
        let icon = self.load_icon(path);
        assert!(icon.is_some(), "Window icon {path} has no image data");
        if let (Some(icon), Some(window)) = (icon, self.window.as_mut()) {
            window.platform_mut().set_icon(icon.width, icon.height, &icon.data);
        }
    }

    fn load_icon(&self, path: &str) -> Option<TextureResource> {
        let identifier = if path.contains(ResourceId::SEPARATOR) {
            path.to_string()
        } else {
            format!("{}{}{path}", FilesystemProvider::SCHEME, ResourceId::SEPARATOR)
        };
        self.resources
            .get_unique_uncached::<TextureResource>(&identifier)
            .filter(|icon| !icon.is_empty())
    }

    /// Show or hide the log console
    pub fn toggle_console(&mut self) {
        let (Some(scene), Some(id)) = (self.scene.as_mut(), self.console_entity) else {
            return;
        };
        if let Some(console) = scene.get_mut::<ConsoleEntity>(id) {
            console.toggle();
        }
    }

    /// Open a secondary window sharing the primary window's context
    ///
    /// The descriptor's context API is overridden to what the active backend needs.
    pub fn create_window(&mut self, desc: &WindowDescriptor, viewport: Viewport) -> Option<WindowId> {
        let (Some(platform), Some(backend)) = (self.platform.as_deref_mut(), self.backend.as_deref_mut()) else {
            return missing("Platform");
        };
        let desc = desc.clone().with_api(context_api(self.backend_kind));
        let share = self.window.as_ref().map(WindowHandle::platform);
        self.windows.create_window(platform, share, backend, &desc, viewport)
    }

    /// Close a secondary window at the next refresh
    pub fn destroy_window(&mut self, id: WindowId) -> bool {
        self.windows.queue_destroy(id)
    }

    /// Secondary window at `id`, mutably
    pub fn window_at_mut(&mut self, id: WindowId) -> Option<&mut WindowHandle> {
        self.windows.get_mut(id)
    }

    /// Close every window; the frame loop ends after the current frame
    pub fn quit(&mut self) {
        log::info!("Quit requested");
        if let Some(window) = self.window.as_mut() {
            window.platform_mut().set_should_close(true);
        }
        self.windows.queue_destroy_all();
    }

    /// Whether the frame loop should end
    pub fn should_close(&self) -> bool {
        self.window.as_ref().map_or(true, |window| window.platform().should_close())
    }

    /// Show a native error dialog titled after the application
    pub fn popup_error(&self, message: &str) {
        window::popup_error(&self.title, message);
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("started", &self.started)
            .field("backend", &self.backend.as_ref().map(|backend| backend.name()))
            .field("window", &self.window)
            .field("windows", &self.windows)
            .field("audio", &self.sound.is_some())
            .field("physics", &self.physics.is_some())
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

/// Main engine struct
///
/// Owns the context, the lifecycle hooks, the input router and the external
/// collaborators. A typical application registers hooks and bindings, then calls
/// [`Engine::init_or_exit`] and [`Engine::run`].
pub struct Engine {
    /// State reachable from callbacks
    context: EngineContext,

    /// Init, render and stop hooks
    hooks: LifecycleHooks<EngineContext>,

    /// Key and mouse bindings
    input: InputRouter<EngineContext>,

    /// Scripting runtime, if any
    script: Option<Box<dyn ScriptProvider>>,

    /// Rich presence integration, if any
    presence: Option<Box<dyn RichPresence>>,

    /// Startup configuration
    config: EngineConfig,
}

impl Engine {
    /// Engine measuring time with the monotonic clock
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, MonotonicClock::new())
    }

    /// Engine measuring time with `clock`
    pub fn with_clock(config: EngineConfig, clock: impl Clock + 'static) -> Self {
        Self {
            context: EngineContext::new(config.title.clone(), config.backend, Box::new(clock)),
            hooks: LifecycleHooks::default(),
            input: InputRouter::new(),
            script: None,
            presence: None,
            config,
        }
    }

    /// State reachable from callbacks
    pub const fn context(&self) -> &EngineContext {
        &self.context
    }

    /// State reachable from callbacks, mutably
    pub fn context_mut(&mut self) -> &mut EngineContext {
        &mut self.context
    }

    /// Startup configuration
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Install the scripting runtime
    pub fn set_script_provider(&mut self, script: impl ScriptProvider + 'static) {
        self.script = Some(Box::new(script));
    }

    /// Install the rich presence integration
    pub fn set_rich_presence(&mut self, presence: impl RichPresence + 'static) {
        self.presence = Some(Box::new(presence));
    }

    /// Use `sound` instead of the default sound manager; must be called before `init`
    pub fn set_sound_manager(&mut self, sound: impl SoundManager + 'static) {
        self.context.sound = Some(Box::new(sound));
    }

    /// Use `physics` instead of the default provider; must be called before `init`
    pub fn set_physics_provider(&mut self, physics: impl PhysicsProvider + 'static) {
        self.context.physics = Some(Box::new(physics));
    }

    /// Run `hook` at the end of `init`
    pub fn add_init_function(&mut self, hook: impl FnMut(&mut EngineContext) + 'static) {
        if self.context.started {
            log::warn!("Init hook added after init; it will never run");
        }
        self.hooks.init.add(hook);
    }

    /// Run `hook` every frame before scripts and the scene render
    pub fn add_render_function(&mut self, hook: impl FnMut(&mut EngineContext) + 'static) {
        self.hooks.render.add(hook);
    }

    /// Run `hook` first thing in `stop`
    pub fn add_stop_function(&mut self, hook: impl FnMut(&mut EngineContext) + 'static) {
        self.hooks.stop.add(hook);
    }

    /// Register a key or mouse button binding
    pub fn add_keybind(&mut self, keybind: Keybind<EngineContext>) {
        self.input.add_keybind(keybind);
    }

    /// Register a cursor or scroll binding
    pub fn add_mousebind(&mut self, mousebind: Mousebind<EngineContext>) {
        self.input.add_mousebind(mousebind);
    }

    /// Load settings, start logging and register resource providers
    ///
    /// Called by `init` when it has not been called already. Settings problems are
    /// logged and the engine carries on with defaults.
    pub fn pre_init(&mut self) {
        let mut settings = SettingsStore::new(&self.config.settings_path);
        let loaded = if self.config.apply_setting_defaults {
            settings.apply_engine_defaults()
        } else {
            settings.declare_engine_defaults();
            settings.load()
        };

        let colored = settings.get_or("engine", "consoleColoredText", true);
        self.context.console = logging::init_with_capacity(colored, self.config.console_capacity);
        if let Err(e) = loaded {
            log::error!("Could not read settings from {}: {e}", self.config.settings_path.display());
        }

        let resources = &mut self.context.resources;
        resources.add_provider(FilesystemProvider::new(&self.config.resource_root));
        resources.add_provider(InternetProvider::new("http", 80));
        resources.add_provider(InternetProvider::new("https", 443));

        self.context.language = settings.get_or("ui", "language", "en".to_string());
        log::info!("UI language: {}", self.context.language);
        self.context.settings = Some(settings);
    }

    /// Bring the engine up on the platform the configured backend needs
    pub fn init(&mut self) -> Result<(), EngineError> {
        let platform: Box<dyn Platform> = match self.config.backend {
            BackendKind::Headless => Box::new(HeadlessPlatform::new()),
            BackendKind::OpenGl | BackendKind::Vulkan => Box::new(GlfwPlatform::new()?),
        };
        self.init_with_platform(platform)
    }

    /// `init`, reporting failure to the user and exiting the process
    pub fn init_or_exit(&mut self) {
        if let Err(e) = self.init() {
            log::error!("Engine initialization failed: {e}");
            if !cfg!(debug_assertions) {
                self.context.popup_error(&e.to_string());
            }
            std::process::exit(1);
        }
    }

    /// Bring the engine up on `platform`
    ///
    /// # Panics
    ///
    /// Panics when the engine is already started.
    pub fn init_with_platform(&mut self, mut platform: Box<dyn Platform>) -> Result<(), EngineError> {
        assert!(!self.context.started, "Engine initialized twice");
        if self.context.settings.is_none() {
            self.pre_init();
        }
        log::info!("Initializing {} on {}", self.config.title, platform.name());

        let ctx = &mut self.context;
        let width = u32::try_from(ctx.setting("graphics", "windowWidth", DEFAULT_WINDOW_WIDTH)).unwrap_or(1);
        let height = u32::try_from(ctx.setting("graphics", "windowHeight", DEFAULT_WINDOW_HEIGHT)).unwrap_or(1);
        let mut desc = WindowDescriptor::new(&self.config.title, width.max(1), height.max(1));
        desc.fullscreen = ctx.setting("graphics", "fullscreen", false);
        desc.maximized = ctx.setting("graphics", "startMaximized", false);
        desc.api = context_api(self.config.backend);

        let mut native = platform.create_window(&desc, None)?;
        let mut backend: Box<dyn RenderBackend> = match self.config.backend {
            BackendKind::OpenGl => Box::new(OpenGlBackend::new(native.as_surface_mut(), cfg!(debug_assertions))?),
            BackendKind::Vulkan => Box::new(VulkanBackend::new(
                native.as_surface_mut(),
                &self.config.title,
                cfg!(debug_assertions),
            )?),
            BackendKind::Headless => Box::new(HeadlessBackend::new()),
        };
        log::info!("Render backend: {}", backend.capabilities());
        let window = WindowHandle::new(native, backend.as_mut(), Viewport::Scene)?;

        ctx.platform = Some(platform);
        ctx.backend = Some(backend);
        ctx.window = Some(window);
        ctx.set_clear_color(ctx.clear_color);
        ctx.resources.add_mesh_loader(PrimitiveMeshLoader::NAME, PrimitiveMeshLoader);

        self.apply_configured_icon();
        self.render_splash()?;
        self.context.resources.cleanup();

        let ctx = &mut self.context;
        let vsync = ctx.setting("graphics", "vsync", true);
        let raw_motion = ctx.setting("input", "rawMouseMotion", true);
        let invert_y = ctx.setting("input", "invertYAxis", false);
        if let Some(platform) = ctx.platform.as_deref_mut() {
            platform.set_swap_interval(vsync);
            let raw_motion = raw_motion && platform.supports_raw_motion();
            if let Some(window) = ctx.window.as_mut() {
                window.platform_mut().set_input_modes(true, raw_motion);
            }
        }
        self.input.set_invert_y(invert_y);

        self.init_audio();
        self.publish_light_defines();
        self.init_physics();
        if let Some(script) = &mut self.script {
            script.init_provider();
        }
        self.create_builtins();
        self.create_scene();

        self.context.timing.reset(self.context.clock.now());
        self.context.started = true;
        self.hooks.init.run(&mut self.context);
        if let Some(script) = &mut self.script {
            script.init_scripts();
        }
        log::info!("Engine initialized");
        Ok(())
    }

    fn apply_configured_icon(&mut self) {
        let ctx = &mut self.context;
        let path = ctx.setting("engine", "iconPath", String::new());
        if path.is_empty() {
            log::warn!("No window icon configured");
            return;
        }
        match ctx.load_icon(&path) {
            Some(icon) => {
                if let Some(window) = ctx.window.as_mut() {
                    window.platform_mut().set_icon(icon.width, icon.height, &icon.data);
                }
            }
            None => log::warn!("Window icon {path} could not be loaded"),
        }
    }

    fn render_splash(&mut self) -> Result<(), EngineError> {
        let splash = self
            .config
            .splash_image
            .as_deref()
            .filter(|id| self.context.resources.has_resource(id))
            .and_then(|id| self.context.resources.get_unique_uncached::<TextureResource>(id))
            .filter(|image| !image.is_empty());

        let ctx = &mut self.context;
        let (Some(backend), Some(window)) = (ctx.backend.as_deref_mut(), ctx.window.as_mut()) else {
            return Ok(());
        };
        match window.begin_frame(backend) {
            Ok(()) => {}
            Err(RenderError::SurfaceUnavailable) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        backend.clear(ClearFlags::COLOR | ClearFlags::DEPTH);
        window.begin_ui(ctx.clock.now());
        if let Some(image) = splash {
            let egui_ctx = window.ui().context();
            let size = [image.width as usize, image.height as usize];
            let texture = egui_ctx.load_texture(
                "splash",
                egui::ColorImage::from_rgba_unmultiplied(size, &image.data),
                egui::TextureOptions::LINEAR,
            );
            egui::CentralPanel::default()
                .frame(egui::Frame::none())
                .show(egui_ctx, |ui| {
                    ui.centered_and_justified(|ui| {
                        ui.add(egui::Image::new(egui::load::SizedTexture::from_handle(&texture)).shrink_to_fit());
                    });
                });
        }
        let frame = window.end_ui();
        window.paint_ui(backend, &frame);
        window.end_frame(backend)?;
        Ok(())
    }

    fn init_audio(&mut self) {
        if !self.context.setting("audio", "enabled", true) {
            log::info!("Audio disabled in settings");
            self.context.sound = None;
            return;
        }
        let Some(mut sound) = self.context.sound.take().or_else(default_sound_manager) else {
            return;
        };
        match sound.init() {
            Ok(()) => self.context.sound = Some(sound),
            Err(e) => log::error!("Audio unavailable: {e}"),
        }
    }

    fn publish_light_defines(&mut self) {
        let ctx = &mut self.context;
        let counts = [
            ("MAX_POINT_LIGHTS", ctx.setting("engine", "maxPointLights", DEFAULT_MAX_POINT_LIGHTS)),
            (
                "MAX_DIRECTIONAL_LIGHTS",
                ctx.setting("engine", "maxDirectionalLights", DEFAULT_MAX_DIRECTIONAL_LIGHTS),
            ),
            ("MAX_SPOT_LIGHTS", ctx.setting("engine", "maxSpotLights", DEFAULT_MAX_SPOT_LIGHTS)),
        ];
        let Some(backend) = ctx.backend.as_deref_mut() else {
            return;
        };
        let defines = backend.shader_defines_mut();
        for (name, count) in counts {
            defines.set(name, count);
        }
    }

    fn init_physics(&mut self) {
        if !self.context.setting("physics", "enabled", true) {
            log::info!("Physics disabled in settings");
            self.context.physics = None;
            return;
        }
        if self.context.physics.is_some() {
            return;
        }
        let sub_steps = u32::try_from(self.context.setting("physics", "subStep", DEFAULT_PHYSICS_SUB_STEPS))
            .unwrap_or(1)
            .max(1);
        self.context.physics = default_physics_provider(sub_steps);
    }

    fn create_builtins(&mut self) {
        let Some(backend) = self.context.backend.as_deref_mut() else {
            return;
        };
        let basic_shader = match BuiltinShader::Basic.source(backend.shader_form()) {
            Some(source) => backend.create_shader(&source),
            None => ShaderHandle::default(),
        };
        let ubo_pv = backend.create_uniform_buffer(UboPv::SIZE, UBO_PV_BINDING);
        if basic_shader.is_valid() {
            backend.bind_uniform_buffer(basic_shader, ubo_pv, UBO_PV_NAME);
        } else {
            log::error!("Basic shader unavailable on {}", backend.name());
        }
        let white: &[u8] = &[255; 4];
        let white_texture = backend.create_texture(&TextureDescriptor::new(1, 1), white);
        self.context.builtins = Some(BuiltinResources {
            ubo_pv,
            basic_shader,
            white_texture,
        });
    }

    fn create_scene(&mut self) {
        let ctx = &mut self.context;
        let mut camera = Camera::default();
        if let Some(window) = &ctx.window {
            let (width, height) = window.platform().framebuffer_size();
            camera.create_projection(width, height);
        }
        let mut scene = SceneRoot::new(camera);
        ctx.console_entity = Some(scene.add_child(None, ConsoleEntity::new(ctx.console.clone())));
        if cfg!(debug_assertions) {
            scene.add_child(None, ProfilerEntity::new());
            self.input.add_keybind(Keybind::new(Key::F3, ButtonPhase::Pressed, |ctx: &mut EngineContext| {
                let Some(scene) = ctx.scene.as_mut() else {
                    return;
                };
                if let Some(id) = scene.find::<ProfilerEntity>() {
                    if let Some(profiler) = scene.get_mut::<ProfilerEntity>(id) {
                        profiler.toggle();
                    }
                }
            }));
        }
        ctx.scene = Some(scene);
        self.input
            .add_keybind(Keybind::new(Key::GraveAccent, ButtonPhase::Pressed, EngineContext::toggle_console));
    }

    /// Run frames until the primary window closes, then stop
    pub fn run(&mut self) -> Result<(), EngineError> {
        if !self.context.started {
            return Err(EngineError::NotInitialized);
        }
        log::info!("Starting main loop");
        let now = self.context.clock.now();
        self.context.timing.record(now);

        let mut result = Ok(());
        while !self.context.should_close() {
            if let Err(e) = self.frame() {
                log::error!("Frame failed: {e}");
                result = Err(e);
                break;
            }
        }
        self.stop();
        result
    }

    /// One iteration of the frame loop
    pub fn frame(&mut self) -> Result<(), EngineError> {
        self.step_physics();
        self.render()?;
        self.update_audio();
        self.present()?;
        self.poll_input();

        let ctx = &mut self.context;
        if let Some(backend) = ctx.backend.as_deref_mut() {
            ctx.windows.refresh(backend, ctx.timing.current());
        }
        if let Some(presence) = &mut self.presence {
            if presence.initialized() {
                presence.update_presence();
            }
        }
        let ctx = &mut self.context;
        ctx.events.update(ctx.timing.current());
        ctx.resources.cleanup();
        Ok(())
    }

    /// Advance physics by the previous frame's delta; only [`Engine::render`] samples
    /// the clock
    fn step_physics(&mut self) {
        let ctx = &mut self.context;
        let delta = ctx.timing.delta();
        if let Some(physics) = ctx.physics.as_deref_mut() {
            physics.update_physics(delta);
        }
    }

    /// Draw the primary window: clear, upload the camera, run render hooks and
    /// scripts, draw the scene and the UI
    ///
    /// The frame is left open for presentation. A minimized window skips everything
    /// after the time sample.
    pub fn render(&mut self) -> Result<(), EngineError> {
        let ctx = &mut self.context;
        let (Some(backend), Some(window)) = (ctx.backend.as_deref_mut(), ctx.window.as_mut()) else {
            return Err(EngineError::NotInitialized);
        };
        ctx.frame_open = window.is_drawable()
            && match window.begin_frame(backend) {
                Ok(()) => true,
                Err(RenderError::SurfaceUnavailable) => false,
                Err(e) => return Err(e.into()),
            };
        if ctx.frame_open {
            backend.clear(ClearFlags::COLOR | ClearFlags::DEPTH);
        }
        let delta = ctx.timing.sample(&*ctx.clock);
        if !ctx.frame_open {
            return Ok(());
        }

        if let Some(builtins) = ctx.builtins {
            let camera = match (window.viewport(), &ctx.scene) {
                (Viewport::Owned(camera), _) => Some(camera),
                (Viewport::Scene, Some(scene)) => Some(scene.main_camera()),
                (Viewport::Scene, None) => None,
            };
            if let Some(camera) = camera {
                let pv = UboPv::new(&camera.projection(), &camera.view());
                backend.update_uniform_buffer(builtins.ubo_pv, 0, pv.as_bytes());
            }
        }
        window.begin_ui(ctx.timing.current());

        self.hooks.render.run(&mut self.context);
        if let Some(script) = &mut self.script {
            script.render(delta);
        }

        let ctx = &mut self.context;
        let (Some(backend), Some(window)) = (ctx.backend.as_deref_mut(), ctx.window.as_mut()) else {
            return Err(EngineError::NotInitialized);
        };
        if let Some(scene) = ctx.scene.as_mut() {
            scene.render(&mut FrameContext {
                backend: &mut *backend,
                ui: window.ui().context(),
                delta,
            });
        }
        let frame = window.end_ui();
        window.paint_ui(backend, &frame);
        Ok(())
    }

    fn update_audio(&mut self) {
        let ctx = &mut self.context;
        let Some(sound) = ctx.sound.as_deref_mut() else {
            return;
        };
        if let Some(scene) = &ctx.scene {
            sound.set_listener_position(scene.audio_listening_position());
            sound.set_listener_rotation(scene.audio_listening_rotation(), scene.audio_listening_up());
        }
        sound.update();
    }

    fn present(&mut self) -> Result<(), EngineError> {
        let ctx = &mut self.context;
        if !std::mem::take(&mut ctx.frame_open) {
            return Ok(());
        }
        if let (Some(backend), Some(window)) = (ctx.backend.as_deref_mut(), ctx.window.as_mut()) {
            window.end_frame(backend)?;
        }
        Ok(())
    }

    fn poll_input(&mut self) {
        let ctx = &mut self.context;
        if let Some(platform) = ctx.platform.as_deref_mut() {
            platform.poll_events();
        }
        let events = match (ctx.window.as_mut(), ctx.backend.as_deref_mut()) {
            (Some(window), Some(backend)) => window.drain_events(backend),
            _ => Vec::new(),
        };
        if std::mem::take(&mut ctx.cursor_reset) {
            self.input.reset_cursor();
        }
        for event in events {
            self.handle_event(event);
        }

        self.input.dispatch_repeating(&mut self.context, |ctx| {
            ctx.window.as_ref().map(|window| window.platform().as_input())
        });
    }

    fn handle_event(&mut self, event: PlatformEvent) {
        let ctx = &mut self.context;
        match event {
            PlatformEvent::Key(key, phase) => self.input.on_key(key, phase, ctx),
            PlatformEvent::MouseButton(button, phase) => self.input.on_mouse_button(button, phase, ctx),
            PlatformEvent::CursorMoved(x, y) => {
                self.input.on_cursor_moved(x, y, ctx);
            }
            PlatformEvent::Scroll(dx, dy) => self.input.on_scroll(dx, dy, ctx),
            PlatformEvent::FramebufferResized(width, height) => {
                if let Some(scene) = ctx.scene.as_mut() {
                    scene.main_camera_mut().create_projection(width, height);
                }
            }
            PlatformEvent::Iconified(iconified) => {
                log::debug!("Primary window {}", if iconified { "minimized" } else { "restored" });
            }
            PlatformEvent::Focused(_) | PlatformEvent::Char(_) | PlatformEvent::CloseRequested => {}
        }
    }

    /// Tear everything down in reverse dependency order
    ///
    /// Safe to call on an engine that never started.
    pub fn stop(&mut self) {
        if !self.context.started {
            log::warn!("Engine stop requested before init");
            return;
        }
        log::info!("Stopping engine");
        self.hooks.stop.run(&mut self.context);
        if let Some(script) = &mut self.script {
            script.stop();
        }
        if let Some(presence) = &mut self.presence {
            if presence.initialized() {
                presence.shutdown();
            }
        }

        let ctx = &mut self.context;
        if let Some(mut sound) = ctx.sound.take() {
            sound.stop();
        }
        if let Some(mut scene) = ctx.scene.take() {
            if let Some(backend) = ctx.backend.as_deref_mut() {
                scene.release_all(backend);
            }
        }
        ctx.console_entity = None;
        if let Some(mut physics) = ctx.physics.take() {
            physics.stop();
        }
        ctx.resources.discard_all();

        let native = match ctx.backend.as_deref_mut() {
            Some(backend) => {
                ctx.windows.destroy_all(backend);
                if let Some(builtins) = ctx.builtins.take() {
                    backend.destroy_shader(builtins.basic_shader);
                    backend.destroy_uniform_buffer(builtins.ubo_pv);
                    backend.destroy_texture(builtins.white_texture);
                }
                ctx.window.take().map(|window| window.destroy(backend))
            }
            None => None,
        };
        ctx.backend = None;
        drop(native);
        ctx.window = None;
        ctx.platform = None;
        ctx.started = false;
        log::info!("Engine stopped");
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("context", &self.context)
            .field("init_hooks", &self.hooks.init)
            .field("render_hooks", &self.hooks.render)
            .field("stop_hooks", &self.hooks.stop)
            .field("input", &self.input)
            .field("script", &self.script.is_some())
            .field("presence", &self.presence.is_some())
            .finish()
    }
}

const fn context_api(kind: BackendKind) -> ContextApi {
    match kind {
        BackendKind::OpenGl => ContextApi::OpenGl { debug: cfg!(debug_assertions) },
        BackendKind::Vulkan | BackendKind::Headless => ContextApi::None,
    }
}

#[cfg(feature = "audio")]
fn default_sound_manager() -> Option<Box<dyn SoundManager>> {
    Some(Box::new(RodioSoundManager::new()))
}

#[cfg(not(feature = "audio"))]
fn default_sound_manager() -> Option<Box<dyn SoundManager>> {
    log::warn!("Audio is enabled in settings but the engine was built without the audio feature");
    None
}

#[cfg(feature = "physics")]
fn default_physics_provider(sub_steps: u32) -> Option<Box<dyn PhysicsProvider>> {
    Some(Box::new(RapierPhysicsProvider::new(sub_steps)))
}

#[cfg(not(feature = "physics"))]
fn default_physics_provider(_sub_steps: u32) -> Option<Box<dyn PhysicsProvider>> {
    log::warn!("Physics is enabled in settings but the engine was built without the physics feature");
    None
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::audio::{AudioError, SoundHandle};
    use crate::event::{Event, EventValue};
    use crate::foundation::math::{Transform, Vec3};
    use crate::foundation::time::ManualClock;
    use crate::physics::{BodyId, PhysicsError, RigidBodyDesc};
    use crate::scene::Entity;
    use crate::window::{CursorMode, HeadlessWindowProbe};
    use approx::assert_relative_eq;

    type Journal = Rc<RefCell<Vec<String>>>;

    fn note(journal: &Journal, entry: &str) {
        journal.borrow_mut().push(entry.to_string());
    }

    struct FakeSound(Journal);

    impl SoundManager for FakeSound {
        fn init(&mut self) -> Result<(), AudioError> {
            Ok(())
        }
        fn update(&mut self) {
            note(&self.0, "sound");
        }
        fn stop(&mut self) {
            note(&self.0, "sound stop");
        }
        fn set_listener_position(&mut self, _position: Vec3) {
            note(&self.0, "listener");
        }
        fn set_listener_rotation(&mut self, _forward: Vec3, _up: Vec3) {}
        fn play(&mut self, _data: &[u8], _position: Option<Vec3>) -> Result<SoundHandle, AudioError> {
            Err(AudioError::BackendNotInitialized)
        }
        fn stop_sound(&mut self, _handle: SoundHandle) -> Result<(), AudioError> {
            Err(AudioError::InvalidHandle)
        }
        fn is_playing(&self, _handle: SoundHandle) -> bool {
            false
        }
    }

    struct FakePhysics(Journal);

    impl PhysicsProvider for FakePhysics {
        fn update_physics(&mut self, _delta: f64) -> u32 {
            note(&self.0, "physics");
            1
        }
        fn stop(&mut self) {
            note(&self.0, "physics stop");
        }
        fn add_rigid_body(&mut self, _desc: &RigidBodyDesc) -> Result<BodyId, PhysicsError> {
            Err(PhysicsError::Stopped)
        }
        fn remove_rigid_body(&mut self, _body: BodyId) -> bool {
            false
        }
        fn body_transform(&self, _body: BodyId) -> Option<Transform> {
            None
        }
        fn set_gravity(&mut self, _gravity: Vec3) {}
        fn body_count(&self) -> usize {
            0
        }
    }

    struct FakeScript(Journal);

    impl ScriptProvider for FakeScript {
        fn init_provider(&mut self) {}
        fn init_scripts(&mut self) {}
        fn render(&mut self, _delta: f64) {
            note(&self.0, "script");
        }
        fn stop(&mut self) {
            note(&self.0, "script stop");
        }
    }

    struct FakePresence(Journal);

    impl RichPresence for FakePresence {
        fn initialized(&self) -> bool {
            true
        }
        fn update_presence(&mut self) {
            note(&self.0, "presence");
        }
        fn shutdown(&mut self) {
            note(&self.0, "presence shutdown");
        }
    }

    struct Marker(Journal);

    impl Entity for Marker {
        fn name(&self) -> &str {
            "marker"
        }
        fn render(&mut self, _frame: &mut FrameContext<'_>, _world: &Transform) {
            note(&self.0, "scene");
        }
        fn release(&mut self, _backend: &mut dyn RenderBackend) {
            note(&self.0, "scene release");
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn test_config(name: &str) -> EngineConfig {
        EngineConfig {
            backend: BackendKind::Headless,
            settings_path: std::env::temp_dir().join(format!("lumen_engine_{name}_{}.toml", std::process::id())),
            apply_setting_defaults: false,
            splash_image: None,
            ..EngineConfig::default()
        }
    }

    struct Harness {
        engine: Engine,
        platform: HeadlessPlatform,
        clock: ManualClock,
        journal: Journal,
    }

    impl Harness {
        fn new(name: &str) -> Self {
            Self::with_config(test_config(name))
        }

        fn with_config(config: EngineConfig) -> Self {
            let clock = ManualClock::new();
            let journal = Journal::default();
            let mut engine = Engine::with_clock(config, clock.clone());
            engine.set_sound_manager(FakeSound(Rc::clone(&journal)));
            engine.set_physics_provider(FakePhysics(Rc::clone(&journal)));
            engine.set_script_provider(FakeScript(Rc::clone(&journal)));
            engine.set_rich_presence(FakePresence(Rc::clone(&journal)));
            Self {
                engine,
                platform: HeadlessPlatform::new(),
                clock,
                journal,
            }
        }

        fn init(&mut self) {
            self.engine
                .init_with_platform(Box::new(self.platform.clone()))
                .expect("headless init");
            self.journal.borrow_mut().clear();
        }

        fn window(&self) -> HeadlessWindowProbe {
            self.platform.window(0).expect("primary window")
        }

        fn take_journal(&self) -> Vec<String> {
            std::mem::take(&mut *self.journal.borrow_mut())
        }
    }

    #[test]
    fn test_accessors_before_init_return_none() {
        let mut engine = Engine::new(test_config("before_init"));
        let ctx = engine.context_mut();
        assert!(!ctx.is_started());
        assert!(ctx.window().is_none());
        assert!(ctx.root().is_none());
        assert!(ctx.backend_mut().is_none());
        assert!(ctx.sound_manager_mut().is_none());
        assert!(ctx.physics_provider_mut().is_none());
        assert!(ctx.ui_context().is_none());
        assert!(ctx.basic_shader().is_none());
        assert!(ctx.should_close());
        assert!(matches!(engine.run(), Err(EngineError::NotInitialized)));
    }

    #[test]
    #[should_panic(expected = "Engine must be initialized")]
    fn test_set_icon_before_init_panics() {
        Engine::new(test_config("icon")).context_mut().set_icon("textures/icon.png");
    }

    #[test]
    fn test_init_builds_window_scene_and_defaults() {
        let mut harness = Harness::new("init");
        let hook_saw_scene = Rc::new(RefCell::new(false));
        let seen = Rc::clone(&hook_saw_scene);
        harness.engine.add_init_function(move |ctx| {
            *seen.borrow_mut() = ctx.root().is_some() && ctx.basic_shader().is_some();
        });
        harness.init();

        assert!(*hook_saw_scene.borrow());
        let probe = harness.window();
        assert_eq!(probe.title(), "Lumen");
        // splash frame
        assert_eq!(probe.presented(), 1);

        let ctx = harness.engine.context_mut();
        assert!(ctx.is_started());
        assert_eq!(ctx.language(), "en");
        let settings = ctx.settings().expect("settings");
        assert_eq!(settings.get_or("graphics", "windowWidth", 0_i64), 1600);
        assert!(!settings.has_value("graphics", "windowWidth"));

        let camera = ctx.root().expect("scene").main_camera();
        assert_relative_eq!(camera.aspect(), 1600.0 / 900.0);
        assert!(ctx.root().expect("scene").find::<ConsoleEntity>().is_some());
    }

    #[test]
    fn test_init_applies_configured_icon() {
        let root = std::env::temp_dir().join(format!("lumen_engine_icon_{}", std::process::id()));
        let icon_dir = root.join("textures").join("ui");
        std::fs::create_dir_all(&icon_dir).expect("icon directory");
        image::RgbaImage::from_pixel(4, 2, image::Rgba([200, 100, 50, 255]))
            .save(icon_dir.join("icon.png"))
            .expect("icon image");

        let mut harness = Harness::with_config(EngineConfig {
            resource_root: root.clone(),
            ..test_config("icon")
        });
        harness.init();
        assert_eq!(harness.window().icon(), Some((4, 2)));
        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn test_missing_icon_leaves_default_and_init_succeeds() {
        let mut harness = Harness::with_config(EngineConfig {
            resource_root: std::env::temp_dir().join("lumen_engine_no_icon"),
            ..test_config("no_icon")
        });
        harness.init();
        assert_eq!(harness.window().icon(), None);
        assert!(harness.engine.context().is_started());
    }

    #[test]
    fn test_light_defines_are_published() {
        let mut harness = Harness::new("lights");
        harness.init();
        let backend = harness.engine.context_mut().backend_mut().expect("backend");
        let defines = backend.shader_defines_mut();
        assert_eq!(defines.get("MAX_POINT_LIGHTS"), Some("64"));
        assert_eq!(defines.get("MAX_DIRECTIONAL_LIGHTS"), Some("4"));
        assert_eq!(defines.get("MAX_SPOT_LIGHTS"), Some("4"));
    }

    #[test]
    fn test_frame_runs_subsystems_in_order() {
        let mut harness = Harness::new("frame_order");
        let hook_journal = Rc::clone(&harness.journal);
        harness.engine.add_render_function(move |ctx| {
            note(&hook_journal, "hook");
            ctx.events_mut().send(Event::new("tick", EventValue::None));
        });
        let repeat_journal = Rc::clone(&harness.journal);
        harness.engine.add_keybind(Keybind::new(Key::W, ButtonPhase::Repeat, move |_ctx| {
            note(&repeat_journal, "repeat");
        }));
        let event_journal = Rc::clone(&harness.journal);
        let scene_journal = Rc::clone(&harness.journal);
        harness.engine.add_init_function(move |ctx| {
            let journal = Rc::clone(&event_journal);
            ctx.events_mut().add_listener("tick", move |_event| {
                note(&journal, "event");
                true
            });
            if let Some(scene) = ctx.root_mut() {
                scene.add_child(None, Marker(Rc::clone(&scene_journal)));
            }
        });
        harness.init();

        let probe = harness.window();
        probe.press_key(Key::W);
        let presented = probe.presented();
        harness.clock.advance(0.016);
        harness.engine.frame().expect("frame");

        assert_eq!(
            harness.take_journal(),
            ["physics", "hook", "script", "scene", "listener", "sound", "repeat", "presence", "event"]
        );
        assert_eq!(probe.presented(), presented + 1);
        assert_eq!(harness.platform.polls(), 1);
    }

    #[test]
    fn test_timing_is_monotonic_across_frames() {
        let mut harness = Harness::new("timing");
        harness.init();
        let mut previous = harness.engine.context().timing().current();
        for step in [0.016, 0.0, 0.033, 0.008] {
            harness.clock.advance(step);
            harness.engine.frame().expect("frame");
            let timing = harness.engine.context().timing();
            assert!(timing.last() <= timing.current());
            assert!(timing.current() >= previous);
            previous = timing.current();
        }
    }

    #[test]
    fn test_render_hooks_see_full_frame_delta() {
        let mut harness = Harness::new("frame_delta");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let record = Rc::clone(&seen);
        harness
            .engine
            .add_render_function(move |ctx| record.borrow_mut().push(ctx.delta()));
        harness.init();

        for _ in 0..3 {
            harness.clock.advance(0.016);
            harness.engine.frame().expect("frame");
        }
        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        for delta in seen.iter() {
            assert_relative_eq!(*delta, 0.016, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_minimized_window_skips_drawing() {
        let mut harness = Harness::new("minimized");
        harness.init();
        let probe = harness.window();
        probe.set_iconified(true);
        harness.engine.frame().expect("frame");
        harness.take_journal();

        let presented = probe.presented();
        harness.engine.frame().expect("frame");
        assert_eq!(probe.presented(), presented);
        assert!(!harness.take_journal().contains(&"script".to_string()));
    }

    #[test]
    fn test_framebuffer_resize_reprojects_scene_camera() {
        let mut harness = Harness::new("resize");
        harness.init();
        harness.window().resize(1000, 500);
        harness.engine.frame().expect("frame");
        let camera = harness.engine.context().root().expect("scene").main_camera();
        assert_relative_eq!(camera.aspect(), 2.0);
    }

    #[test]
    fn test_console_toggles_on_grave_accent() {
        let mut harness = Harness::new("console");
        harness.init();
        harness.window().push_event(PlatformEvent::Key(Key::GraveAccent, ButtonPhase::Pressed));
        harness.engine.frame().expect("frame");

        let scene = harness.engine.context().root().expect("scene");
        let id = scene.find::<ConsoleEntity>().expect("console");
        assert!(scene.get::<ConsoleEntity>(id).expect("console").is_visible());
    }

    #[test]
    fn test_capture_mouse_locks_cursor() {
        let mut harness = Harness::new("capture");
        harness.init();
        harness.engine.context_mut().capture_mouse(true);
        assert_eq!(harness.window().cursor_mode(), CursorMode::Disabled);
        assert!(harness.engine.context().is_mouse_captured());
        harness.engine.context_mut().capture_mouse(false);
        assert_eq!(harness.window().cursor_mode(), CursorMode::Normal);
    }

    #[test]
    fn test_quit_from_hook_ends_run_and_tears_down_in_order() {
        let mut harness = Harness::new("teardown");
        let scene_journal = Rc::clone(&harness.journal);
        harness.engine.add_init_function(move |ctx| {
            if let Some(scene) = ctx.root_mut() {
                scene.add_child(None, Marker(Rc::clone(&scene_journal)));
            }
        });
        let frames = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&frames);
        harness.engine.add_render_function(move |ctx| {
            *counter.borrow_mut() += 1;
            if *counter.borrow() == 3 {
                ctx.quit();
            }
        });
        let stop_journal = Rc::clone(&harness.journal);
        harness.engine.add_stop_function(move |_ctx| note(&stop_journal, "stop hook"));
        harness.init();

        harness.engine.run().expect("run");
        assert_eq!(*frames.borrow(), 3);

        let teardown: Vec<String> = harness
            .take_journal()
            .into_iter()
            .filter(|entry| entry.contains("stop") || entry.contains("shutdown") || entry.contains("release"))
            .collect();
        assert_eq!(
            teardown,
            ["stop hook", "script stop", "presence shutdown", "sound stop", "scene release", "physics stop"]
        );
        assert!(harness.window().is_destroyed());
        assert!(!harness.engine.context().is_started());
        assert!(harness.engine.context().root().is_none());
    }

    #[test]
    fn test_secondary_windows_close_on_quit() {
        let mut harness = Harness::new("secondary");
        harness.init();
        let desc = WindowDescriptor::new("Tools", 320, 240).with_api(ContextApi::None);
        let id = harness
            .engine
            .context_mut()
            .create_window(&desc, Viewport::Owned(Camera::default()))
            .expect("secondary window");
        assert_eq!(harness.engine.context().windows().len(), 1);

        harness.engine.context_mut().quit();
        harness.engine.frame().expect("frame");
        assert!(harness.engine.context().windows().get(id).is_none());
        assert!(harness.platform.window(1).expect("probe").is_destroyed());
    }

    #[test]
    fn test_clear_color_survives_init_unchanged() {
        let mut harness = Harness::new("clear");
        let color = ColorRgba::new(1.0, 0.5, 0.0, 0.5);
        harness.engine.context_mut().set_clear_color(color);
        harness.init();
        assert_eq!(harness.engine.context().clear_color, color);

        harness.engine.context_mut().set_clear_color(color);
        assert_eq!(harness.engine.context().clear_color, color);
    }
}
