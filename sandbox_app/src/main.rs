//! Sandbox application
//!
//! Shows a spinning cube over a floor plane. WASD moves the camera, the right mouse
//! button toggles mouse look, F2 opens a tools window, the grave accent key shows the
//! log console and Escape quits.

use std::cell::Cell;
use std::rc::Rc;

use lumen_engine::prelude::*;
use lumen_engine::resource::PrimitiveMeshLoader;

const CONFIG_PATH: &str = "sandbox.toml";

/// Camera speed in units per second
const MOVE_SPEED: f32 = 4.0;

/// Radians per pixel of mouse motion
const LOOK_SPEED: f32 = 0.0025;

/// Cube spin in radians per second
const SPIN_SPEED: f64 = 0.8;

struct ToolsPanel {
    open: bool,
    spin: Rc<Cell<bool>>,
}

impl Panel for ToolsPanel {
    fn title(&self) -> &str {
        "Tools"
    }

    fn show(&mut self, ctx: &egui::Context) {
        let spin = &self.spin;
        egui::CentralPanel::default().show(ctx, |ui| {
            let mut spinning = spin.get();
            if ui.checkbox(&mut spinning, "Spin cube").changed() {
                spin.set(spinning);
            }
            if ui.button("Close").clicked() {
                self.open = false;
            }
        });
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

fn spawn_mesh(
    ctx: &mut EngineContext,
    name: &str,
    identifier: &str,
    fallback: &MeshData,
    transform: Transform,
) -> Option<EntityId> {
    let loaded = ctx.resources_mut().get_mesh(identifier, PrimitiveMeshLoader::NAME);
    let data = loaded.as_deref().unwrap_or(fallback);
    let shader = ctx.basic_shader()?;
    let texture = ctx.white_texture()?;
    let (root, backend) = ctx.root_and_backend_mut()?;
    let mut entity = MeshEntity::new(name, backend, data, shader, texture);
    entity.transform = transform;
    Some(root.add_child(None, entity))
}

fn move_camera(ctx: &mut EngineContext, right: f32, forward: f32) {
    #[allow(clippy::cast_possible_truncation)]
    let step = ctx.delta() as f32 * MOVE_SPEED;
    if let Some(root) = ctx.root_mut() {
        root.main_camera_mut().translate_local(right * step, 0.0, forward * step);
    }
}

fn main() {
    let config = match EngineConfig::load_or_default(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Ignoring {CONFIG_PATH}: {e}");
            EngineConfig::default()
        }
    };
    let mut engine = Engine::new(config);

    let cube = Rc::new(Cell::new(None));
    let spin = Rc::new(Cell::new(true));

    let spawned = Rc::clone(&cube);
    engine.add_init_function(move |ctx| {
        ctx.set_clear_color(ColorRgba::from_rgba8([24, 26, 32, 255]));
        if let Some(root) = ctx.root_mut() {
            let camera = root.main_camera_mut();
            camera.position = Vec3::new(0.0, 1.5, 5.0);
            camera.look_at(Vec3::zeros());
        }
        spawn_mesh(
            ctx,
            "floor",
            "file://meshes/floor.toml",
            &MeshData::plane(20.0, [0.3, 0.32, 0.35, 1.0]),
            Transform::from_position(Vec3::new(0.0, -1.0, 0.0)),
        );
        spawned.set(spawn_mesh(
            ctx,
            "cube",
            "file://meshes/cube.toml",
            &MeshData::cube(1.0, [0.85, 0.55, 0.25, 1.0]),
            Transform::identity(),
        ));
        log::info!("Sandbox scene ready");
    });

    let spinning = Rc::clone(&spin);
    let mut angle = 0.0_f64;
    engine.add_render_function(move |ctx| {
        if !spinning.get() {
            return;
        }
        angle = (angle + ctx.delta() * SPIN_SPEED) % std::f64::consts::TAU;
        let (Some(id), Some(root)) = (cube.get(), ctx.root_mut()) else {
            return;
        };
        if let Some(entity) = root.get_mut::<MeshEntity>(id) {
            #[allow(clippy::cast_possible_truncation)]
            let rotation = Quat::from_axis_angle(&Vec3::y_axis(), angle as f32);
            entity.transform.rotation = rotation;
        }
    });

    engine.add_stop_function(|ctx| {
        log::info!("Sandbox ran for {:.1}s", ctx.timing().current());
    });

    engine.add_keybind(Keybind::new(Key::Escape, ButtonPhase::Pressed, EngineContext::quit));
    engine.add_keybind(Keybind::new(Key::W, ButtonPhase::Repeat, |ctx: &mut EngineContext| {
        move_camera(ctx, 0.0, 1.0);
    }));
    engine.add_keybind(Keybind::new(Key::S, ButtonPhase::Repeat, |ctx: &mut EngineContext| {
        move_camera(ctx, 0.0, -1.0);
    }));
    engine.add_keybind(Keybind::new(Key::A, ButtonPhase::Repeat, |ctx: &mut EngineContext| {
        move_camera(ctx, -1.0, 0.0);
    }));
    engine.add_keybind(Keybind::new(Key::D, ButtonPhase::Repeat, |ctx: &mut EngineContext| {
        move_camera(ctx, 1.0, 0.0);
    }));
    engine.add_keybind(Keybind::new(MouseButton::Right, ButtonPhase::Pressed, |ctx: &mut EngineContext| {
        let capture = !ctx.is_mouse_captured();
        ctx.capture_mouse(capture);
    }));
    engine.add_keybind(Keybind::new(Key::F2, ButtonPhase::Pressed, move |ctx: &mut EngineContext| {
        let desc = WindowDescriptor::new("Sandbox tools", 320, 160);
        let Some(id) = ctx.create_window(&desc, Viewport::Owned(Camera::default())) else {
            return;
        };
        if let Some(window) = ctx.window_at_mut(id) {
            window.add_panel(ToolsPanel {
                open: true,
                spin: Rc::clone(&spin),
            });
        }
    }));
    engine.add_mousebind(Mousebind::new(MouseAction::Move, |ctx: &mut EngineContext, dx, dy| {
        if !ctx.is_mouse_captured() {
            return;
        }
        #[allow(clippy::cast_possible_truncation)]
        let (yaw, pitch) = (dx as f32 * LOOK_SPEED, -dy as f32 * LOOK_SPEED);
        if let Some(root) = ctx.root_mut() {
            root.main_camera_mut().rotate(yaw, pitch);
        }
    }));

    engine.init_or_exit();
    if let Err(e) = engine.run() {
        log::error!("Sandbox stopped: {e}");
        engine.context().popup_error(&e.to_string());
        std::process::exit(1);
    }
}
