//! # Lumen Engine
//!
//! A real-time 3D application engine with interchangeable OpenGL and Vulkan render
//! backends.
//!
//! ## Features
//!
//! - **Backend-neutral rendering**: one [`render::RenderBackend`] contract over OpenGL,
//!   Vulkan and a headless recorder
//! - **Windows**: a primary window plus a pool of secondary windows with their own UI
//! - **Scene graph**: parent/child entities drawn depth first with a main camera
//! - **Immediate-mode UI** through egui, with a log console and a frame profiler
//! - **Settings**: categorized, typed, persistent settings with change listeners
//! - **Resources**: scheme-addressed providers behind a reference-counted cache
//! - **Audio and physics** through rodio and rapier, each behind an optional feature
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lumen_engine::prelude::*;
//!
//! let mut engine = Engine::new(EngineConfig::default());
//! engine.add_keybind(Keybind::new(Key::Escape, ButtonPhase::Pressed, EngineContext::quit));
//! engine.add_render_function(|ctx| {
//!     let delta = ctx.delta();
//!     if let Some(root) = ctx.root_mut() {
//!         root.main_camera_mut().rotate(delta as f32 * 0.2, 0.0);
//!     }
//! });
//! engine.init_or_exit();
//! engine.run().expect("engine loop");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod audio;
pub mod config;
pub mod event;
pub mod foundation;
pub mod input;
pub mod lifecycle;
pub mod physics;
pub mod presence;
// Device bindings and `Pod` vertex layouts
#[allow(unsafe_code)]
pub mod render;
pub mod resource;
pub mod scene;
pub mod script;
pub mod settings;
pub mod ui;
pub mod window;

mod engine;

pub use config::{BackendKind, Config, EngineConfig};
pub use engine::{Engine, EngineContext, EngineError};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        audio::SoundManager,
        event::{Event, EventValue},
        foundation::{
            math::{ColorRgba, Mat4, Quat, Transform, Vec2, Vec3},
            time::{FrameTiming, Stopwatch},
        },
        input::{ButtonPhase, Key, Keybind, MouseAction, MouseButton, Mousebind},
        physics::{BodyKind, ColliderShape, PhysicsProvider, RigidBodyDesc},
        render::{MeshCullType, RenderBackend},
        resource::{MeshData, ResourceCache, TextureResource},
        scene::{Camera, Entity, EntityId, FrameContext, MeshEntity, SceneRoot},
        settings::SettingsStore,
        ui::Panel,
        window::{ContextApi, Viewport, WindowDescriptor, WindowId},
        BackendKind, Config, Engine, EngineConfig, EngineContext, EngineError,
    };
}
