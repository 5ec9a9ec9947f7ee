//! Audio playback
//!
//! The engine talks to audio through [`SoundManager`]. It moves the listener once per
//! frame to the scene's listening pose and calls [`SoundManager::update`] to advance
//! playback. [`RodioSoundManager`] is the default implementation.

#[cfg(feature = "audio")]
pub mod rodio_backend;
pub mod spatial;

use thiserror::Error;

use crate::foundation::math::Vec3;

#[cfg(feature = "audio")]
pub use rodio_backend::RodioSoundManager;
pub use spatial::{ListenerPose, SpatialConfig};

/// Audio errors
#[derive(Error, Debug)]
pub enum AudioError {
    /// Output device could not be opened
    #[error("Audio backend initialization failed: {0}")]
    BackendInitFailed(String),

    /// Playback requested before `init`
    #[error("Audio backend not initialized")]
    BackendNotInitialized,

    /// Decoding or sink creation failed
    #[error("Playback failed: {0}")]
    PlaybackFailed(String),

    /// Handle does not name a playing sound
    #[error("Invalid sound handle")]
    InvalidHandle,
}

/// Identifies one playing sound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SoundHandle(pub u64);

/// An audio device with a 3D listener
pub trait SoundManager {
    /// Open the output device
    fn init(&mut self) -> Result<(), AudioError>;

    /// Advance playback; finished sounds are dropped
    fn update(&mut self);

    /// Stop every sound and close the device
    fn stop(&mut self);

    /// Move the listener
    fn set_listener_position(&mut self, position: Vec3);

    /// Orient the listener
    fn set_listener_rotation(&mut self, forward: Vec3, up: Vec3);

    /// Play encoded audio (WAV, OGG, MP3 or FLAC); `position` of `None` plays at the listener
    fn play(&mut self, data: &[u8], position: Option<Vec3>) -> Result<SoundHandle, AudioError>;

    /// Stop one sound
    fn stop_sound(&mut self, handle: SoundHandle) -> Result<(), AudioError>;

    /// Whether the sound is still playing
    fn is_playing(&self, handle: SoundHandle) -> bool;
}
