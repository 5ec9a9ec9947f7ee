//! Positional playback through `rodio`

use std::collections::HashMap;
use std::io::Cursor;

use rodio::{Decoder, OutputStream, OutputStreamHandle, SpatialSink};

use super::spatial::{ListenerPose, SpatialConfig};
use super::{AudioError, SoundHandle, SoundManager};
use crate::foundation::math::Vec3;

struct PlayingSound {
    sink: SpatialSink,
    /// `None` follows the listener
    position: Option<Vec3>,
}

/// [`SoundManager`] backed by a rodio output stream
///
/// Every sound plays through a [`SpatialSink`]; ear positions are refreshed from
/// the listener pose on [`update`](SoundManager::update).
pub struct RodioSoundManager {
    /// Keeps the device open
    _output_stream: Option<OutputStream>,
    stream_handle: Option<OutputStreamHandle>,
    sounds: HashMap<SoundHandle, PlayingSound>,
    listener: ListenerPose,
    config: SpatialConfig,
    next_id: u64,
}

impl RodioSoundManager {
    /// Manager with default spatial settings; call [`SoundManager::init`] before playing
    pub fn new() -> Self {
        Self::with_config(SpatialConfig::default())
    }

    /// Manager with custom spatial settings
    pub fn with_config(config: SpatialConfig) -> Self {
        Self {
            _output_stream: None,
            stream_handle: None,
            sounds: HashMap::new(),
            listener: ListenerPose::default(),
            config,
            next_id: 0,
        }
    }

    /// Whether the output device is open
    pub fn is_initialized(&self) -> bool {
        self.stream_handle.is_some()
    }

    /// Number of sounds not yet finished
    pub fn active_count(&self) -> usize {
        self.sounds.len()
    }

    /// Current listener pose
    pub fn listener(&self) -> &ListenerPose {
        &self.listener
    }

    fn next_handle(&mut self) -> SoundHandle {
        let handle = SoundHandle(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        handle
    }

    fn place(&self, sound: &PlayingSound) {
        let (left, right) = self.listener.ear_positions(self.config.ear_distance);
        let emitter = sound.position.unwrap_or(self.listener.position);
        sound.sink.set_left_ear_position(left);
        sound.sink.set_right_ear_position(right);
        sound.sink.set_emitter_position([emitter.x, emitter.y, emitter.z]);
        sound.sink.set_volume(self.config.attenuation(&self.listener, emitter));
    }
}

impl Default for RodioSoundManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundManager for RodioSoundManager {
    fn init(&mut self) -> Result<(), AudioError> {
        if self.is_initialized() {
            return Ok(());
        }
        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| AudioError::BackendInitFailed(format!("Failed to open audio output: {e}")))?;
        self._output_stream = Some(stream);
        self.stream_handle = Some(stream_handle);
        log::info!("Rodio audio backend initialized");
        Ok(())
    }

    fn update(&mut self) {
        self.sounds.retain(|_, sound| !sound.sink.empty());
        for sound in self.sounds.values() {
            self.place(sound);
        }
    }

    fn stop(&mut self) {
        if !self.is_initialized() {
            return;
        }
        for (_, sound) in self.sounds.drain() {
            sound.sink.stop();
        }
        self.stream_handle = None;
        self._output_stream = None;
        log::info!("Rodio audio backend shut down");
    }

    fn set_listener_position(&mut self, position: Vec3) {
        self.listener.position = position;
    }

    fn set_listener_rotation(&mut self, forward: Vec3, up: Vec3) {
        self.listener.forward = forward;
        self.listener.up = up;
    }

    fn play(&mut self, data: &[u8], position: Option<Vec3>) -> Result<SoundHandle, AudioError> {
        let stream_handle = self.stream_handle.as_ref().ok_or(AudioError::BackendNotInitialized)?;
        if let Some(source) = position {
            if !self.config.is_audible(&self.listener, source) {
                log::debug!("Sound at {source:?} is out of range and starts muted");
            }
        }

        let (left, right) = self.listener.ear_positions(self.config.ear_distance);
        let emitter = position.unwrap_or(self.listener.position);
        let sink = SpatialSink::try_new(stream_handle, [emitter.x, emitter.y, emitter.z], left, right)
            .map_err(|e| AudioError::PlaybackFailed(format!("Failed to create sink: {e}")))?;
        let source = Decoder::new(Cursor::new(data.to_vec()))
            .map_err(|e| AudioError::PlaybackFailed(format!("Failed to decode audio: {e}")))?;
        sink.append(source);

        let sound = PlayingSound { sink, position };
        self.place(&sound);
        let handle = self.next_handle();
        self.sounds.insert(handle, sound);
        Ok(handle)
    }

    fn stop_sound(&mut self, handle: SoundHandle) -> Result<(), AudioError> {
        let sound = self.sounds.remove(&handle).ok_or(AudioError::InvalidHandle)?;
        sound.sink.stop();
        Ok(())
    }

    fn is_playing(&self, handle: SoundHandle) -> bool {
        self.sounds.get(&handle).is_some_and(|sound| !sound.sink.empty())
    }
}

impl Drop for RodioSoundManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialization_is_repeatable() {
        let mut manager = RodioSoundManager::new();
        assert!(!manager.is_initialized());

        // May fail in CI environments without an audio device
        if manager.init().is_ok() {
            assert!(manager.init().is_ok());
            manager.stop();
            assert!(!manager.is_initialized());
        }
    }

    #[test]
    fn test_play_before_init_fails() {
        let mut manager = RodioSoundManager::new();
        let result = manager.play(&[0; 64], None);
        assert!(matches!(result, Err(AudioError::BackendNotInitialized)));
    }

    #[test]
    fn test_undecodable_audio_is_rejected() {
        let mut manager = RodioSoundManager::new();
        if manager.init().is_ok() {
            let result = manager.play(&[0; 64], Some(Vec3::zeros()));
            assert!(matches!(result, Err(AudioError::PlaybackFailed(_))));
            assert_eq!(manager.active_count(), 0);
        }
    }

    #[test]
    fn test_unknown_handle() {
        let mut manager = RodioSoundManager::new();
        assert!(matches!(manager.stop_sound(SoundHandle(7)), Err(AudioError::InvalidHandle)));
        assert!(!manager.is_playing(SoundHandle(7)));
    }

    #[test]
    fn test_listener_pose_updates() {
        let mut manager = RodioSoundManager::new();
        manager.set_listener_position(Vec3::new(1.0, 2.0, 3.0));
        manager.set_listener_rotation(Vec3::x(), Vec3::y());
        assert_eq!(manager.listener().position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(manager.listener().forward, Vec3::x());
    }
}
