//! Headless backends used by tests and dedicated clients. They honor the
//! full capability contracts, including real pause/resume bookkeeping, while
//! producing no output.

use crate::backend::{
    AudioBackend, BackendError, BackendInfo, GraphicsBackend, InputBackend, SoundHandle,
    SpriteDraw, TextureHandle,
};
use hashbrown::HashMap;

const VERSION: &str = "1.0";

pub fn null_graphics() -> Box<dyn GraphicsBackend> {
    Box::new(NullGraphics {
        window_open: false,
        next_texture: 1,
        draws: 0,
    })
}

pub fn null_audio() -> Box<dyn AudioBackend> {
    Box::new(NullAudio {
        next_sound: 1,
        playing: HashMap::new(),
        volume: 1.0,
    })
}

pub fn null_input() -> Box<dyn InputBackend> {
    Box::new(NullInput)
}

struct NullGraphics {
    window_open: bool,
    next_texture: TextureHandle,
    draws: u64,
}

impl GraphicsBackend for NullGraphics {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: "null",
            version: VERSION,
        }
    }

    fn open_window(&mut self, _width: u32, _height: u32, _title: &str) -> Result<(), BackendError> {
        self.window_open = true;
        Ok(())
    }

    fn load_texture(&mut self, _path: &str) -> Result<TextureHandle, BackendError> {
        let handle = self.next_texture;
        self.next_texture += 1;
        Ok(handle)
    }

    fn begin_frame(&mut self) {}

    fn draw_sprite(&mut self, _sprite: &SpriteDraw) {
        self.draws += 1;
    }

    fn end_frame(&mut self) {}

    fn window_open(&self) -> bool {
        self.window_open
    }

    fn close(&mut self) {
        self.window_open = false;
    }
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum PlayState {
    Playing,
    Paused,
}

struct NullAudio {
    next_sound: SoundHandle,
    playing: HashMap<SoundHandle, PlayState>,
    volume: f32,
}

impl AudioBackend for NullAudio {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: "null",
            version: VERSION,
        }
    }

    fn load(&mut self, _path: &str) -> Result<SoundHandle, BackendError> {
        let handle = self.next_sound;
        self.next_sound += 1;
        Ok(handle)
    }

    fn play(&mut self, sound: SoundHandle, _looped: bool) -> Result<(), BackendError> {
        if sound == 0 || sound >= self.next_sound {
            return Err(BackendError::BadHandle);
        }
        self.playing.insert(sound, PlayState::Playing);
        Ok(())
    }

    fn pause(&mut self, sound: SoundHandle) -> Result<(), BackendError> {
        match self.playing.get_mut(&sound) {
            Some(state) => {
                *state = PlayState::Paused;
                Ok(())
            }
            None => Err(BackendError::BadHandle),
        }
    }

    fn resume(&mut self, sound: SoundHandle) -> Result<(), BackendError> {
        match self.playing.get_mut(&sound) {
            Some(state) => {
                *state = PlayState::Playing;
                Ok(())
            }
            None => Err(BackendError::BadHandle),
        }
    }

    fn stop(&mut self, sound: SoundHandle) -> Result<(), BackendError> {
        self.playing.remove(&sound);
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.max(0.0).min(1.0);
    }
}

struct NullInput;

impl InputBackend for NullInput {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: "null",
            version: VERSION,
        }
    }

    fn poll(&mut self) -> u16 {
        0
    }

    fn quit_requested(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_pause_resume_roundtrip() {
        let mut audio = null_audio();

        let sound = audio.load("boom.wav").unwrap();
        audio.play(sound, false).unwrap();
        audio.pause(sound).unwrap();
        audio.resume(sound).unwrap();
        audio.stop(sound).unwrap();

        // A stopped sound can't be paused.
        assert_eq!(audio.pause(sound).unwrap_err(), BackendError::BadHandle);
    }

    #[test]
    fn test_audio_rejects_unloaded_handles() {
        let mut audio = null_audio();

        assert_eq!(audio.play(42, false).unwrap_err(), BackendError::BadHandle);
    }

    #[test]
    fn test_graphics_window_lifecycle() {
        let mut graphics = null_graphics();

        assert!(!graphics.window_open());
        graphics.open_window(640, 480, "test").unwrap();
        assert!(graphics.window_open());
        graphics.close();
        assert!(!graphics.window_open());
    }
}
