//! Swappable client backends. Each concern is a behavior trait keyed by a
//! name/version pair with a factory per implementation; the registry resolves
//! a configured name onto a factory. Backends compile in behind features on
//! this platform; the transport seam is `hadron::net::Transport` on the
//! server side and `client::ClientLink` here.

pub mod null;

use hashbrown::HashMap;

/// Identity of a backend implementation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BackendInfo {
    pub name: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Eq, PartialEq)]
pub enum BackendError {
    Unavailable(&'static str),
    BadHandle,
}

pub type TextureHandle = u32;
pub type SoundHandle = u32;

/// One sprite draw request, matching the `Sprite` component fields.
#[derive(Debug, Copy, Clone)]
pub struct SpriteDraw {
    pub texture: TextureHandle,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub rotation: f32,
    pub tint: u32,
    pub layer: u8,
}

pub trait GraphicsBackend {
    fn info(&self) -> BackendInfo;

    fn open_window(&mut self, width: u32, height: u32, title: &str) -> Result<(), BackendError>;
    fn load_texture(&mut self, path: &str) -> Result<TextureHandle, BackendError>;
    fn begin_frame(&mut self);
    fn draw_sprite(&mut self, sprite: &SpriteDraw);
    fn end_frame(&mut self);
    fn window_open(&self) -> bool;
    fn close(&mut self);
}

/// Audio capability. Pause and resume are first-class: a backend that cannot
/// honor them must document the degradation, not silently substitute
/// stop-and-seek.
pub trait AudioBackend {
    fn info(&self) -> BackendInfo;

    fn load(&mut self, path: &str) -> Result<SoundHandle, BackendError>;
    fn play(&mut self, sound: SoundHandle, looped: bool) -> Result<(), BackendError>;
    fn pause(&mut self, sound: SoundHandle) -> Result<(), BackendError>;
    fn resume(&mut self, sound: SoundHandle) -> Result<(), BackendError>;
    fn stop(&mut self, sound: SoundHandle) -> Result<(), BackendError>;
    fn set_volume(&mut self, volume: f32);
}

pub trait InputBackend {
    fn info(&self) -> BackendInfo;

    /// Sample the current input intent as the wire bitfield.
    fn poll(&mut self) -> u16;
    fn quit_requested(&self) -> bool;
}

pub type GraphicsFactory = fn() -> Box<dyn GraphicsBackend>;
pub type AudioFactory = fn() -> Box<dyn AudioBackend>;
pub type InputFactory = fn() -> Box<dyn InputBackend>;

/// Resolves configured backend names onto factories. The null backends are
/// always present so headless runs and tests work without any feature
/// enabled.
pub struct BackendRegistry {
    graphics: HashMap<&'static str, GraphicsFactory>,
    audio: HashMap<&'static str, AudioFactory>,
    input: HashMap<&'static str, InputFactory>,
}

impl BackendRegistry {
    pub fn new() -> BackendRegistry {
        let mut registry = BackendRegistry {
            graphics: HashMap::new(),
            audio: HashMap::new(),
            input: HashMap::new(),
        };

        registry.register_graphics("null", null::null_graphics);
        registry.register_audio("null", null::null_audio);
        registry.register_input("null", null::null_input);

        registry
    }

    pub fn register_graphics(&mut self, name: &'static str, factory: GraphicsFactory) {
        self.graphics.insert(name, factory);
    }

    pub fn register_audio(&mut self, name: &'static str, factory: AudioFactory) {
        self.audio.insert(name, factory);
    }

    pub fn register_input(&mut self, name: &'static str, factory: InputFactory) {
        self.input.insert(name, factory);
    }

    pub fn create_graphics(&self, name: &str) -> Option<Box<dyn GraphicsBackend>> {
        self.graphics.get(name).map(|factory| factory())
    }

    pub fn create_audio(&self, name: &str) -> Option<Box<dyn AudioBackend>> {
        self.audio.get(name).map(|factory| factory())
    }

    pub fn create_input(&self, name: &str) -> Option<Box<dyn InputBackend>> {
        self.input.get(name).map(|factory| factory())
    }

    pub fn graphics_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.graphics.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_resolves_null_backends() {
        let registry = BackendRegistry::new();

        let graphics = registry.create_graphics("null").unwrap();
        let audio = registry.create_audio("null").unwrap();
        let input = registry.create_input("null").unwrap();

        assert_eq!(graphics.info().name, "null");
        assert_eq!(audio.info().name, "null");
        assert_eq!(input.info().name, "null");
    }

    #[test]
    fn test_unknown_backend_is_none() {
        let registry = BackendRegistry::new();

        assert!(registry.create_graphics("vulkan").is_none());
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = BackendRegistry::new();
        registry.register_input("alt", null::null_input);

        assert!(registry.create_input("alt").is_some());
    }
}
