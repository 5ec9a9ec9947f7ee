//! Category/key settings store
//!
//! Settings are grouped by category (`graphics`, `audio`, ...) and persisted as a
//! TOML or RON document with one table per category. Reads never mutate the store:
//! an unset key leaves the caller's value untouched unless a default was declared
//! for it, in which case the declared default is written to the caller instead.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ConfigFormat};

/// Default width of the primary window in pixels
pub const DEFAULT_WINDOW_WIDTH: i64 = 1600;
/// Default height of the primary window in pixels
pub const DEFAULT_WINDOW_HEIGHT: i64 = 900;
/// Default number of point lights exposed to shaders
pub const DEFAULT_MAX_POINT_LIGHTS: i64 = 64;
/// Default number of directional lights exposed to shaders
pub const DEFAULT_MAX_DIRECTIONAL_LIGHTS: i64 = 4;
/// Default number of spot lights exposed to shaders
pub const DEFAULT_MAX_SPOT_LIGHTS: i64 = 4;
/// Default number of physics steps allowed per frame
pub const DEFAULT_PHYSICS_SUB_STEPS: i64 = 4;

/// A single stored value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    /// Boolean flag
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Text
    String(String),
}

impl std::fmt::Display for SettingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::String(value) => write!(f, "{value:?}"),
        }
    }
}

/// Rust types that can be read from and written to a [`SettingValue`]
pub trait SettingType: Sized {
    /// Convert from a stored value; `None` on type mismatch
    fn from_setting(value: &SettingValue) -> Option<Self>;
    /// Convert into a stored value
    fn into_setting(self) -> SettingValue;
}

impl SettingType for bool {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn into_setting(self) -> SettingValue {
        SettingValue::Bool(self)
    }
}

impl SettingType for i64 {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn into_setting(self) -> SettingValue {
        SettingValue::Int(self)
    }
}

macro_rules! narrow_int_setting {
    ($($ty:ty),*) => {$(
        impl SettingType for $ty {
            fn from_setting(value: &SettingValue) -> Option<Self> {
                match value {
                    SettingValue::Int(i) => <$ty>::try_from(*i).ok(),
                    _ => None,
                }
            }

            fn into_setting(self) -> SettingValue {
                SettingValue::Int(i64::from(self))
            }
        }
    )*};
}

narrow_int_setting!(i32, u32, u16);

impl SettingType for f64 {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Float(f) => Some(*f),
            #[allow(clippy::cast_precision_loss)]
            SettingValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    fn into_setting(self) -> SettingValue {
        SettingValue::Float(self)
    }
}

impl SettingType for f32 {
    #[allow(clippy::cast_possible_truncation)]
    fn from_setting(value: &SettingValue) -> Option<Self> {
        f64::from_setting(value).map(|f| f as f32)
    }

    fn into_setting(self) -> SettingValue {
        SettingValue::Float(f64::from(self))
    }
}

impl SettingType for String {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn into_setting(self) -> SettingValue {
        SettingValue::String(self)
    }
}

impl SettingType for SettingValue {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        Some(value.clone())
    }

    fn into_setting(self) -> SettingValue {
        self
    }
}

/// Settings store errors
#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    /// Reading or writing the backing document failed
    #[error("Settings file {path}: {source}")]
    File {
        /// Backing file
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: ConfigError,
    },
}

type Categories = BTreeMap<String, BTreeMap<String, SettingValue>>;

/// Callback invoked by [`SettingsStore::set_value`] when notification is requested
pub type SettingsListener = Box<dyn FnMut(&str, &str, &SettingValue)>;

/// Category/key value store with declared defaults, persistence, and change listeners
pub struct SettingsStore {
    path: Option<PathBuf>,
    values: Categories,
    defaults: Categories,
    listeners: Vec<SettingsListener>,
}

impl SettingsStore {
    /// Create a store backed by `path`; nothing is read until [`SettingsStore::load`]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            values: Categories::new(),
            defaults: Categories::new(),
            listeners: Vec::new(),
        }
    }

    /// Create a store without a backing file; `load` and `save` do nothing
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Categories::new(),
            defaults: Categories::new(),
            listeners: Vec::new(),
        }
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Replace the stored values with the backing document; a missing file yields an empty store
    pub fn load(&mut self) -> Result<(), SettingsError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        if !path.exists() {
            log::info!("Settings file {} not found, starting empty", path.display());
            self.values.clear();
            return Ok(());
        }
        let result = ConfigFormat::from_path(&path).and_then(|format| {
            let contents = std::fs::read_to_string(&path)?;
            format.parse::<Categories>(&contents)
        });
        self.values = result.map_err(|source| SettingsError::File { path, source })?;
        Ok(())
    }

    /// Write the stored values to the backing document
    pub fn save(&self) -> Result<(), SettingsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let result = ConfigFormat::from_path(path).and_then(|format| {
            let contents = format.serialize(&self.values)?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, contents)?;
            Ok(())
        });
        result.map_err(|source| SettingsError::File {
            path: path.clone(),
            source,
        })
    }

    /// Whether a value is stored for `(category, key)`; declared defaults do not count
    pub fn has_value(&self, category: &str, key: &str) -> bool {
        self.values
            .get(category)
            .is_some_and(|entries| entries.contains_key(key))
    }

    /// Read `(category, key)` into `out`
    ///
    /// Returns `true` when a stored value of the right type was found. Otherwise `out`
    /// receives the declared default if one of the right type exists, or is left as
    /// the caller supplied it, and `false` is returned. The store is never modified.
    pub fn get_value<T: SettingType>(&self, category: &str, key: &str, out: &mut T) -> bool {
        if let Some(value) = Self::lookup::<T>(&self.values, category, key) {
            *out = value;
            return true;
        }
        if let Some(value) = Self::lookup::<T>(&self.defaults, category, key) {
            *out = value;
        }
        false
    }

    /// Read `(category, key)`, falling back to the declared default and then to `fallback`
    pub fn get_or<T: SettingType>(&self, category: &str, key: &str, fallback: T) -> T {
        let mut value = fallback;
        self.get_value(category, key, &mut value);
        value
    }

    /// Store a value
    ///
    /// With `persist` the backing document is rewritten immediately. With `notify` every
    /// registered listener is called with the new value after it has been stored.
    pub fn set_value<T: SettingType>(
        &mut self,
        category: &str,
        key: &str,
        value: T,
        persist: bool,
        notify: bool,
    ) -> Result<(), SettingsError> {
        let value = value.into_setting();
        self.values
            .entry(category.to_string())
            .or_default()
            .insert(key.to_string(), value.clone());

        if notify {
            for listener in &mut self.listeners {
                listener(category, key, &value);
            }
        }
        if persist {
            self.save()?;
        }
        Ok(())
    }

    /// Store `value` only when nothing is stored yet; returns whether it was stored
    pub fn set_if_absent<T: SettingType>(&mut self, category: &str, key: &str, value: T) -> bool {
        let entries = self.values.entry(category.to_string()).or_default();
        if entries.contains_key(key) {
            return false;
        }
        entries.insert(key.to_string(), value.into_setting());
        true
    }

    /// Declare the value reads fall back to for `(category, key)` without storing it
    pub fn declare_default<T: SettingType>(&mut self, category: &str, key: &str, value: T) {
        self.defaults
            .entry(category.to_string())
            .or_default()
            .insert(key.to_string(), value.into_setting());
    }

    /// Make sure a category table exists so it is written even while empty
    pub fn add_category(&mut self, category: &str) {
        self.values.entry(category.to_string()).or_default();
    }

    /// Register a change listener
    pub fn add_listener(&mut self, listener: impl FnMut(&str, &str, &SettingValue) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Names of the stored categories
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Declare every engine default without storing anything
    pub fn declare_engine_defaults(&mut self) {
        for (category, key, value) in engine_defaults() {
            self.declare_default(category, key, value);
        }
    }

    /// Load the backing document, store every engine default that is not already set, and save
    pub fn apply_engine_defaults(&mut self) -> Result<(), SettingsError> {
        self.load()?;
        self.declare_engine_defaults();
        for (category, key, value) in engine_defaults() {
            self.set_if_absent(category, key, value);
        }
        self.save()
    }

    fn lookup<T: SettingType>(table: &Categories, category: &str, key: &str) -> Option<T> {
        table.get(category)?.get(key).and_then(T::from_setting)
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("path", &self.path)
            .field("values", &self.values)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

/// Every setting the engine reads, with its default
pub fn engine_defaults() -> Vec<(&'static str, &'static str, SettingValue)> {
    use SettingValue::{Bool, Int, String as Text};
    vec![
        ("engine", "iconPath", Text("textures/ui/icon.png".to_string())),
        ("engine", "consoleColoredText", Bool(true)),
        ("engine", "maxPointLights", Int(DEFAULT_MAX_POINT_LIGHTS)),
        ("engine", "maxDirectionalLights", Int(DEFAULT_MAX_DIRECTIONAL_LIGHTS)),
        ("engine", "maxSpotLights", Int(DEFAULT_MAX_SPOT_LIGHTS)),
        ("audio", "enabled", Bool(true)),
        ("physics", "enabled", Bool(true)),
        ("physics", "subStep", Int(DEFAULT_PHYSICS_SUB_STEPS)),
        ("graphics", "windowWidth", Int(DEFAULT_WINDOW_WIDTH)),
        ("graphics", "windowHeight", Int(DEFAULT_WINDOW_HEIGHT)),
        ("graphics", "startMaximized", Bool(false)),
        ("graphics", "fullscreen", Bool(false)),
        ("graphics", "vsync", Bool(true)),
        ("input", "rawMouseMotion", Bool(true)),
        ("input", "invertYAxis", Bool(false)),
        ("ui", "language", Text("en".to_string())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn temp_path(name: &str, ext: &str) -> PathBuf {
        std::env::temp_dir().join(format!("lumen_settings_{name}_{}.{ext}", std::process::id()))
    }

    #[test]
    fn test_unset_key_returns_caller_default_without_writing() {
        let store = SettingsStore::in_memory();
        let mut width = DEFAULT_WINDOW_WIDTH;
        assert!(!store.get_value("graphics", "windowWidth", &mut width));
        assert_eq!(width, 1600);
        assert!(!store.has_value("graphics", "windowWidth"));
    }

    #[test]
    fn test_declared_default_fills_output_but_is_not_stored() {
        let mut store = SettingsStore::in_memory();
        store.declare_engine_defaults();
        let mut width: u32 = 0;
        assert!(!store.get_value("graphics", "windowWidth", &mut width));
        assert_eq!(width, 1600);
        assert!(!store.has_value("graphics", "windowWidth"));
        assert_eq!(store.categories().count(), 0);
    }

    #[test]
    fn test_type_mismatch_leaves_output_untouched() {
        let mut store = SettingsStore::in_memory();
        store.set_value("ui", "language", "de".to_string(), false, false).unwrap();
        let mut value = 7_i32;
        assert!(!store.get_value("ui", "language", &mut value));
        assert_eq!(value, 7);
    }

    #[test]
    fn test_set_value_notifies_only_when_asked() {
        let mut store = SettingsStore::in_memory();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        store.add_listener(move |category, key, value| {
            sink.borrow_mut().push(format!("{category}.{key}={value}"));
        });

        store.set_value("audio", "enabled", false, false, false).unwrap();
        store.set_value("physics", "subStep", 8_i64, false, true).unwrap();

        assert_eq!(*seen.borrow(), vec!["physics.subStep=8".to_string()]);
        assert!(!store.get_or("audio", "enabled", true));
    }

    #[test]
    fn test_persisted_value_survives_reload() {
        let path = temp_path("persist", "toml");
        let mut store = SettingsStore::new(&path);
        store.set_value("graphics", "fullscreen", true, true, false).unwrap();

        let mut reloaded = SettingsStore::new(&path);
        reloaded.load().unwrap();
        std::fs::remove_file(&path).ok();
        assert!(reloaded.get_or("graphics", "fullscreen", false));
    }

    #[test]
    fn test_engine_defaults_do_not_overwrite() {
        let path = temp_path("defaults", "ron");
        let mut store = SettingsStore::new(&path);
        store.set_value("graphics", "windowWidth", 800_i64, true, false).unwrap();

        let mut merged = SettingsStore::new(&path);
        merged.apply_engine_defaults().unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(merged.get_or("graphics", "windowWidth", 0_i64), 800);
        assert_eq!(merged.get_or("graphics", "windowHeight", 0_i64), 900);
        assert_eq!(merged.get_or("ui", "language", String::new()), "en");
    }

    #[test]
    fn test_int_widens_to_float() {
        let mut store = SettingsStore::in_memory();
        store.set_value("input", "sensitivity", 2_i64, false, false).unwrap();
        assert!((store.get_or("input", "sensitivity", 0.0_f32) - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let mut store = SettingsStore::new(temp_path("missing", "toml"));
        store.load().unwrap();
        assert_eq!(store.categories().count(), 0);
    }
}
