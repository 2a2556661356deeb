//! Theme lookup used during render.
//!
//! Lookups are expected to be cheap only per page activation, so the runtime
//! wraps the provider in a [`ThemeCache`] that is cleared every time a page
//! becomes active and otherwise answers from memory.

use std::path::Path;

use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::util::HashMap;
use crate::render::surface::Color;

pub trait ThemeLookup: Send {
    fn resolve_color(&self, owner: &str, key: &str) -> Color;
}

impl<F> ThemeLookup for F
where
    F: Fn(&str, &str) -> Color + Send,
{
    fn resolve_color(&self, owner: &str, key: &str) -> Color {
        self(owner, key)
    }
}

/// Colour table keyed by name, with optional per-owner overrides.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Theme {
    pub fallback: Color,
    pub colors: IndexMap<String, Color>,
    pub owners: IndexMap<String, IndexMap<String, Color>>,
}

impl Theme {
    pub fn dark() -> Self {
        let colors = [
            ("background", Color::rgb(0x12, 0x12, 0x14)),
            ("panel", Color::rgb(0x1e, 0x1f, 0x24)),
            ("outline", Color::rgb(0x3a, 0x3c, 0x44)),
            ("label", Color::rgb(0xd8, 0xd8, 0xd8)),
            ("value", Color::rgb(0xff, 0xb3, 0x47)),
            ("active", Color::rgb(0x4f, 0xc3, 0xf7)),
            ("inactive", Color::rgb(0x55, 0x55, 0x55)),
            ("status", Color::rgb(0x8b, 0xc3, 0x4a)),
            ("error", Color::rgb(0xef, 0x53, 0x50)),
        ]
        .into_iter()
        .map(|(k, c)| (k.to_string(), c))
        .collect();

        Self {
            fallback: Color::WHITE,
            colors,
            owners: IndexMap::new(),
        }
    }

    pub fn with_owner_color(
        mut self,
        owner: &str,
        key: &str,
        color: Color,
    ) -> Self {
        self.owners
            .entry(owner.to_string())
            .or_default()
            .insert(key.to_string(), color);
        self
    }

    /// Reads a theme file. A missing file yields the dark theme.
    pub fn load_if_exists(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("no theme at {}, using defaults", path.display());
            return Ok(Self::dark());
        }
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl ThemeLookup for Theme {
    fn resolve_color(&self, owner: &str, key: &str) -> Color {
        if let Some(color) = self.owners.get(owner).and_then(|t| t.get(key)) {
            return *color;
        }
        match self.colors.get(key) {
            Some(color) => *color,
            None => {
                warn!("theme has no colour '{}' for {}", key, owner);
                self.fallback
            }
        }
    }
}

pub struct ThemeCache {
    lookup: Box<dyn ThemeLookup>,
    cache: HashMap<(String, String), Color>,
    misses: u64,
}

impl ThemeCache {
    pub fn new(lookup: impl ThemeLookup + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
            cache: HashMap::default(),
            misses: 0,
        }
    }

    pub fn color(&mut self, owner: &str, key: &str) -> Color {
        let cache_key = (owner.to_string(), key.to_string());
        if let Some(color) = self.cache.get(&cache_key) {
            return *color;
        }
        self.misses += 1;
        let color = self.lookup.resolve_color(owner, key);
        self.cache.insert(cache_key, color);
        color
    }

    /// Called on every page activation.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

impl std::fmt::Debug for ThemeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThemeCache")
            .field("cached", &self.cache.len())
            .field("misses", &self.misses)
            .finish()
    }
}
