use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

use indexmap::IndexMap;

use super::page::{Page, PageConfig};
use crate::core::error::{PanelError, Result};
use crate::core::util::{HashSet, panic_message};
use crate::params::descriptor::ControlDescriptor;

type PageFactory = Box<dyn Fn() -> Box<dyn Page> + Send + Sync + 'static>;

pub struct PageEntry {
    pub config: &'static PageConfig,
    factory: PageFactory,
    controls: Vec<ControlDescriptor>,
}

impl PageEntry {
    pub fn instantiate(&self) -> Box<dyn Page> {
        (self.factory)()
    }

    /// Controls the page declared when it was registered.
    pub fn declared_controls(&self) -> &[ControlDescriptor] {
        &self.controls
    }
}

/// A named, ordered group of pages the user cycles through.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Mode {
    pub name: String,
    pub enabled: bool,
    pub pages: Vec<String>,
}

/// Page identifiers mapped to their bundles, in registration order. Pages are
/// only ever found through explicit `register` calls.
#[derive(Default)]
pub struct PageRegistry {
    entries: IndexMap<String, PageEntry>,
    modes: Vec<Mode>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a page. The bundle is instantiated once here so its declared
    /// controls can be checked up front rather than on every activation.
    pub fn register<F>(
        &mut self,
        config: &'static PageConfig,
        factory: F,
    ) -> Result<()>
    where
        F: Fn() -> Box<dyn Page> + Send + Sync + 'static,
    {
        let name = config.name.to_string();
        if self.entries.contains_key(&name) {
            return Err(PanelError::DuplicatePage(name));
        }

        let invalid = |reason: String| PanelError::InvalidPage {
            page: name.clone(),
            reason,
        };

        if name.is_empty() {
            return Err(invalid("empty page name".to_string()));
        }
        if config.owner.is_empty() {
            return Err(invalid("empty owner".to_string()));
        }

        let controls = panic::catch_unwind(AssertUnwindSafe(|| {
            factory().controls()
        }))
        .map_err(|payload| {
            invalid(format!(
                "factory panicked: {}",
                panic_message(payload.as_ref())
            ))
        })?;
        let mut seen = HashSet::default();
        for descriptor in &controls {
            if !descriptor.slot.is_valid() {
                return Err(invalid(format!(
                    "slot {} is out of range",
                    descriptor.slot
                )));
            }
            if !seen.insert(descriptor.slot) {
                return Err(invalid(format!(
                    "slot {} declared twice",
                    descriptor.slot
                )));
            }
        }

        self.entries.insert(
            name,
            PageEntry {
                config,
                factory: Box::new(factory),
                controls,
            },
        );

        Ok(())
    }

    pub fn define_mode(
        &mut self,
        name: impl Into<String>,
        enabled: bool,
        pages: Vec<String>,
    ) -> Result<()> {
        let name = name.into();

        if self.modes.iter().any(|m| m.name == name) {
            return Err(PanelError::Configuration(format!(
                "mode '{}' defined twice",
                name
            )));
        }

        for page in &pages {
            if !self.entries.contains_key(page) {
                return Err(PanelError::UnknownPage(format!(
                    "{} (referenced by mode '{}')",
                    page, name
                )));
            }
        }

        self.modes.push(Mode {
            name,
            enabled,
            pages,
        });

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&PageEntry> {
        self.entries.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn page_names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn first_page_name(&self) -> Option<&str> {
        self.entries.keys().next().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn modes(&self) -> &[Mode] {
        &self.modes
    }

    pub fn mode(&self, name: &str) -> Option<&Mode> {
        self.modes.iter().find(|m| m.name == name)
    }

    /// First enabled mode listing `page`.
    pub fn mode_of(&self, page: &str) -> Option<&Mode> {
        self.modes
            .iter()
            .filter(|m| m.enabled)
            .find(|m| m.pages.iter().any(|p| p == page))
    }

    /// Fallback page for every owner: its first page in the first enabled
    /// mode that lists one, else its first registered page.
    pub fn owner_home_pages(&self) -> BTreeMap<String, String> {
        let from_modes = self
            .modes
            .iter()
            .filter(|m| m.enabled)
            .flat_map(|m| m.pages.iter());
        let mut homes = BTreeMap::new();
        for page in from_modes.chain(self.entries.keys()) {
            if let Some(entry) = self.entries.get(page) {
                homes
                    .entry(entry.config.owner.to_string())
                    .or_insert_with(|| page.clone());
            }
        }
        homes
    }

    /// Pages to cycle through when in `mode`, or every page when no mode is
    /// active.
    pub fn cycle(&self, mode: Option<&str>) -> Vec<String> {
        match mode.and_then(|m| self.mode(m)) {
            Some(mode) => mode.pages.clone(),
            None => self.entries.keys().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::pages::page::RenderContext;
    use crate::render::dirty::DirtyRegion;
    use crate::render::scheduler::RateTier;
    use crate::render::surface::Surface;

    struct TestPage {
        controls: Vec<ControlDescriptor>,
    }

    impl Page for TestPage {
        fn controls(&self) -> Vec<ControlDescriptor> {
            self.controls.clone()
        }

        fn render(
            &mut self,
            _: &mut dyn Surface,
            _: &mut RenderContext,
            _: &[DirtyRegion],
        ) -> Vec<Rect> {
            Vec::new()
        }
    }

    static CONFIG: PageConfig = PageConfig {
        name: "test",
        display_name: "Test",
        owner: "synth",
        tier: RateTier::Normal,
        partial_redraw: true,
        continuous: false,
    };

    fn good() -> Box<dyn Page> {
        Box::new(TestPage {
            controls: vec![ControlDescriptor::dial(1, "A", 0.0, 1.0)],
        })
    }

    #[test]
    fn registry_registers_and_lists_names() {
        let mut registry = PageRegistry::new();
        registry.register(&CONFIG, good).expect("register test page");

        assert_eq!(registry.page_names(), vec!["test"]);
        assert_eq!(registry.first_page_name(), Some("test"));
        assert!(registry.has("test"));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn registry_rejects_duplicates() {
        let mut registry = PageRegistry::new();
        registry.register(&CONFIG, good).expect("first register");
        let err = registry
            .register(&CONFIG, good)
            .expect_err("duplicate page must fail");
        assert!(matches!(err, PanelError::DuplicatePage(_)));
    }

    #[test]
    fn registry_validates_declared_controls_once() {
        let mut registry = PageRegistry::new();
        let err = registry
            .register(&CONFIG, || {
                Box::new(TestPage {
                    controls: vec![
                        ControlDescriptor::dial(1, "A", 0.0, 1.0),
                        ControlDescriptor::dial(1, "B", 0.0, 1.0),
                    ],
                })
            })
            .expect_err("duplicate slot must fail");
        assert!(matches!(err, PanelError::InvalidPage { .. }));
        assert!(!registry.has("test"));
    }

    #[test]
    fn registry_rejects_a_panicking_factory() {
        let mut registry = PageRegistry::new();
        let err = registry
            .register(&CONFIG, || panic!("no layout"))
            .expect_err("panicking factory must fail");
        match err {
            PanelError::InvalidPage { reason, .. } => {
                assert!(reason.contains("no layout"))
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn owner_home_pages_prefer_the_first_enabled_mode() {
        static SYNTH_B: PageConfig = PageConfig {
            name: "synth-b",
            display_name: "Synth B",
            owner: "synth",
            tier: RateTier::Normal,
            partial_redraw: true,
            continuous: false,
        };
        static DRUMS: PageConfig = PageConfig {
            name: "kit",
            display_name: "Kit",
            owner: "drums",
            tier: RateTier::Normal,
            partial_redraw: true,
            continuous: false,
        };
        let mut registry = PageRegistry::new();
        registry.register(&CONFIG, good).expect("register");
        registry.register(&SYNTH_B, good).expect("register");
        registry.register(&DRUMS, good).expect("register");
        registry
            .define_mode("off", false, vec!["test".to_string()])
            .expect("mode");
        registry
            .define_mode("main", true, vec!["synth-b".to_string()])
            .expect("mode");

        let homes = registry.owner_home_pages();
        assert_eq!(homes.get("synth").map(String::as_str), Some("synth-b"));
        assert_eq!(homes.get("drums").map(String::as_str), Some("kit"));
        assert_eq!(homes.len(), 2);
    }

    #[test]
    fn registry_rejects_mode_with_unknown_page() {
        let mut registry = PageRegistry::new();
        registry.register(&CONFIG, good).expect("register");

        let err = registry
            .define_mode(
                "bad",
                true,
                vec!["test".to_string(), "missing".to_string()],
            )
            .expect_err("mode should fail when page is unknown");
        assert!(matches!(err, PanelError::UnknownPage(_)));

        registry
            .define_mode("main", true, vec!["test".to_string()])
            .expect("mode");
        let mode = registry.mode_of("test").map(|m| m.name.as_str());
        assert_eq!(mode, Some("main"));
        assert_eq!(registry.cycle(Some("main")), vec!["test"]);
    }
}
