//! Owns what is currently displayed and performs page transitions.
//!
//! A transition runs with the target page marked transitioning in the dirty
//! tracker, so the scheduler renders nothing of it until its descriptors,
//! configuration and values are complete:
//!
//! 1. mark the target transitioning
//! 2. rebuild its descriptors and records
//! 3. configure it (late widget controls included), resolve every control,
//!    and only then record the visit
//! 4. invalidate the whole page
//! 5. clear the transitioning mark, whatever happened in 2-4

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serde_json::Value;

use super::page::{ConfigureContext, Page, PageConfig};
use super::registry::{PageEntry, PageRegistry};
use super::widget::WidgetSet;
use crate::core::error::{PanelError, Result};
use crate::core::util::{HashMap, panic_message};
use crate::geometry::Rect;
use crate::params::descriptor::{ControlDescriptor, PageKey};
use crate::params::store::{ParameterStore, SharedStore};
use crate::render::dirty::DirtyTracker;
use crate::render::scheduler::PageCapabilities;
use crate::warn_throttled;

pub struct ActivePage {
    pub key: PageKey,
    pub config: &'static PageConfig,
    pub page: Box<dyn Page>,
    pub widgets: WidgetSet,
    /// Present when configuration failed; the page shows whatever state
    /// could be resolved.
    pub configure_error: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransitionReport {
    pub from: Option<PageKey>,
    pub to: PageKey,
    pub duration: Duration,
    pub first_visit: bool,
    pub resolved_controls: usize,
    pub configure_error: Option<String>,
}

/// Keeps a page marked transitioning for as long as it lives.
struct TransitionScope<'a> {
    tracker: &'a DirtyTracker,
    key: &'a PageKey,
}

impl<'a> TransitionScope<'a> {
    fn begin(tracker: &'a DirtyTracker, key: &'a PageKey) -> Self {
        tracker.begin_transition(key);
        Self { tracker, key }
    }
}

impl Drop for TransitionScope<'_> {
    fn drop(&mut self) {
        self.tracker.end_transition(self.key);
    }
}

pub struct ModeController {
    registry: PageRegistry,
    store: SharedStore,
    tracker: DirtyTracker,
    screen: Rect,
    slow_transition: Duration,
    active: Option<ActivePage>,
    active_mode: Option<String>,
    owner_pages: BTreeMap<String, String>,
    home_pages: Arc<BTreeMap<String, String>>,
    widget_states: HashMap<PageKey, Vec<(String, Value)>>,
    transitions: u64,
}

impl ModeController {
    /// `slow_transition` is one frame at the slowest configured rate; longer
    /// transitions are logged as stutters.
    ///
    /// Home pages get their declared controls in the store right away so
    /// hardware can drive an owner before any of its pages is shown.
    pub fn new(
        registry: PageRegistry,
        store: SharedStore,
        tracker: DirtyTracker,
        slow_transition: Duration,
    ) -> Self {
        let home_pages = Arc::new(registry.owner_home_pages());
        seed_home_pages(&registry, &home_pages, &mut store.lock());
        Self {
            screen: tracker.screen(),
            home_pages,
            registry,
            store,
            tracker,
            slow_transition,
            active: None,
            active_mode: None,
            owner_pages: BTreeMap::new(),
            widget_states: HashMap::default(),
            transitions: 0,
        }
    }

    pub fn registry(&self) -> &PageRegistry {
        &self.registry
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn active(&self) -> Option<&ActivePage> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut ActivePage> {
        self.active.as_mut()
    }

    pub fn active_key(&self) -> Option<&PageKey> {
        self.active.as_ref().map(|a| &a.key)
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.config.name)
    }

    pub fn active_mode(&self) -> Option<&str> {
        self.active_mode.as_deref()
    }

    pub fn capabilities(&self) -> PageCapabilities {
        self.active
            .as_ref()
            .map(|a| a.config.capabilities())
            .unwrap_or_default()
    }

    pub fn owner_pages(&self) -> &BTreeMap<String, String> {
        &self.owner_pages
    }

    /// Page each owner's hardware falls back to before any of its pages has
    /// been shown.
    pub fn home_pages(&self) -> &Arc<BTreeMap<String, String>> {
        &self.home_pages
    }

    pub fn is_transitioning(&self, key: &PageKey) -> bool {
        self.tracker.is_transitioning(key)
    }

    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Makes `name` the displayed page. Only an unknown page name is an
    /// error; configuration failures are reported in the returned
    /// [`TransitionReport`] and the page is shown anyway.
    pub fn switch_to(&mut self, name: &str) -> Result<TransitionReport> {
        let entry = self
            .registry
            .get(name)
            .ok_or_else(|| PanelError::UnknownPage(name.to_string()))?;
        let config = entry.config;
        let (mut page, controls) = instantiate_isolated(entry)?;
        let key = config.key();
        let started = Instant::now();

        let from = self.leave();
        self.tracker.show_page(Some(key.clone()));
        info!(
            "transition {} -> {}",
            from.as_ref()
                .map(|k| k.to_string())
                .unwrap_or_else(|| "-".to_string()),
            key
        );

        let mut widgets = WidgetSet::new();
        let (outcome, first_visit, resolved_controls) = {
            let _scope = TransitionScope::begin(&self.tracker, &key);
            let mut store = self.store.lock();
            let first_visit = !store.is_visited(&key);

            let outcome = store.rebuild_page(&key, controls).and_then(
                |()| {
                    configure_isolated(
                        page.as_mut(),
                        &key,
                        self.screen,
                        &mut store,
                        &mut widgets,
                    )
                },
            );

            if let Some(states) = self.widget_states.get(&key) {
                for (id, state) in states {
                    widgets.restore_state(id, state);
                }
            }

            // Late widget controls are registered by now, so this covers
            // them before the visit is recorded.
            let resolved_controls = store.resolve_page(&key);
            match &outcome {
                Ok(()) => {
                    store.mark_visited(&key);
                }
                Err(e) => error!("configuring {} failed: {}", key, e),
            }

            self.tracker.invalidate_all(Some(key.clone()));
            (outcome, first_visit, resolved_controls)
        };

        let duration = started.elapsed();
        if duration > self.slow_transition {
            warn_throttled!(
                Duration::from_secs(1),
                "transition to {} took {:?}, more than one frame ({:?})",
                key, duration, self.slow_transition
            );
        } else {
            debug!("transition to {} took {:?}", key, duration);
        }

        self.owner_pages
            .insert(key.owner.clone(), key.page.clone());

        let in_active_mode = self
            .active_mode
            .as_deref()
            .and_then(|m| self.registry.mode(m))
            .is_some_and(|m| m.pages.iter().any(|p| p == name));
        if !in_active_mode {
            self.active_mode =
                self.registry.mode_of(name).map(|m| m.name.clone());
        }

        let configure_error = outcome.err().map(|e| e.to_string());
        self.active = Some(ActivePage {
            key: key.clone(),
            config,
            page,
            widgets,
            configure_error: configure_error.clone(),
        });
        self.transitions += 1;

        Ok(TransitionReport {
            from,
            to: key,
            duration,
            first_visit,
            resolved_controls,
            configure_error,
        })
    }

    /// Enters `mode` at its first page.
    pub fn switch_mode(&mut self, mode: &str) -> Result<TransitionReport> {
        let found = self
            .registry
            .mode(mode)
            .ok_or_else(|| PanelError::UnknownMode(mode.to_string()))?;
        if !found.enabled {
            return Err(PanelError::Configuration(format!(
                "mode '{}' is disabled",
                mode
            )));
        }
        let first = found.pages.first().cloned().ok_or_else(|| {
            PanelError::Configuration(format!("mode '{}' has no pages", mode))
        })?;

        self.active_mode = Some(mode.to_string());
        self.switch_to(&first)
    }

    pub fn next_page(&mut self) -> Result<TransitionReport> {
        self.step(1)
    }

    pub fn previous_page(&mut self) -> Result<TransitionReport> {
        self.step(-1)
    }

    fn step(&mut self, offset: isize) -> Result<TransitionReport> {
        let cycle = self.registry.cycle(self.active_mode.as_deref());
        if cycle.is_empty() {
            return Err(PanelError::UnknownPage(
                "no pages registered".to_string(),
            ));
        }

        let len = cycle.len() as isize;
        let next = self
            .active_name()
            .and_then(|name| cycle.iter().position(|p| p == name))
            .map(|i| (i as isize + offset).rem_euclid(len) as usize)
            .unwrap_or(0);

        let name = cycle[next].clone();
        self.switch_to(&name)
    }

    /// Tears down the active page, e.g. on shutdown.
    pub fn deactivate(&mut self) {
        self.leave();
    }

    fn leave(&mut self) -> Option<PageKey> {
        let mut active = self.active.take()?;

        let states = active.widgets.save_states();
        if !states.is_empty() {
            self.widget_states.insert(active.key.clone(), states);
        }

        let page = &mut active.page;
        if let Err(payload) =
            panic::catch_unwind(AssertUnwindSafe(|| page.teardown()))
        {
            error!(
                "teardown of {} panicked: {}",
                active.key,
                panic_message(payload.as_ref())
            );
        }

        self.tracker.discard_page(&active.key);
        Some(active.key)
    }
}

fn seed_home_pages(
    registry: &PageRegistry,
    home_pages: &BTreeMap<String, String>,
    store: &mut ParameterStore,
) {
    for page in home_pages.values() {
        let Some(entry) = registry.get(page) else {
            continue;
        };
        let key = entry.config.key();
        let controls = entry.declared_controls().to_vec();
        if let Err(e) = store.rebuild_page(&key, controls) {
            warn!("home page {} left unseeded: {}", key, e);
        }
    }
}

/// Builds a fresh page and its placeholder controls. Runs before the
/// current page is left, so a panicking factory keeps it on screen.
fn instantiate_isolated(
    entry: &PageEntry,
) -> Result<(Box<dyn Page>, Vec<ControlDescriptor>)> {
    panic::catch_unwind(AssertUnwindSafe(|| {
        let page = entry.instantiate();
        let controls = page.controls();
        (page, controls)
    }))
    .map_err(|payload| {
        PanelError::Configuration(format!(
            "building page '{}' panicked: {}",
            entry.config.name,
            panic_message(payload.as_ref())
        ))
    })
}

/// Runs the page's configure step, turning a panic into a configuration
/// error.
fn configure_isolated(
    page: &mut dyn Page,
    key: &PageKey,
    screen: Rect,
    store: &mut ParameterStore,
    widgets: &mut WidgetSet,
) -> Result<()> {
    let mut ctx = ConfigureContext::new(key, screen, store, widgets);
    panic::catch_unwind(AssertUnwindSafe(|| page.configure(&mut ctx)))
        .unwrap_or_else(|payload| {
            Err(PanelError::Configuration(format!(
                "configure panicked: {}",
                panic_message(payload.as_ref())
            )))
        })
}
