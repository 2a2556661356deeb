//! Custom widgets placed on a page in addition to the fixed control grid.
//!
//! Every widget implements the full [`Widget`] capability set; a page adds
//! widgets through its configure context, where each one is checked once.

use std::time::Instant;

use log::warn;
use serde_json::Value;

use super::page::{InputContext, InputEvent, RenderContext};
use crate::core::error::{PanelError, Result};
use crate::geometry::Rect;
use crate::params::descriptor::{ControlDescriptor, PageKey};
use crate::render::surface::Surface;

pub trait Widget: Send {
    /// Unique within its page. Keys the widget's saved state.
    fn id(&self) -> &str;

    fn rect(&self) -> Rect;

    /// Controls the widget owns. They are registered with the parameter
    /// store when the widget is added, after the page's own controls.
    fn controls(&self) -> Vec<ControlDescriptor> {
        Vec::new()
    }

    fn render(&mut self, surface: &mut dyn Surface, ctx: &mut RenderContext);

    fn handle_input(
        &mut self,
        _event: &InputEvent,
        _ctx: &mut InputContext,
    ) -> bool {
        false
    }

    /// View state that is not a parameter (zoom, scroll position) and should
    /// survive leaving and re-entering the page.
    fn get_state(&self) -> Value {
        Value::Null
    }

    fn set_state(&mut self, _state: &Value) -> Result<()> {
        Ok(())
    }

    /// True when the widget animated since the last poll.
    fn poll_dirty(&mut self, _now: Instant) -> bool {
        false
    }
}

#[derive(Default)]
pub struct WidgetSet {
    widgets: Vec<Box<dyn Widget>>,
}

impl WidgetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks a widget before it joins the set and returns its controls with
    /// their rectangles defaulted to the widget's own.
    pub(crate) fn validate(
        &self,
        key: &PageKey,
        screen: Rect,
        widget: &dyn Widget,
    ) -> Result<Vec<ControlDescriptor>> {
        let invalid = |reason: String| PanelError::InvalidPage {
            page: key.to_string(),
            reason,
        };

        let id = widget.id();
        if id.is_empty() {
            return Err(invalid("widget with empty id".to_string()));
        }
        if self.widgets.iter().any(|w| w.id() == id) {
            return Err(invalid(format!("duplicate widget id '{}'", id)));
        }

        let rect = widget.rect();
        if rect.is_empty() || !screen.contains(&rect) {
            return Err(invalid(format!(
                "widget '{}' rect {:?} is empty or off-screen",
                id, rect
            )));
        }

        let mut controls = widget.controls();
        for descriptor in &mut controls {
            if !descriptor.slot.is_valid() {
                return Err(invalid(format!(
                    "widget '{}' claims invalid slot {}",
                    id, descriptor.slot
                )));
            }
            if !rect.contains(&descriptor.rect) {
                descriptor.rect = rect;
            }
        }

        Ok(controls)
    }

    pub(crate) fn insert(&mut self, widget: Box<dyn Widget>) {
        self.widgets.push(widget);
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Widget>> {
        self.widgets.iter_mut()
    }

    pub fn ids(&self) -> Vec<String> {
        self.widgets.iter().map(|w| w.id().to_string()).collect()
    }

    /// Renders widgets touched by `dirty` (or all of them when `full`).
    pub fn render(
        &mut self,
        surface: &mut dyn Surface,
        ctx: &mut RenderContext,
        dirty: &[Rect],
    ) -> Vec<Rect> {
        let mut drawn = Vec::new();
        for widget in &mut self.widgets {
            let rect = widget.rect();
            if ctx.full || dirty.iter().any(|r| r.intersects(&rect)) {
                widget.render(surface, ctx);
                drawn.push(rect);
            }
        }
        drawn
    }

    /// Offers a positional event to the widget under it, topmost first.
    pub fn handle_input(
        &mut self,
        event: &InputEvent,
        ctx: &mut InputContext,
    ) -> bool {
        let Some((x, y)) = event.position() else {
            return false;
        };
        self.widgets
            .iter_mut()
            .rev()
            .filter(|w| w.rect().contains_point(x, y))
            .any(|w| w.handle_input(event, ctx))
    }

    pub fn poll_dirty(&mut self, now: Instant) -> Vec<Rect> {
        self.widgets
            .iter_mut()
            .filter_map(|w| w.poll_dirty(now).then(|| w.rect()))
            .collect()
    }

    pub fn save_states(&self) -> Vec<(String, Value)> {
        self.widgets
            .iter()
            .map(|w| (w.id().to_string(), w.get_state()))
            .filter(|(_, state)| !state.is_null())
            .collect()
    }

    pub fn restore_state(&mut self, id: &str, state: &Value) {
        let Some(widget) = self.widgets.iter_mut().find(|w| w.id() == id)
        else {
            return;
        };
        if let Err(e) = widget.set_state(state) {
            warn!("widget '{}' rejected its saved state: {}", id, e);
        }
    }
}

impl std::fmt::Debug for WidgetSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::descriptor::Slot;

    struct Probe {
        id: &'static str,
        rect: Rect,
        zoom: f64,
    }

    impl Widget for Probe {
        fn id(&self) -> &str {
            self.id
        }

        fn rect(&self) -> Rect {
            self.rect
        }

        fn controls(&self) -> Vec<ControlDescriptor> {
            vec![ControlDescriptor::dial(8, "Zoom", 1.0, 8.0)]
        }

        fn render(&mut self, _: &mut dyn Surface, _: &mut RenderContext) {}

        fn get_state(&self) -> Value {
            serde_json::json!({ "zoom": self.zoom })
        }

        fn set_state(&mut self, state: &Value) -> Result<()> {
            self.zoom = state["zoom"].as_f64().ok_or_else(|| {
                PanelError::Configuration("missing zoom".into())
            })?;
            Ok(())
        }
    }

    fn probe(id: &'static str, rect: Rect) -> Box<dyn Widget> {
        Box::new(Probe { id, rect, zoom: 1.0 })
    }

    const SCREEN: Rect = Rect::new(0, 0, 800, 480);

    #[test]
    fn validation_rejects_duplicates_and_offscreen_rects() {
        let key = PageKey::new("synth", "Scope");
        let mut set = WidgetSet::new();

        let scope = probe("scope", Rect::new(0, 0, 400, 160));
        let controls = set.validate(&key, SCREEN, &*scope).expect("valid");
        assert_eq!(controls[0].slot, Slot::Dial(8));
        assert_eq!(controls[0].rect, Rect::new(0, 0, 400, 160));
        set.insert(scope);

        let dup = probe("scope", Rect::new(0, 0, 10, 10));
        assert!(set.validate(&key, SCREEN, &*dup).is_err());

        let off = probe("off", Rect::new(790, 470, 50, 50));
        assert!(set.validate(&key, SCREEN, &*off).is_err());
    }

    #[test]
    fn states_round_trip_through_save_and_restore() {
        let mut set = WidgetSet::new();
        set.insert(Box::new(Probe {
            id: "scope",
            rect: Rect::new(0, 0, 10, 10),
            zoom: 4.0,
        }));
        let saved = set.save_states();
        assert_eq!(saved.len(), 1);

        let mut fresh = WidgetSet::new();
        fresh.insert(probe("scope", Rect::new(0, 0, 10, 10)));
        fresh.restore_state("scope", &saved[0].1);
        assert_eq!(fresh.save_states(), saved);
    }
}
