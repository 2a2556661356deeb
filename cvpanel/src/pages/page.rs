use std::time::{Duration, Instant};

use crate::core::error::{PanelError, Result};
use crate::geometry::Rect;
use crate::params::descriptor::{ControlDescriptor, PageKey, Slot};
use crate::params::store::{ControlState, ParameterStore};
use crate::pipeline::events::PendingEvent;
use crate::pipeline::queue::EventQueue;
use crate::render::dirty::DirtyRegion;
use crate::render::scheduler::{PageCapabilities, RateTier};
use crate::render::surface::{Color, Surface};
use crate::theme::ThemeCache;
use crate::warn_throttled;

use super::widget::{Widget, WidgetSet};

/// Static description of a page, declared next to its implementation.
#[derive(Debug)]
pub struct PageConfig {
    pub name: &'static str,
    pub display_name: &'static str,
    /// Device or module whose controls the page edits.
    pub owner: &'static str,
    pub tier: RateTier,
    pub partial_redraw: bool,
    pub continuous: bool,
}

impl PageConfig {
    pub fn key(&self) -> PageKey {
        PageKey::new(self.owner, self.name)
    }

    pub fn capabilities(&self) -> PageCapabilities {
        PageCapabilities {
            tier: self.tier,
            partial_redraw: self.partial_redraw,
            continuous: self.continuous,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEvent {
    Press { x: i32, y: i32 },
    Drag { x: i32, y: i32, dx: f32, dy: f32 },
    Release { x: i32, y: i32 },
    /// Relative turn of a physical encoder bound to a slot.
    Encoder { slot: Slot, delta: f32 },
}

impl InputEvent {
    pub fn position(&self) -> Option<(i32, i32)> {
        match *self {
            InputEvent::Press { x, y }
            | InputEvent::Drag { x, y, .. }
            | InputEvent::Release { x, y } => Some((x, y)),
            InputEvent::Encoder { .. } => None,
        }
    }
}

/// A page bundle. The registry creates one instance per activation.
pub trait Page: Send {
    /// Descriptors installed before configuration. Labels may be generic;
    /// `configure` can refine them.
    fn controls(&self) -> Vec<ControlDescriptor>;

    /// Applies the page's layout, initial values and widgets. An error
    /// leaves the page visible with whatever state was resolved.
    fn configure(&mut self, _ctx: &mut ConfigureContext) -> Result<()> {
        Ok(())
    }

    /// Draws the dirty parts of the page and returns the rectangles that
    /// actually changed.
    fn render(
        &mut self,
        surface: &mut dyn Surface,
        ctx: &mut RenderContext,
        dirty: &[DirtyRegion],
    ) -> Vec<Rect>;

    fn handle_input(
        &mut self,
        _event: &InputEvent,
        _ctx: &mut InputContext,
    ) -> bool {
        false
    }

    /// Called every tick for continuous pages. Returns regions that changed
    /// since the last poll.
    fn poll_dirty(&mut self, _now: Instant) -> Vec<Rect> {
        Vec::new()
    }

    fn teardown(&mut self) {}
}

/// Handed to [`Page::configure`] while the page is marked transitioning.
pub struct ConfigureContext<'a> {
    key: &'a PageKey,
    screen: Rect,
    store: &'a mut ParameterStore,
    widgets: &'a mut WidgetSet,
}

impl<'a> ConfigureContext<'a> {
    pub(crate) fn new(
        key: &'a PageKey,
        screen: Rect,
        store: &'a mut ParameterStore,
        widgets: &'a mut WidgetSet,
    ) -> Self {
        Self {
            key,
            screen,
            store,
            widgets,
        }
    }

    pub fn key(&self) -> &PageKey {
        self.key
    }

    pub fn owner(&self) -> &str {
        &self.key.owner
    }

    pub fn screen(&self) -> Rect {
        self.screen
    }

    pub fn store(&self) -> &ParameterStore {
        self.store
    }

    pub fn relabel(&mut self, slot: Slot, label: &str) -> Result<()> {
        self.store.relabel(self.key, slot, label)
    }

    pub fn declare_initial(&mut self, slot: Slot, value: f32) {
        self.store.declare_initial(self.key, slot, value);
    }

    pub fn declare_initial_table(
        &mut self,
        table: impl IntoIterator<Item = (Slot, f32)>,
    ) {
        self.store.declare_initial_table(self.key, table);
    }

    /// Registers a control that was not part of [`Page::controls`].
    pub fn add_control(&mut self, descriptor: ControlDescriptor) -> Result<()> {
        self.store.register_control(self.key, descriptor)
    }

    /// Validates the widget once, registers the controls it owns and keeps
    /// it for the lifetime of this activation.
    pub fn add_widget(&mut self, widget: Box<dyn Widget>) -> Result<()> {
        let controls = self.widgets.validate(self.key, self.screen, &*widget)?;
        for descriptor in controls {
            self.store.register_control(self.key, descriptor)?;
        }
        self.widgets.insert(widget);
        Ok(())
    }
}

pub struct RenderContext<'a> {
    pub key: &'a PageKey,
    pub store: &'a ParameterStore,
    pub theme: &'a mut ThemeCache,
    pub screen: Rect,
    pub frame: u64,
    pub now: Instant,
    /// The whole page is being redrawn.
    pub full: bool,
}

impl RenderContext<'_> {
    pub fn controls(&self) -> Vec<ControlState> {
        self.store.page_controls(self.key)
    }

    pub fn control(&self, slot: Slot) -> Option<ControlState> {
        let descriptor = self.store.descriptor(self.key, slot)?.clone();
        let resolved = self.store.resolve_key(self.key, slot);
        Some(ControlState {
            descriptor,
            value: resolved.value,
            source: resolved.source,
        })
    }

    pub fn color(&mut self, key: &str) -> Color {
        self.theme.color(&self.key.owner, key)
    }
}

pub struct InputContext<'a> {
    pub key: &'a PageKey,
    pub store: &'a mut ParameterStore,
    pub events: &'a EventQueue,
}

impl InputContext<'_> {
    pub fn set(&mut self, slot: Slot, value: f32) -> Result<bool> {
        self.store.set_value(self.key, slot, value)
    }

    pub fn nudge(&mut self, slot: Slot, delta: f32) -> Result<bool> {
        self.store.nudge(self.key, slot, delta)
    }

    pub fn toggle(&mut self, slot: Slot) -> Result<bool> {
        self.store.toggle(self.key, slot)
    }

    /// Queues navigation or other work for the event worker.
    pub fn emit(&self, event: PendingEvent) {
        self.events.push(event);
    }

    pub fn slot_at(&self, x: i32, y: i32) -> Option<Slot> {
        self.store
            .descriptors(self.key)
            .into_iter()
            .find(|d| d.rect.contains_point(x, y))
            .map(|d| d.slot)
    }
}

/// Vertical drag distance that sweeps a dial across its whole range.
pub const DRAG_FULL_SWEEP: f32 = 200.0;

/// Fallback input handling for the fixed control grid: pressing a button
/// advances it, dragging over a dial nudges it, encoders nudge their slot.
pub fn default_input(event: &InputEvent, ctx: &mut InputContext) -> bool {
    let result = match *event {
        InputEvent::Press { x, y } => match ctx.slot_at(x, y) {
            Some(slot @ Slot::Button(_)) => ctx.toggle(slot),
            _ => return false,
        },
        InputEvent::Drag { x, y, dy, .. } => match ctx.slot_at(x, y) {
            Some(slot @ Slot::Dial(_)) => {
                let span = ctx
                    .store
                    .descriptor(ctx.key, slot)
                    .map(|d| d.range.span())
                    .unwrap_or(0.0);
                ctx.nudge(slot, -dy / DRAG_FULL_SWEEP * span)
            }
            _ => return false,
        },
        InputEvent::Encoder { slot, delta } => ctx.nudge(slot, delta),
        InputEvent::Release { .. } => return false,
    };

    match result {
        Ok(_) => true,
        Err(PanelError::UnknownControl { .. }) => false,
        Err(e) => {
            warn_throttled!(
                Duration::from_secs(1),
                "input on {} failed: {}",
                ctx.key,
                e
            );
            false
        }
    }
}

/// Standard rendering of one control: panel, outline, label, value and, for
/// continuous ranges, a fill bar proportional to the value.
pub fn draw_control(
    surface: &mut dyn Surface,
    ctx: &mut RenderContext,
    control: &ControlState,
) {
    let rect = control.descriptor.rect;
    let (min, max) = control.descriptor.range.bounds();

    let panel = ctx.color("panel");
    let outline = ctx.color("outline");
    let label = ctx.color("label");
    let value = ctx.color("value");
    let active = ctx.color("active");

    surface.fill_rect(rect, panel);
    surface.stroke_rect(rect, outline);

    match control.descriptor.slot {
        Slot::Dial(_) => {
            let t = if max > min {
                ((control.value - min) / (max - min)).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let inner_w = rect.w.saturating_sub(16);
            let bar = Rect::new(
                rect.x + 8,
                rect.bottom() - 24,
                (inner_w as f32 * t).round() as u32,
                12,
            );
            if !bar.is_empty() {
                surface.fill_rect(bar, value);
            }
        }
        Slot::Button(_) => {
            if control.value > min {
                surface.fill_rect(
                    Rect::new(rect.x + 4, rect.y + 4, 8, 8),
                    active,
                );
            }
        }
    }

    surface.text(rect.x + 8, rect.y + 8, &control.descriptor.label, label);
    surface.text(rect.x + 8, rect.y + 28, &control.display_value(), value);
}

/// Draws every control that intersects a dirty region (or all of them on a
/// full redraw) and returns the rectangles drawn.
pub fn draw_controls(
    surface: &mut dyn Surface,
    ctx: &mut RenderContext,
    dirty: &[DirtyRegion],
) -> Vec<Rect> {
    let mut drawn = Vec::new();
    for control in ctx.controls() {
        let rect = control.descriptor.rect;
        if ctx.full || dirty.iter().any(|r| r.rect.intersects(&rect)) {
            draw_control(surface, ctx, &control);
            drawn.push(rect);
        }
    }
    drawn
}
