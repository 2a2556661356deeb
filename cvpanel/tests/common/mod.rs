#![allow(dead_code)]

use std::path::Path;
use std::time::{Duration, Instant};

use cvpanel::prelude::*;
use cvpanel::render::surface::RecordedFrame;
use serde_json::{Value, json};

/// Eight dials labelled `<prefix> <n>` plus one button.
pub struct GridPage {
    pub prefix: &'static str,
    pub initial: Vec<(Slot, f32)>,
    pub fail: bool,
    pub late_widget: bool,
}

impl GridPage {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            initial: Vec::new(),
            fail: false,
            late_widget: false,
        }
    }
}

impl Page for GridPage {
    fn controls(&self) -> Vec<ControlDescriptor> {
        let mut controls: Vec<ControlDescriptor> =
            Slot::dials().map(ControlDescriptor::placeholder).collect();
        controls.push(ControlDescriptor::button(1, "Run"));
        controls
    }

    fn configure(&mut self, ctx: &mut ConfigureContext) -> Result<()> {
        for slot in Slot::dials() {
            let label = format!("{} {}", self.prefix, slot.index());
            ctx.relabel(slot, &label)?;
        }
        ctx.declare_initial_table(self.initial.iter().copied());
        if self.late_widget {
            ctx.add_widget(Box::new(HoldWidget::default()))?;
        }
        if self.fail {
            return Err(PanelError::Configuration(format!(
                "{} layout is missing",
                self.prefix
            )));
        }
        Ok(())
    }

    fn render(
        &mut self,
        surface: &mut dyn Surface,
        ctx: &mut RenderContext,
        dirty: &[DirtyRegion],
    ) -> Vec<Rect> {
        draw_controls(surface, ctx, dirty)
    }
}

/// Registers button 5 only once the page is configured, and remembers a
/// zoom level across activations.
#[derive(Default)]
pub struct HoldWidget {
    pub zoom: u64,
}

impl Widget for HoldWidget {
    fn id(&self) -> &str {
        "hold"
    }

    fn rect(&self) -> Rect {
        Rect::new(320, 340, 80, 80)
    }

    fn controls(&self) -> Vec<ControlDescriptor> {
        vec![ControlDescriptor::button(5, "Hold")]
    }

    fn render(&mut self, surface: &mut dyn Surface, ctx: &mut RenderContext) {
        let color = ctx.color("active");
        surface.text(328, 400, &format!("zoom {}", self.zoom), color);
    }

    fn handle_input(
        &mut self,
        event: &InputEvent,
        _ctx: &mut InputContext,
    ) -> bool {
        if let InputEvent::Press { .. } = event {
            self.zoom += 1;
            return true;
        }
        false
    }

    fn get_state(&self) -> Value {
        json!({ "zoom": self.zoom })
    }

    fn set_state(&mut self, state: &Value) -> Result<()> {
        self.zoom = state["zoom"].as_u64().unwrap_or(0);
        Ok(())
    }
}

pub fn page_config(
    name: &'static str,
    owner: &'static str,
) -> &'static PageConfig {
    Box::leak(Box::new(PageConfig {
        name,
        display_name: name,
        owner,
        tier: RateTier::Normal,
        partial_redraw: true,
        continuous: false,
    }))
}

pub fn settings(dir: &Path) -> PanelSettings {
    PanelSettings {
        storage_dir: dir.to_string_lossy().into_owned(),
        autosave_interval_ms: 50,
        shutdown_timeout_ms: 2000,
        ..PanelSettings::default()
    }
}

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_for(
    timeout: Duration,
    mut condition: impl FnMut() -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub fn frame_texts(frame: &RecordedFrame) -> Vec<String> {
    frame.texts().map(str::to_string).collect()
}
