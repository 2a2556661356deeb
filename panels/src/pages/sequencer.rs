use std::time::Instant;

use cvpanel::params::descriptor::default_slot_rect;
use cvpanel::prelude::*;
use serde_json::{Value, json};

pub static PAGE_CONFIG: PageConfig = PageConfig {
    name: "sequencer",
    display_name: "Sequencer",
    owner: "seq",
    tier: RateTier::Normal,
    partial_redraw: true,
    continuous: true,
};

const STEPS: u8 = 8;
const ROW: Rect = Rect::new(0, 340, 640, 80);

pub struct Sequencer;

pub fn init() -> Sequencer {
    Sequencer
}

impl Page for Sequencer {
    fn controls(&self) -> Vec<ControlDescriptor> {
        vec![
            ControlDescriptor::dial(1, "Tempo", 60.0, 240.0)
                .with_default(120.0),
            ControlDescriptor::dial(2, "Swing", 0.0, 75.0),
        ]
    }

    fn configure(&mut self, ctx: &mut ConfigureContext) -> Result<()> {
        ctx.add_widget(Box::new(StepRow::default()))?;
        // The step buttons only exist once the widget is added, but the
        // pattern still applies on the first visit.
        ctx.declare_initial_table(
            (1..=STEPS).step_by(2).map(|i| (Slot::Button(i), 1.0)),
        );
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

/// Owns the step buttons and marks the playing step. Remembers where the
/// playhead was when the page is left.
#[derive(Default)]
struct StepRow {
    origin: u8,
    playhead: u8,
    steps_per_second: f32,
    started: Option<Instant>,
}

impl Widget for StepRow {
    fn id(&self) -> &str {
        "steps"
    }

    fn rect(&self) -> Rect {
        ROW
    }

    fn controls(&self) -> Vec<ControlDescriptor> {
        (1..=STEPS)
            .map(|i| ControlDescriptor::button(i, &i.to_string()))
            .collect()
    }

    fn render(&mut self, surface: &mut dyn Surface, ctx: &mut RenderContext) {
        let tempo = ctx.control(Slot::Dial(1)).map_or(120.0, |c| c.value);
        // Sixteenth notes.
        self.steps_per_second = tempo / 60.0 * 4.0;

        let slot = Slot::Button(self.playhead + 1);
        let marker = default_slot_rect(slot);
        let color = ctx.color("active");
        surface.stroke_rect(marker, color);
        surface.text(marker.x + 60, marker.y + 8, ">", color);
    }

    fn get_state(&self) -> Value {
        json!({ "playhead": self.playhead })
    }

    fn set_state(&mut self, state: &Value) -> Result<()> {
        let playhead = state["playhead"].as_u64().ok_or_else(|| {
            PanelError::Configuration("missing playhead".to_string())
        })?;
        self.origin = (playhead % u64::from(STEPS)) as u8;
        self.playhead = self.origin;
        Ok(())
    }

    fn poll_dirty(&mut self, now: Instant) -> bool {
        let started = *self.started.get_or_insert(now);
        let elapsed = now.saturating_duration_since(started).as_secs_f32();
        let advanced = (elapsed * self.steps_per_second) as u64;
        let step =
            ((u64::from(self.origin) + advanced) % u64::from(STEPS)) as u8;
        if step == self.playhead {
            return false;
        }
        self.playhead = step;
        true
    }
}
