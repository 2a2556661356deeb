use std::f32::consts::TAU;
use std::time::Instant;

use cvpanel::core::util::{constrain, lerp};
use cvpanel::prelude::*;

pub static PAGE_CONFIG: PageConfig = PageConfig {
    name: "scope",
    display_name: "Scope",
    owner: "scope",
    tier: RateTier::High,
    partial_redraw: true,
    continuous: true,
};

const TRACE: Rect = Rect::new(0, 160, 800, 180);
const COLUMN_W: u32 = 10;

/// A free-running sine trace between the dial row and the buttons.
pub struct Scope {
    /// Cycles per second, refreshed from the Rate dial on every render.
    rate: f32,
    phase: f32,
    last_poll: Option<Instant>,
}

pub fn init() -> Scope {
    Scope {
        rate: 1.0,
        phase: 0.0,
        last_poll: None,
    }
}

impl Page for Scope {
    fn controls(&self) -> Vec<ControlDescriptor> {
        vec![
            ControlDescriptor::dial(1, "Rate", 6.0, 240.0).with_default(60.0),
            ControlDescriptor::dial(2, "Gain", 0.0, 200.0).with_default(100.0),
        ]
    }

    fn render(
        &mut self,
        surface: &mut dyn Surface,
        ctx: &mut RenderContext,
        dirty: &[DirtyRegion],
    ) -> Vec<Rect> {
        let mut drawn = draw_controls(surface, ctx, dirty);
        if !ctx.full && !dirty.iter().any(|r| r.rect.intersects(&TRACE)) {
            return drawn;
        }

        if let Some(rate) = ctx.control(Slot::Dial(1)) {
            self.rate = rate.value / 60.0;
        }
        let gain = ctx
            .control(Slot::Dial(2))
            .map(|c| c.value / 100.0)
            .unwrap_or(1.0);

        let background = ctx.color("background");
        let trace = ctx.color("value");
        surface.fill_rect(TRACE, background);

        let top = (TRACE.y + 4) as f32;
        let bottom = (TRACE.bottom() - 4) as f32;
        let columns = TRACE.w / COLUMN_W;
        for i in 0..columns {
            let t = i as f32 / columns as f32;
            let wave = (TAU * (t + self.phase)).sin();
            let sample = (wave * gain).clamp(-1.0, 1.0);
            let y = lerp(bottom, top, (sample + 1.0) / 2.0) as i32;
            let x = TRACE.x + (i * COLUMN_W) as i32;
            surface.fill_rect(Rect::new(x, y - 1, COLUMN_W, 3), trace);
        }

        drawn.push(TRACE);
        drawn
    }

    fn poll_dirty(&mut self, now: Instant) -> Vec<Rect> {
        let elapsed = self
            .last_poll
            .map(|at| now.saturating_duration_since(at).as_secs_f32())
            .unwrap_or(0.0);
        self.last_poll = Some(now);
        let phase = self.phase + elapsed * self.rate;
        self.phase = constrain::wrap(phase, 0.0, 1.0);
        vec![TRACE]
    }
}
