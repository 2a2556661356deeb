use cvpanel::prelude::*;

pub static PAGE_CONFIG: PageConfig = PageConfig {
    name: "envelope",
    display_name: "Envelope",
    owner: "synth",
    tier: RateTier::Normal,
    partial_redraw: true,
    continuous: false,
};

const STAGES: [&str; 4] = ["Attack", "Decay", "Sustain", "Release"];

/// Four stage dials. The labels come from the configured curve so the
/// declared controls only carry placeholders.
pub struct Envelope {
    exponential: bool,
}

pub fn init() -> Envelope {
    Envelope { exponential: true }
}

impl Page for Envelope {
    fn controls(&self) -> Vec<ControlDescriptor> {
        let mut controls: Vec<ControlDescriptor> = (1..=4)
            .map(|i| ControlDescriptor::placeholder(Slot::Dial(i)))
            .collect();
        controls.push(ControlDescriptor::button(1, "Loop"));
        controls.push(
            ControlDescriptor::button(2, "Curve").with_states(&["lin", "exp"]),
        );
        controls
    }

    fn configure(&mut self, ctx: &mut ConfigureContext) -> Result<()> {
        let suffix = if self.exponential { " ~" } else { "" };
        for (slot, stage) in Slot::dials().zip(STAGES) {
            ctx.relabel(slot, &format!("{}{}", stage, suffix))?;
        }
        ctx.declare_initial_table([
            (Slot::Dial(1), 4.0),
            (Slot::Dial(2), 40.0),
            (Slot::Dial(3), 90.0),
            (Slot::Dial(4), 60.0),
            (Slot::Button(2), f32::from(u8::from(self.exponential))),
        ]);
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
