use cvpanel::prelude::*;

pub static PAGE_CONFIG: PageConfig = PageConfig {
    name: "oscillator",
    display_name: "Oscillator",
    owner: "synth",
    tier: RateTier::Normal,
    partial_redraw: true,
    continuous: false,
};

pub struct Oscillator;

pub fn init() -> Oscillator {
    Oscillator
}

impl Page for Oscillator {
    fn controls(&self) -> Vec<ControlDescriptor> {
        vec![
            ControlDescriptor::dial(1, "Tune", -24.0, 24.0),
            ControlDescriptor::dial(2, "Fine", -100.0, 100.0),
            ControlDescriptor::dial(3, "Shape", 0.0, 127.0),
            ControlDescriptor::dial(4, "Level", 0.0, 127.0).with_default(100.0),
            ControlDescriptor::dial(5, "Sub", 0.0, 127.0),
            ControlDescriptor::button(1, "Wave")
                .with_states(&["sine", "saw", "square", "noise"]),
            ControlDescriptor::button(2, "Sync"),
        ]
    }

    fn configure(&mut self, ctx: &mut ConfigureContext) -> Result<()> {
        ctx.declare_initial_table([
            (Slot::Dial(3), 64.0),
            (Slot::Button(1), 1.0),
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
