use cvpanel::prelude::*;

pub static PAGE_CONFIG: PageConfig = PageConfig {
    name: "unpatched",
    display_name: "FX (unpatched)",
    owner: "fx",
    tier: RateTier::Low,
    partial_redraw: true,
    continuous: false,
};

/// Shows what an incomplete configuration looks like: the page stays
/// usable with its placeholder labels and the status strip reports why.
pub struct Unpatched;

pub fn init() -> Unpatched {
    Unpatched
}

impl Page for Unpatched {
    fn controls(&self) -> Vec<ControlDescriptor> {
        Slot::dials().map(ControlDescriptor::placeholder).collect()
    }

    fn configure(&mut self, ctx: &mut ConfigureContext) -> Result<()> {
        ctx.relabel(Slot::Dial(1), "Mix")?;
        Err(PanelError::Configuration(
            "no effect module is patched".to_string(),
        ))
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
