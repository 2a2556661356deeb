pub mod controller;
pub mod macros;
pub mod page;
pub mod registry;
pub mod widget;

pub use controller::{ActivePage, ModeController, TransitionReport};
pub use page::{
    ConfigureContext, DRAG_FULL_SWEEP, InputContext, InputEvent, Page,
    PageConfig, RenderContext, default_input, draw_control, draw_controls,
};
pub use registry::{Mode, PageEntry, PageRegistry};
pub use widget::{Widget, WidgetSet};
