pub use crate::config::{
    PanelSettings, load_settings, load_settings_if_exists, save_settings,
};
pub use crate::core::error::{PanelError, Result};
pub use crate::core::logging::init_logger;
pub use crate::core::logging::{debug, error, info, trace, warn};
pub use crate::debug_throttled;
pub use crate::geometry::Rect;
pub use crate::hardware::{CcMap, HardwareIngress};
pub use crate::pages::{
    ConfigureContext, InputContext, InputEvent, ModeController, Page,
    PageConfig, PageRegistry, RenderContext, TransitionReport, Widget,
    default_input, draw_control, draw_controls,
};
pub use crate::params::{
    ControlDescriptor, ControlState, PageKey, ParameterStore, SharedStore,
    Slot, ValueRange, ValueSource,
};
pub use crate::persistence::{
    AutosaveWorker, PersistedSnapshot, SnapshotStorage, save_if_dirty,
};
pub use crate::pipeline::{
    CoreDispatcher, EventHandler, EventQueue, EventWorker, PendingEvent,
    RawValue, SnapshotCell, UiSnapshot,
};
pub use crate::register_pages;
pub use crate::render::{
    Color, DirtyRegion, DirtyTracker, FrameDecision, FrameKind,
    FrameScheduler, Layer, PageCapabilities, RateConfig, RateTier,
    RecordingSurface, SchedulerState, Surface,
};
pub use crate::runtime::{
    PanelRuntime, RuntimeCommand, RuntimeCommandSender, RuntimeEvent,
    RuntimeEventReceiver, RuntimeStats, command_channel, event_channel,
};
pub use crate::task::{StopSignal, TaskHandle};
pub use crate::theme::{Theme, ThemeCache, ThemeLookup};
pub use crate::warn_throttled;

#[cfg(feature = "midi")]
pub use crate::hardware::MidiListener;
