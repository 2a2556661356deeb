pub mod app;
pub mod events;

pub use app::{PanelRuntime, RuntimeStats, STATUS_STRIP_HEIGHT};
pub use events::{
    RuntimeCommand, RuntimeCommandReceiver, RuntimeCommandSender,
    RuntimeEvent, RuntimeEventReceiver, RuntimeEventSender, command_channel,
    event_channel,
};
