use std::sync::mpsc;
use std::sync::mpsc::{Receiver, Sender};

use crate::params::descriptor::PageKey;

/// Work handed back to the render thread. Background paths (the event
/// worker, MIDI callbacks) never touch the mode controller directly.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RuntimeCommand {
    ForceFullRedraw,
    NextPage,
    PreviousPage,
    Quit,
    SwitchMode(String),
    SwitchPage(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RuntimeEvent {
    FrameRendered { frame: u64, full: bool, regions: usize },
    PageSwitched(PageKey),
    TransitionFailed { page: String, error: String },
    Stopped,
}

pub type RuntimeCommandSender = Sender<RuntimeCommand>;
pub type RuntimeCommandReceiver = Receiver<RuntimeCommand>;
pub type RuntimeEventSender = Sender<RuntimeEvent>;
pub type RuntimeEventReceiver = Receiver<RuntimeEvent>;

pub fn command_channel() -> (RuntimeCommandSender, RuntimeCommandReceiver) {
    mpsc::channel()
}

pub fn event_channel() -> (RuntimeEventSender, RuntimeEventReceiver) {
    mpsc::channel()
}
