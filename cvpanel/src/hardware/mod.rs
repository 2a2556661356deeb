pub mod ingress;
pub mod midi;

pub use ingress::HardwareIngress;
pub use midi::{CcBinding, CcMap, decode_control_change};

#[cfg(feature = "midi")]
pub use midi::{MidiListener, list_input_ports};
