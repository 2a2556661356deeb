//! MIDI Control Change input feeding [`HardwareIngress`].

use std::fmt;

use log::{info, trace};
use serde::{Deserialize, Serialize};

use super::ingress::HardwareIngress;
use crate::core::util::HashMap;
use crate::params::descriptor::Slot;
use crate::pipeline::events::RawValue;

#[cfg(feature = "midi")]
use crate::core::error::{PanelError, Result};
#[cfg(feature = "midi")]
use midir::{Ignore, MidiInput, MidiInputConnection};

pub fn is_control_change(status: u8) -> bool {
    status & 0xF0 == 0xB0
}

/// Channel (0-15), controller number and value of a Control Change message,
/// or `None` for anything else.
pub fn decode_control_change(message: &[u8]) -> Option<(u8, u8, u8)> {
    match *message {
        [status, controller, value, ..] if is_control_change(status) => {
            Some((status & 0x0F, controller & 0x7F, value & 0x7F))
        }
        _ => None,
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CcBinding {
    pub owner: String,
    pub slot: Slot,
}

impl fmt::Display for CcBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.slot)
    }
}

/// Routes (channel, controller) pairs to an owner's control slots.
#[derive(Clone, Debug, Default)]
pub struct CcMap {
    bindings: HashMap<(u8, u8), CcBinding>,
}

/// First controller of the dial block in [`CcMap::standard`].
pub const DIAL_CC_BASE: u8 = 21;
/// First controller of the button block in [`CcMap::standard`].
pub const BUTTON_CC_BASE: u8 = 102;

impl CcMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dials on CC 21-28 and buttons on CC 102-111 of one channel.
    pub fn standard(owner: &str, channel: u8) -> Self {
        let mut map = Self::new();
        for slot in Slot::dials() {
            map.bind(channel, DIAL_CC_BASE + slot.index() - 1, owner, slot);
        }
        for slot in Slot::buttons() {
            map.bind(channel, BUTTON_CC_BASE + slot.index() - 1, owner, slot);
        }
        map
    }

    pub fn bind(
        &mut self,
        channel: u8,
        controller: u8,
        owner: &str,
        slot: Slot,
    ) {
        self.bindings.insert(
            (channel & 0x0F, controller & 0x7F),
            CcBinding {
                owner: owner.to_string(),
                slot,
            },
        );
    }

    pub fn lookup(&self, channel: u8, controller: u8) -> Option<&CcBinding> {
        self.bindings.get(&(channel, controller))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Decodes `message` and forwards it to the ingress. Returns false for
    /// messages that are not Control Change or have no binding.
    pub fn route(&self, message: &[u8], ingress: &HardwareIngress) -> bool {
        let Some((channel, controller, value)) =
            decode_control_change(message)
        else {
            return false;
        };
        match self.lookup(channel, controller) {
            Some(binding) => {
                ingress.on_control_change(
                    &binding.owner,
                    binding.slot,
                    RawValue::Midi(value),
                );
                true
            }
            None => {
                trace!("unmapped CC {} on channel {}", controller, channel);
                false
            }
        }
    }
}

/// An open MIDI input connection. The port closes when this is dropped.
#[cfg(feature = "midi")]
pub struct MidiListener {
    port: String,
    connection: Option<MidiInputConnection<()>>,
}

#[cfg(feature = "midi")]
impl MidiListener {
    pub fn connect(
        port: &str,
        map: CcMap,
        ingress: HardwareIngress,
    ) -> Result<Self> {
        let midi_in = MidiInput::new("cvpanel")
            .map_err(|e| PanelError::Midi(e.to_string()))?;

        let in_ports = midi_in.ports();
        let in_port = in_ports
            .iter()
            .find(|p| midi_in.port_name(p).unwrap_or_default() == port)
            .ok_or_else(|| {
                PanelError::Midi(format!("Unable to find input port: {}", port))
            })?
            .clone();

        let connection = midi_in
            .connect(
                &in_port,
                "cvpanel-control",
                move |stamp, message, _| {
                    trace!("MIDI message: {}, {:?}", stamp, message);
                    map.route(message, &ingress);
                },
                (),
            )
            .map_err(|e| PanelError::Midi(e.to_string()))?;

        info!("Connected MIDI input: {}", port);

        Ok(Self {
            port: port.to_string(),
            connection: Some(connection),
        })
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn close(mut self) {
        self.disconnect();
    }

    fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
            info!("Closed MIDI input: {}", self.port);
        }
    }
}

#[cfg(feature = "midi")]
impl Drop for MidiListener {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(feature = "midi")]
pub fn list_input_ports() -> Result<Vec<(usize, String)>> {
    let mut midi_in = MidiInput::new("cvpanel-list")
        .map_err(|e| PanelError::Midi(e.to_string()))?;
    midi_in.ignore(Ignore::None);
    let mut ports = vec![];
    for (i, p) in midi_in.ports().iter().enumerate() {
        let name = midi_in
            .port_name(p)
            .map_err(|e| PanelError::Midi(e.to_string()))?;
        ports.push((i, name));
    }
    Ok(ports)
}
