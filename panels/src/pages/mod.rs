pub mod envelope;
pub mod oscillator;
pub mod scope;
pub mod sequencer;
pub mod unpatched;
