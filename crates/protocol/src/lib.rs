//! plaza-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert den Nachrichten-Umschlag, alle Client- und
//! Server-Events sowie das frame-basierte Wire-Format.

pub mod control;
pub mod wire;

pub use control::{ClientEvent, ControlMessage, ErrorCode, ServerEvent};
pub use wire::FrameCodec;
