//! Devices Module - Audio-Geräte und Präferenzen
//!
//! Dieses Modul verwaltet:
//! - Enumeration der Ein-/Ausgabegeräte (Polling)
//! - Persistierte Geräte-Präferenz des Benutzers
//! - Auswahllisten für die Call-Oberfläche

mod cpal_backend;
mod registry;

pub use cpal_backend::CpalMediaDevices;
pub use registry::{
    normalize_label, BoundDevices, DeviceDescriptor, DeviceError, DeviceEvent, DeviceKind,
    DeviceOption, DeviceRegistry, MediaDevices, DEFAULT_DEVICE_ID,
};
