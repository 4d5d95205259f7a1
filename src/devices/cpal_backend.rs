//! cpal-basierter Zugriff auf Audio-Geräte
//!
//! cpal kennt keine stabilen Geräte-IDs, daher dient der Gerätename als
//! ID und als Hardware-ID. Das Standardgerät wird zusätzlich unter dem
//! Sentinel `default` gelistet.

use super::registry::{DeviceDescriptor, DeviceError, DeviceKind, MediaDevices, DEFAULT_DEVICE_ID};
use cpal::traits::{DeviceTrait, HostTrait};
use futures::future::BoxFuture;

/// MediaDevices Implementierung für Desktop-Hosts
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalMediaDevices;

impl CpalMediaDevices {
    pub fn new() -> Self {
        Self
    }
}

impl MediaDevices for CpalMediaDevices {
    fn request_permission(&self) -> BoxFuture<'static, Result<(), DeviceError>> {
        Box::pin(async {
            tokio::task::spawn_blocking(probe_input)
                .await
                .map_err(|e| DeviceError::PermissionDenied(e.to_string()))?
        })
    }

    fn enumerate(&self) -> BoxFuture<'static, Result<Vec<DeviceDescriptor>, DeviceError>> {
        Box::pin(async {
            tokio::task::spawn_blocking(enumerate_devices)
                .await
                .map_err(|e| DeviceError::Enumeration(e.to_string()))?
        })
    }
}

/// Öffnet die Konfiguration des Standard-Mikrofons
fn probe_input() -> Result<(), DeviceError> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| DeviceError::PermissionDenied("No audio input device found".to_string()))?;

    device
        .default_input_config()
        .map_err(|e| DeviceError::PermissionDenied(e.to_string()))?;

    tracing::info!(
        "Audio input available: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    Ok(())
}

fn enumerate_devices() -> Result<Vec<DeviceDescriptor>, DeviceError> {
    let host = cpal::default_host();

    let default_input = host.default_input_device().and_then(|d| d.name().ok());
    let default_output = host.default_output_device().and_then(|d| d.name().ok());

    let input_names: Vec<String> = host
        .input_devices()
        .map_err(|e| DeviceError::Enumeration(e.to_string()))?
        .filter_map(|d| d.name().ok())
        .collect();

    let output_names: Vec<String> = host
        .output_devices()
        .map_err(|e| DeviceError::Enumeration(e.to_string()))?
        .filter_map(|d| d.name().ok())
        .collect();

    let mut devices = Vec::with_capacity(input_names.len() + output_names.len() + 2);
    push_kind(&mut devices, DeviceKind::Input, default_input, input_names);
    push_kind(&mut devices, DeviceKind::Output, default_output, output_names);
    Ok(devices)
}

fn push_kind(
    devices: &mut Vec<DeviceDescriptor>,
    kind: DeviceKind,
    default_name: Option<String>,
    names: Vec<String>,
) {
    // Standardgerät zuerst, wie es Browser ebenfalls tun
    if let Some(name) = default_name {
        devices.push(DeviceDescriptor {
            id: DEFAULT_DEVICE_ID.to_string(),
            kind,
            label: format!("Default - {}", name),
            raw_hardware_id: name,
        });
    }

    devices.extend(names.into_iter().map(|name| DeviceDescriptor {
        id: name.clone(),
        kind,
        label: name.clone(),
        raw_hardware_id: name,
    }));
}
