//! Camera device enumeration.

use nokhwa::query;
use nokhwa::utils::ApiBackend;

use super::types::{CameraError, CameraInfo};

/// Enumerate video sources, ordered by index.
///
/// An empty list is not an error; callers decide how to report it. Sources
/// the backend identifies by a non-numeric id cannot be opened by index and
/// are skipped.
pub fn list_devices() -> Result<Vec<CameraInfo>, CameraError> {
    let found = query(ApiBackend::Auto).map_err(|e| CameraError::QueryFailed(e.to_string()))?;

    let mut devices: Vec<CameraInfo> = found
        .into_iter()
        .filter_map(|d| match d.index().as_index() {
            Ok(index) => Some(CameraInfo {
                index,
                name: d.human_name(),
                description: d.description().to_string(),
                moniker: d.misc(),
            }),
            Err(_) => {
                log::debug!("Skipping source without numeric index: {}", d.human_name());
                None
            }
        })
        .collect();
    devices.sort_by_key(|d| d.index);
    Ok(devices)
}

/// Pick the device to use: the preferred index if present, otherwise the first.
///
/// Returns `None` when the list is empty.
pub fn select_default(devices: &[CameraInfo], preferred: u32) -> Option<&CameraInfo> {
    devices
        .iter()
        .find(|d| d.index == preferred)
        .or_else(|| devices.first())
}
