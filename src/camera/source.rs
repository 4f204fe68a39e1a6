//! Frame sources: the boundary between the capture session and a camera driver.

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat as NokhwaFrameFormat, RequestedFormat,
    RequestedFormatType,
};
use nokhwa::Camera;

use super::frame_utils::{convert_to_rgb, mirror_horizontal};
use super::types::{CameraError, CameraSettings, Frame, Resolution};

/// A producer of frames, driven from the capture thread.
///
/// Implementations are created on the capture thread itself, so they do not
/// need to be `Send`.
pub trait FrameSource {
    /// Block until the next frame is available.
    ///
    /// `Ok(None)` means a frame arrived but could not be decoded and should be
    /// skipped. `Err` is a fault that ends the session.
    fn next_frame(&mut self) -> Result<Option<Frame>, CameraError>;

    /// Resolution the source actually negotiated.
    fn resolution(&self) -> Resolution;

    /// Release the device. Called once when the session ends.
    fn close(&mut self) {}
}

/// Frame source backed by a nokhwa camera.
pub struct NokhwaSource {
    camera: Camera,
    mirror: bool,
}

impl NokhwaSource {
    /// Open the camera at `settings.device_index` and start its stream.
    pub fn open(settings: &CameraSettings) -> Result<Self, CameraError> {
        let index = CameraIndex::Index(settings.device_index);
        let mut camera = open_camera_with_fallback(&index, settings)?;

        camera
            .open_stream()
            .map_err(|e| CameraError::StreamFailed(e.to_string()))?;

        let res = camera.resolution();
        log::info!(
            "Camera {} streaming at {}x{} @ {} fps",
            settings.device_index,
            res.width(),
            res.height(),
            camera.frame_rate()
        );

        Ok(Self {
            camera,
            mirror: settings.mirror,
        })
    }
}

impl FrameSource for NokhwaSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        let raw = self
            .camera
            .frame()
            .map_err(|e| CameraError::FrameFailed(e.to_string()))?;

        let Some(mut frame) = convert_to_rgb(&raw) else {
            log::debug!("Skipping undecodable {:?} frame", raw.source_frame_format());
            return Ok(None);
        };

        if self.mirror {
            mirror_horizontal(&mut frame);
        }
        Ok(Some(frame))
    }

    fn resolution(&self) -> Resolution {
        let res = self.camera.resolution();
        Resolution {
            width: res.width(),
            height: res.height(),
        }
    }

    fn close(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            log::warn!("Failed to stop camera stream: {}", e);
        }
    }
}

/// Try to open a camera with multiple format fallback strategies.
///
/// Order: NV12 closest match, MJPEG closest match, then whatever the camera
/// offers at its highest resolution.
fn open_camera_with_fallback(
    index: &CameraIndex,
    settings: &CameraSettings,
) -> Result<Camera, CameraError> {
    let requested_res =
        nokhwa::utils::Resolution::new(settings.resolution.width, settings.resolution.height);

    let format_attempts = [
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            requested_res,
            NokhwaFrameFormat::NV12,
            settings.fps,
        ))),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            requested_res,
            NokhwaFrameFormat::MJPEG,
            settings.fps,
        ))),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution),
    ];

    let mut last_error = None;
    for requested in format_attempts {
        match Camera::new(index.clone(), requested) {
            Ok(cam) => return Ok(cam),
            Err(e) => {
                log::debug!("Camera format attempt failed: {}", e);
                last_error = Some(e);
            }
        }
    }

    let message = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no format accepted".to_string());
    Err(classify_open_error(&message))
}

/// Map a driver error message to a camera error, recognizing permission failures.
fn classify_open_error(message: &str) -> CameraError {
    let msg = message.to_lowercase();
    if msg.contains("permission")
        || msg.contains("denied")
        || msg.contains("authorization")
        || msg.contains("access")
    {
        CameraError::PermissionDenied
    } else {
        CameraError::OpenFailed(message.to_string())
    }
}
