//! Windows Core Audio (MMDevice API) backend
use windows::core::PWSTR;
use windows::Win32::Devices::FunctionDiscovery::PKEY_Device_FriendlyName;
use windows::Win32::Media::Audio::Endpoints::IAudioEndpointVolume;
use windows::Win32::Media::Audio::{
    eRender, IMMDevice, IMMDeviceCollection, IMMDeviceEnumerator, MMDeviceEnumerator, DEVICE_STATE_ACTIVE,
};
use windows::Win32::System::Com::StructuredStorage::PropVariantClear;
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoTaskMemFree, CoUninitialize, CLSCTX_ALL, COINIT_MULTITHREADED, STGM_READ,
};

use super::{AudioBackend, AudioDeviceDescriptor, AudioError, Result};

/// COM initialization for the duration of one backend call.
///
/// If the thread already runs in another apartment the existing one is used
/// and nothing is uninitialized on drop.
struct ComScope {
    initialized: bool,
}

impl ComScope {
    fn enter() -> Self {
        let initialized = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) }.is_ok();
        Self { initialized }
    }
}

impl Drop for ComScope {
    fn drop(&mut self) {
        if self.initialized {
            unsafe { CoUninitialize() };
        }
    }
}

#[derive(Debug, Default)]
pub struct CoreAudioBackend;

impl CoreAudioBackend {
    pub fn new() -> Self {
        Self
    }

    fn active_render_endpoints() -> Result<IMMDeviceCollection> {
        unsafe {
            let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(|e| AudioError::Enumeration(format!("MMDeviceEnumerator: {}", e)))?;
            enumerator
                .EnumAudioEndpoints(eRender, DEVICE_STATE_ACTIVE)
                .map_err(|e| AudioError::Enumeration(format!("EnumAudioEndpoints: {}", e)))
        }
    }

    /// Find the live endpoint with `endpoint_id` and run `f` on its volume interface
    fn with_endpoint_volume<T>(
        endpoint_id: &str,
        f: impl FnOnce(&IAudioEndpointVolume) -> windows::core::Result<T>,
    ) -> Result<T> {
        let _com = ComScope::enter();
        let collection = Self::active_render_endpoints()?;
        let count = unsafe { collection.GetCount() }
            .map_err(|e| AudioError::Enumeration(format!("GetCount: {}", e)))?;

        for i in 0..count {
            let Ok(device) = (unsafe { collection.Item(i) }) else { continue };
            match device_id(&device) {
                Ok(id) if id == endpoint_id => {
                    let volume: IAudioEndpointVolume = unsafe { device.Activate(CLSCTX_ALL, None) }
                        .map_err(|e| AudioError::Endpoint(format!("activate volume on {}: {}", endpoint_id, e)))?;
                    return f(&volume).map_err(|e| AudioError::Endpoint(format!("{}: {}", endpoint_id, e)));
                }
                Ok(_) => {}
                Err(e) => log::debug!("Skipping endpoint {}: {}", i, e),
            }
        }

        Err(AudioError::DeviceNotFound(endpoint_id.to_string()))
    }
}

impl AudioBackend for CoreAudioBackend {
    fn render_endpoints(&self) -> Result<Vec<AudioDeviceDescriptor>> {
        let _com = ComScope::enter();
        let collection = Self::active_render_endpoints()?;
        let count = unsafe { collection.GetCount() }
            .map_err(|e| AudioError::Enumeration(format!("GetCount: {}", e)))?;

        let mut devices = Vec::with_capacity(count as usize);
        for i in 0..count {
            let device = match unsafe { collection.Item(i) } {
                Ok(device) => device,
                Err(e) => {
                    log::warn!("Skipping render endpoint {}: {}", i, e);
                    continue;
                }
            };
            match (device_id(&device), friendly_name(&device)) {
                (Ok(id), Ok(display_name)) => devices.push(AudioDeviceDescriptor { id, display_name }),
                (Err(e), _) | (_, Err(e)) => log::warn!("Skipping render endpoint {}: {}", i, e),
            }
        }

        Ok(devices)
    }

    fn volume(&self, endpoint_id: &str) -> Result<f32> {
        Self::with_endpoint_volume(endpoint_id, |volume| unsafe { volume.GetMasterVolumeLevelScalar() })
    }

    fn set_volume(&self, endpoint_id: &str, level: f32) -> Result<()> {
        Self::with_endpoint_volume(endpoint_id, |volume| unsafe {
            volume.SetMasterVolumeLevelScalar(level, std::ptr::null())
        })
    }
}

fn device_id(device: &IMMDevice) -> Result<String> {
    unsafe {
        let raw: PWSTR = device
            .GetId()
            .map_err(|e| AudioError::Endpoint(format!("GetId: {}", e)))?;
        let id = raw.to_string();
        CoTaskMemFree(Some(raw.0 as *const _));
        id.map_err(|e| AudioError::Endpoint(format!("endpoint id is not valid UTF-16: {}", e)))
    }
}

fn friendly_name(device: &IMMDevice) -> Result<String> {
    unsafe {
        let store = device
            .OpenPropertyStore(STGM_READ)
            .map_err(|e| AudioError::Endpoint(format!("OpenPropertyStore: {}", e)))?;
        let mut value = store
            .GetValue(&PKEY_Device_FriendlyName)
            .map_err(|e| AudioError::Endpoint(format!("friendly name: {}", e)))?;

        let raw = value.Anonymous.Anonymous.Anonymous.pwszVal;
        let name = if raw.is_null() { Ok(String::new()) } else { raw.to_string() };
        let _ = PropVariantClear(&mut value);

        name.map_err(|e| AudioError::Endpoint(format!("friendly name is not valid UTF-16: {}", e)))
    }
}
