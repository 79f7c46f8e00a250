use super::{AudioBackend, RenderUnit};
use crate::error::{OutputError, Result};
use crate::format::{AudioFormat, SampleFormat};
use crate::render::Renderer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};

/// Output through the platform's default audio host.
pub struct CpalBackend {
    host: cpal::Host,
    device_name: Option<String>,
    block_size: Option<u32>,
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
            device_name: None,
            block_size: None,
        }
    }

    /// Use the output device with this name instead of the default one.
    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    /// Ask for a fixed hardware buffer size in frames.
    pub fn block_size(mut self, frames: u32) -> Self {
        self.block_size = Some(frames);
        self
    }

    /// Names of the output devices the host currently exposes.
    pub fn output_device_names(&self) -> Result<Vec<String>> {
        let devices = self.host.output_devices().map_err(|e| {
            OutputError::AudioDevice(format!("Failed to enumerate output devices: {}", e))
        })?;
        Ok(devices.filter_map(|device| device.name().ok()).collect())
    }

    fn select_device(&self) -> Result<cpal::Device> {
        match &self.device_name {
            None => self.host.default_output_device().ok_or_else(|| {
                OutputError::AudioDevice("No default output device available".into())
            }),
            Some(name) => {
                let mut devices = self.host.output_devices().map_err(|e| {
                    OutputError::AudioDevice(format!("Failed to enumerate output devices: {}", e))
                })?;
                devices
                    .find(|device| device.name().is_ok_and(|n| n == *name))
                    .ok_or_else(|| {
                        OutputError::AudioDevice(format!("Output device '{}' not found", name))
                    })
            }
        }
    }

    fn create_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut renderer: Renderer,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| renderer.render(data),
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| OutputError::RenderUnit(format!("Failed to build stream: {}", e)))
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open(&mut self, format: &AudioFormat, renderer: Renderer) -> Result<Box<dyn RenderUnit>> {
        let device = self.select_device()?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());

        let config = cpal::StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: self
                .block_size
                .map_or(cpal::BufferSize::Default, cpal::BufferSize::Fixed),
        };

        let stream = match format.sample_format {
            SampleFormat::F32 => Self::create_stream::<f32>(&device, &config, renderer)?,
            SampleFormat::I16 => Self::create_stream::<i16>(&device, &config, renderer)?,
            SampleFormat::U16 => Self::create_stream::<u16>(&device, &config, renderer)?,
        };

        log::info!("Opened output stream on '{}' ({})", device_name, format);
        Ok(Box::new(CpalUnit {
            stream,
            device_name,
        }))
    }
}

struct CpalUnit {
    stream: cpal::Stream,
    device_name: String,
}

impl RenderUnit for CpalUnit {
    fn start(&mut self) -> Result<()> {
        self.stream.play().map_err(|e| {
            OutputError::AudioDevice(format!("Failed to start stream: {}", e))
        })
    }
}

impl Drop for CpalUnit {
    fn drop(&mut self) {
        log::debug!("Closing output stream on '{}'", self.device_name);
    }
}
