use anyhow::Context;
use cpal::Device;
use cpal::traits::{DeviceTrait, HostTrait};

fn get_host() -> cpal::Host {
    cpal::default_host()
}

/// Returns the output device named `device_name`, or the host default.
pub fn get_or_default_output(device_name: Option<&str>) -> anyhow::Result<Device> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());
    match device_name {
        None => host
            .default_output_device()
            .context("No default output device"),
        Some(target) => host
            .output_devices()
            .context("Failed to enumerate output devices")?
            .find(|d| d.name().is_ok_and(|name| name == target))
            .with_context(|| format!("Output device '{target}' not found")),
    }
}

/// One line per output device with its default config; the default device is marked.
pub fn available_outputs() -> anyhow::Result<String> {
    for host in cpal::available_hosts() {
        tracing::debug!("Available host: {:?}", host);
    }

    let host = get_host();
    let default_device = host
        .default_output_device()
        .and_then(|d| d.name().ok());
    let mut device_names: Vec<String> = Vec::new();
    for out_device in host
        .output_devices()
        .context("Failed to enumerate output devices")?
    {
        let Ok(name) = out_device.name() else {
            continue;
        };
        let line = match out_device.default_output_config() {
            Ok(cfg) => describe_device(
                &name,
                cfg.channels(),
                cfg.sample_rate().0,
                default_device.as_deref() == Some(name.as_str()),
            ),
            Err(e) => {
                tracing::debug!("Skipping {}: {}", name, e);
                continue;
            }
        };
        device_names.push(line);
    }
    Ok(device_names.join("\n"))
}

fn describe_device(name: &str, channels: u16, sample_rate: u32, is_default: bool) -> String {
    let mut d = format!(" * {}({}ch, {}hz)", name, channels, sample_rate);
    if is_default {
        d.push_str(" [default]");
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_device_marks_default() {
        assert_eq!(
            describe_device("Speakers", 2, 48000, true),
            " * Speakers(2ch, 48000hz) [default]"
        );
        assert_eq!(
            describe_device("HDMI", 8, 44100, false),
            " * HDMI(8ch, 44100hz)"
        );
    }
}
