// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::ConfigError;
use crate::autosampler::{AutoSampler, AutoSamplerSettings};
use crate::engine::{ControlId, Controls, Engine};
use crate::zones::LibraryHandle;

/// Prefix of environment variables that override the config file.
pub const ENV_PREFIX: &str = "AUTOSAMPLER";

/// Engine configuration.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// The sample rate the engine renders at.
    pub sample_rate: u32,
    /// Frames per block when the engine is driven offline.
    pub block_size: usize,
    /// The number of voices.
    pub max_voices: usize,
    /// Pass input through to the output while a run is armed.
    pub monitor_input: bool,
    /// Initial control values by control name.
    pub controls: HashMap<String, f32>,
    /// Settings for auto-sampling runs.
    pub autosampler: AutoSamplerSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: 44100,
            block_size: 512,
            max_voices: 32,
            monitor_input: true,
            controls: HashMap::new(),
            autosampler: AutoSamplerSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Loads the configuration from an optional YAML file, then applies `AUTOSAMPLER_*`
    /// environment variables on top. Nested keys use a double underscore, e.g.
    /// `AUTOSAMPLER_AUTOSAMPLER__START_NOTE`.
    pub fn load(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        EngineConfig::build(builder.add_source(environment()))
    }

    /// Deserializes the configuration from a builder with every source already added.
    pub fn build(builder: ConfigBuilder<DefaultState>) -> Result<EngineConfig, ConfigError> {
        let config = builder.build()?.try_deserialize::<EngineConfig>()?;
        debug!(config = ?config, "Loaded engine config");
        Ok(config)
    }

    /// Sets every configured control. Fails on the first unknown control name, leaving the
    /// controls set before it in place.
    pub fn apply_controls(&self, controls: &Controls) -> Result<(), ConfigError> {
        let mut names: Vec<&String> = self.controls.keys().collect();
        names.sort();
        for name in names {
            let id = ControlId::from_name(name)
                .ok_or_else(|| ConfigError::UnknownControl(name.clone()))?;
            controls.set(id, self.controls[name]);
        }
        Ok(())
    }

    /// Builds an engine publishing from the given library with this configuration.
    pub fn build_engine(&self, library: LibraryHandle) -> Result<Engine, ConfigError> {
        let controls = Arc::new(Controls::new());
        self.apply_controls(&controls)?;
        let sample_rate = self.sample_rate as f64;
        Ok(Engine::new(
            library,
            controls,
            Arc::new(AutoSampler::new(sample_rate)),
            sample_rate,
            self.max_voices,
        )
        .with_monitor_input(self.monitor_input))
    }
}

/// The environment source for engine configuration.
pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use config::FileFormat;

    use super::*;

    fn from_yaml(yaml: &str) -> EngineConfig {
        EngineConfig::build(Config::builder().add_source(File::from_str(yaml, FileFormat::Yaml)))
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = from_yaml("{}");
        assert_eq!(EngineConfig::default(), config);
        assert_eq!(44100, config.sample_rate);
        assert_eq!(512, config.block_size);
        assert_eq!(32, config.max_voices);
        assert!(config.monitor_input);
    }

    #[test]
    fn test_yaml() {
        let config = from_yaml(
            r#"
            sample_rate: 48000
            max_voices: 4
            controls:
              attack_ms: 20
              filter_enabled: 1
            autosampler:
              start_note: 36
              end_note: 48
              round_robins: 3
            "#,
        );
        assert_eq!(48000, config.sample_rate);
        assert_eq!(512, config.block_size);
        assert_eq!(4, config.max_voices);
        assert_eq!(Some(&20.0), config.controls.get("attack_ms"));
        assert_eq!(36, config.autosampler.start_note);
        assert_eq!(3, config.autosampler.round_robins);
        assert_eq!(2000.0, config.autosampler.sustain_ms);

        let controls = Controls::new();
        config.apply_controls(&controls).unwrap();
        assert_eq!(20.0, controls.get(ControlId::AttackMs));
        assert_eq!(1.0, controls.get(ControlId::FilterEnabled));
    }

    #[test]
    fn test_environment_overrides() {
        let env: config::Map<String, String> = [
            ("AUTOSAMPLER_SAMPLE_RATE", "96000"),
            ("AUTOSAMPLER_AUTOSAMPLER__VELOCITY_LAYERS", "3"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = EngineConfig::build(
            Config::builder()
                .add_source(File::from_str("sample_rate: 48000\n", FileFormat::Yaml))
                .add_source(environment().source(Some(env))),
        )
        .unwrap();
        assert_eq!(96000, config.sample_rate);
        assert_eq!(3, config.autosampler.velocity_layers);
    }

    #[test]
    fn test_unknown_control() {
        let config = from_yaml("controls:\n  warp_factor: 9\n");
        let err = config.apply_controls(&Controls::new()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownControl(name) if name == "warp_factor"));
    }

    #[test]
    fn test_build_engine() {
        let config = EngineConfig {
            sample_rate: 48000,
            max_voices: 3,
            monitor_input: false,
            ..Default::default()
        };
        let engine = config.build_engine(LibraryHandle::new()).unwrap();
        assert_eq!(48000.0, engine.sample_rate());
        assert_eq!(3, engine.pool().capacity());
        assert!(!engine.monitor_input());
        assert_eq!(48000.0, engine.autosampler().sample_rate());
    }
}
