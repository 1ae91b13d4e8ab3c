use crate::config::EngineConfigOverrides;
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    width: Option<u32>,
    height: Option<u32>,
    ticks: Option<u32>,
    scene: Option<PathBuf>,
    assets: Option<String>,
    config: Option<PathBuf>,
    realtime: Option<bool>,
}

impl CliOverrides {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = CliOverrides::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            let Some(key) = flag.strip_prefix("--") else {
                bail!("Unexpected argument '{flag}'. Flags take the form --name value.");
            };
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "width" => {
                    overrides.width = Some(value.parse::<u32>().with_context(|| format!("Invalid width '{value}'"))?);
                }
                "height" => {
                    overrides.height =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid height '{value}'"))?);
                }
                "ticks" => {
                    overrides.ticks = Some(value.parse::<u32>().with_context(|| format!("Invalid ticks '{value}'"))?);
                }
                "scene" => overrides.scene = Some(PathBuf::from(value)),
                "assets" => overrides.assets = Some(value),
                "config" => overrides.config = Some(PathBuf::from(value)),
                "realtime" => overrides.realtime = Some(parse_bool_flag("realtime", &value)?),
                _ => bail!(
                    "Unknown flag '{flag}'. Supported flags: --width, --height, --ticks, --scene, --assets, --config, --realtime."
                ),
            }
        }
        Ok(overrides)
    }

    pub fn ticks(&self) -> Option<u32> {
        self.ticks
    }

    pub fn scene(&self) -> Option<&PathBuf> {
        self.scene.as_ref()
    }

    pub fn config(&self) -> Option<&PathBuf> {
        self.config.as_ref()
    }

    pub fn realtime(&self) -> bool {
        self.realtime.unwrap_or(false)
    }

    pub fn config_overrides(&self) -> EngineConfigOverrides {
        EngineConfigOverrides { width: self.width, height: self.height, assets_root: self.assets.clone() }
    }
}

fn parse_bool_flag(flag: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => bail!("Invalid {flag} value '{other}'. Use on/off or true/false."),
    }
}
