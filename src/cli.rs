use crate::config::VatConfigOverrides;
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;

const USAGE: &str = "Supported flags: --config <path>, --count <n>, --seed <n>, --paused <on|off>, --single.";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    config: Option<PathBuf>,
    count: Option<usize>,
    seed: Option<u64>,
    paused: Option<bool>,
    single: bool,
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
        let _ = iter.next();
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            let Some(key) = flag.strip_prefix("--") else {
                bail!("Unexpected argument '{flag}'. {USAGE}");
            };
            if key == "single" {
                overrides.single = true;
                continue;
            }
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "config" => overrides.config = Some(PathBuf::from(value)),
                "count" => {
                    overrides.count =
                        Some(value.parse::<usize>().with_context(|| format!("Invalid count '{value}'"))?);
                }
                "seed" => {
                    overrides.seed = Some(value.parse::<u64>().with_context(|| format!("Invalid seed '{value}'"))?);
                }
                "paused" => overrides.paused = Some(parse_bool_flag("paused", &value)?),
                _ => bail!("Unknown flag '{flag}'. {USAGE}"),
            }
        }
        Ok(overrides)
    }

    pub fn into_config_overrides(self) -> VatConfigOverrides {
        VatConfigOverrides {
            config_path: self.config,
            count: self.count,
            seed: self.seed,
            single: self.single,
            paused: self.paused,
        }
    }
}

fn parse_bool_flag(flag: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => bail!("Invalid {flag} value '{other}'. Use on/off or true/false."),
    }
}
