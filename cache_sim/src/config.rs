use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{geometry::Geometry, trace::TraceConfig};

/// Everything a run needs besides the trace itself. Missing fields take the
/// canonical values: a 16/1/1024 instruction cache and a 16/8/256 data
/// cache fed from the raw capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub icache: Geometry,
    pub dcache: Geometry,
    pub trace: TraceConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            icache: Geometry::INSTRUCTION,
            dcache: Geometry::DATA,
            trace: TraceConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn deser(file: impl std::io::Read) -> Result<Self> {
        Ok(serde_json::from_reader(file)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open config `{}`", path.display()))?;
        Self::deser(BufReader::new(file))
            .with_context(|| format!("invalid config `{}`", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{geometry::ConfigurationError, trace::TraceSource};

    #[test]
    fn test_partial_config() {
        let c = SimConfig::deser(
            r#"{ "dcache": { "line_bytes": 32, "associativity": 4, "sets": 128 },
                 "trace": { "stride": 1 } }"#
                .as_bytes(),
        )
        .unwrap();
        assert_eq!(Geometry::INSTRUCTION, c.icache);
        assert_eq!(Geometry::new(32, 4, 128).unwrap(), c.dcache);
        assert_eq!(1, c.trace.stride);
        assert_eq!(TraceSource::Raw, c.trace.source);
    }
    #[test]
    fn test_empty_config_is_canonical() {
        assert_eq!(SimConfig::default(), SimConfig::deser("{}".as_bytes()).unwrap());
    }
    #[test]
    fn test_invalid_geometry() {
        let e = SimConfig::deser(
            r#"{ "icache": { "line_bytes": 16, "associativity": 1, "sets": 1000 } }"#.as_bytes(),
        )
        .unwrap_err();
        let expected = ConfigurationError::NotPowerOfTwo {
            parameter: "set count",
            value: 1000,
        };
        assert!(e.to_string().contains(&expected.to_string()), "{e}");
    }
    #[test]
    fn test_missing_file() {
        let e = SimConfig::load(Path::new("/nonexistent/cache_sim.json")).unwrap_err();
        assert!(e.to_string().contains("failed to open config"));
    }
}
