//! Static configuration of the simulated debug transport and debug module.
//!
//! A configuration can be built in code or loaded from YAML:
//!
//! ```
//! use riscv_dm::DebugModuleConfig;
//!
//! let config = DebugModuleConfig::from_yaml("abits: 10\nprogbuf_size: 2\n")?;
//!
//! assert_eq!(config.abits, 10);
//! assert_eq!(config.progbuf_size, 2);
//! assert_eq!(config.data_count, 4);
//! # Ok::<(), riscv_dm::ConfigError>(())
//! ```

use serde::{Deserialize, Serialize};

use crate::architecture::riscv::registers::{MAX_DATA_COUNT, MAX_PROGBUF_SIZE};

/// IDCODE reported by the TAP unless configured otherwise.
pub const DEFAULT_IDCODE: u32 = 0x10e3_1913;

/// Errors when loading or validating a [`DebugModuleConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The YAML document could not be parsed.
    #[error("Failed to parse the debug module configuration")]
    Parse(#[from] serde_yaml::Error),
    /// The least significant bit of an IDCODE must be set.
    #[error("IDCODE {0:#010x} does not have its least significant bit set")]
    InvalidIdCode(u32),
    /// The DMI address width must be between 1 and 32 bits.
    #[error("A DMI address width of {0} bits is not supported, expected 1 to 32")]
    InvalidAddressBits(u32),
    /// The `idle` hint in `dtmcs` is three bits wide.
    #[error("{0} idle cycles do not fit into dtmcs.idle, the maximum is 7")]
    InvalidIdleCycles(u8),
    /// At least one and at most twelve data registers are supported.
    #[error("{0} data registers are not supported, expected 1 to 12")]
    InvalidDataCount(u8),
    /// At most sixteen program buffer words are supported.
    #[error("A program buffer of {0} words is not supported, the maximum is 16")]
    InvalidProgramBufferSize(u8),
    /// `hartinfo.nscratch` is four bits wide.
    #[error("{0} scratch registers do not fit into hartinfo.nscratch, the maximum is 15")]
    InvalidScratchCount(u8),
}

/// Parameters of the Debug Transport Module and Debug Module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebugModuleConfig {
    /// Value captured by the IDCODE instruction.
    pub idcode: u32,
    /// Width of the address field in the `dmi` register.
    pub abits: u32,
    /// Run-Test/Idle cycles a DMI access needs to complete.
    ///
    /// Advertised through `dtmcs.idle`. A DMI scan captured before that many
    /// cycles elapsed reports a busy status.
    pub idle_cycles: u8,
    /// Number of implemented `data` registers.
    pub data_count: u8,
    /// Number of implemented `progbuf` words.
    pub progbuf_size: u8,
    /// Number of `dscratch` registers reported in `hartinfo`.
    pub nscratch: u8,
}

impl Default for DebugModuleConfig {
    fn default() -> Self {
        Self {
            idcode: DEFAULT_IDCODE,
            abits: 7,
            idle_cycles: 1,
            data_count: 4,
            progbuf_size: 16,
            nscratch: 2,
        }
    }
}

impl DebugModuleConfig {
    /// Parse and validate a configuration from a YAML document.
    ///
    /// Missing fields take their default value.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;

        tracing::debug!("Loaded debug module configuration: {:?}", config);

        Ok(config)
    }

    /// Check that every field is in the range the registers can represent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idcode & 1 == 0 {
            return Err(ConfigError::InvalidIdCode(self.idcode));
        }

        if !(1..=32).contains(&self.abits) {
            return Err(ConfigError::InvalidAddressBits(self.abits));
        }

        if self.idle_cycles > 7 {
            return Err(ConfigError::InvalidIdleCycles(self.idle_cycles));
        }

        if !(1..=MAX_DATA_COUNT as u8).contains(&self.data_count) {
            return Err(ConfigError::InvalidDataCount(self.data_count));
        }

        if self.progbuf_size > MAX_PROGBUF_SIZE as u8 {
            return Err(ConfigError::InvalidProgramBufferSize(self.progbuf_size));
        }

        if self.nscratch > 15 {
            return Err(ConfigError::InvalidScratchCount(self.nscratch));
        }

        Ok(())
    }

    /// Force every field into the range the registers can represent.
    ///
    /// [`DebugModule::new`](crate::DebugModule::new) and
    /// [`DebugTransportModule::new`](crate::DebugTransportModule::new) apply
    /// this to the configuration they are given.
    pub fn clamped(&self) -> Self {
        if let Err(error) = self.validate() {
            tracing::warn!("Clamping debug module configuration: {}", error);
        }

        Self {
            idcode: self.idcode | 1,
            abits: self.abits.clamp(1, 32),
            idle_cycles: self.idle_cycles.min(7),
            data_count: self.data_count.clamp(1, MAX_DATA_COUNT as u8),
            progbuf_size: self.progbuf_size.min(MAX_PROGBUF_SIZE as u8),
            nscratch: self.nscratch.min(15),
        }
    }

    /// Mask of the address bits carried in a `dmi` scan.
    pub fn address_mask(&self) -> u32 {
        u32::MAX >> (32 - self.abits.clamp(1, 32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn empty_document_yields_defaults() {
        let config = DebugModuleConfig::from_yaml("{}").unwrap();

        assert_eq!(config, DebugModuleConfig::default());
    }

    #[test]
    fn parse_full_document() {
        let yaml = "
idcode: 0x20000913
abits: 16
idle_cycles: 3
data_count: 2
progbuf_size: 8
nscratch: 1
";
        let config = DebugModuleConfig::from_yaml(yaml).unwrap();

        assert_eq!(
            config,
            DebugModuleConfig {
                idcode: 0x2000_0913,
                abits: 16,
                idle_cycles: 3,
                data_count: 2,
                progbuf_size: 8,
                nscratch: 1,
            }
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = DebugModuleConfig::from_yaml("hasel: true");

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test_case("idcode: 0x10e31912" ; "idcode without lsb")]
    #[test_case("abits: 0" ; "zero address bits")]
    #[test_case("abits: 33" ; "too many address bits")]
    #[test_case("idle_cycles: 8" ; "idle cycles overflow")]
    #[test_case("data_count: 0" ; "no data registers")]
    #[test_case("data_count: 13" ; "too many data registers")]
    #[test_case("progbuf_size: 17" ; "program buffer too large")]
    #[test_case("nscratch: 16" ; "too many scratch registers")]
    fn out_of_range_values_are_rejected(yaml: &str) {
        let result = DebugModuleConfig::from_yaml(yaml);

        assert!(result.is_err(), "{yaml} was accepted");
        assert!(!matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn clamping_keeps_valid_configurations() {
        let config = DebugModuleConfig {
            abits: 12,
            progbuf_size: 2,
            ..Default::default()
        };

        assert_eq!(config.clamped(), config);
    }

    #[test]
    fn clamping_limits_every_field() {
        let config = DebugModuleConfig {
            idcode: 0x1234_5678,
            abits: 100,
            idle_cycles: 20,
            data_count: 0,
            progbuf_size: 20,
            nscratch: 30,
        };

        let clamped = config.clamped();

        assert!(clamped.validate().is_ok());
        assert_eq!(
            clamped,
            DebugModuleConfig {
                idcode: 0x1234_5679,
                abits: 32,
                idle_cycles: 7,
                data_count: 1,
                progbuf_size: 16,
                nscratch: 15,
            }
        );
    }

    #[test_case(1, 0x1)]
    #[test_case(7, 0x7f)]
    #[test_case(32, 0xffff_ffff)]
    fn address_mask(abits: u32, mask: u32) {
        let config = DebugModuleConfig {
            abits,
            ..Default::default()
        };

        assert_eq!(config.address_mask(), mask);
    }
}
