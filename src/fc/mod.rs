/* Copyright (C) 2022 Antmicro
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     https://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

/* FC values: how many channel tracks a block port connects to. */

use std::collections::BTreeMap;

use crate::error::{FabricError, Result};
use crate::netlist::PortDirection;
use crate::node::Segment;

/// Either an absolute number of tracks or a fraction of the tracks available.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FcValue {
    Count(u32),
    Fraction(f64),
}

impl Default for FcValue {
    fn default() -> Self {
        FcValue::Count(0)
    }
}

impl FcValue {
    /// Number of tracks of `segment` a single port bit connects to.
    ///
    /// # Arguments
    /// * `segment` - segment prototype
    /// * `all_sections` - count every section of the segment as a separate
    ///   track (connection-box inputs may tap any section)
    pub fn resolve(&self, segment: &Segment, all_sections: bool) -> Result<u32> {
        let multiplier = if all_sections { segment.length } else { 1 };
        let available = segment.width * multiplier;
        match *self {
            FcValue::Count(count) => {
                if count > available {
                    return Err(FabricError::config(format!(
                        "FC value {} exceeds the {} tracks of segment '{}'",
                        count, available, segment.name
                    )));
                }
                Ok(count)
            }
            FcValue::Fraction(frac) => {
                if !(0.0 ..= 1.0).contains(&frac) {
                    return Err(FabricError::config(format!(
                        "FC fraction {} is outside of [0, 1]", frac
                    )));
                }
                Ok((frac * available as f64).ceil() as u32)
            }
        }
    }

    pub fn is_zero(&self) -> bool {
        match *self {
            FcValue::Count(count) => count == 0,
            FcValue::Fraction(frac) => frac == 0.0,
        }
    }
}

impl From<u32> for FcValue {
    fn from(count: u32) -> Self {
        FcValue::Count(count)
    }
}

impl From<f64> for FcValue {
    fn from(frac: f64) -> Self {
        FcValue::Fraction(frac)
    }
}

/// FC of one block port, with per-segment overrides keyed by segment name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockPortFcValue {
    pub default: FcValue,
    #[serde(default)]
    pub overrides: BTreeMap<String, FcValue>,
}

impl BlockPortFcValue {
    pub fn new(default: FcValue) -> Self {
        Self { default, overrides: BTreeMap::new() }
    }

    pub fn segment_fc(&self, segment: &Segment, all_sections: bool) -> Result<u32> {
        self.overrides.get(&segment.name)
            .unwrap_or(&self.default)
            .resolve(segment, all_sections)
    }
}

/// FC of every port of a block: defaults per direction plus per-port overrides.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockFcValue {
    pub default_in: BlockPortFcValue,
    pub default_out: BlockPortFcValue,
    #[serde(default)]
    pub overrides: BTreeMap<String, BlockPortFcValue>,
}

impl BlockFcValue {
    pub fn new(default_in: FcValue, default_out: FcValue) -> Self {
        Self {
            default_in: BlockPortFcValue::new(default_in),
            default_out: BlockPortFcValue::new(default_out),
            overrides: BTreeMap::new(),
        }
    }

    /// The same FC for inputs and outputs.
    pub fn uniform(fc: FcValue) -> Self {
        Self::new(fc, fc)
    }

    /// Same defaults, no overrides.
    pub fn defaults_only(&self) -> Self {
        Self {
            default_in: self.default_in.clone(),
            default_out: self.default_out.clone(),
            overrides: BTreeMap::new(),
        }
    }

    pub fn port_fc(
        &self,
        port_name: &str,
        direction: PortDirection,
        segment: &Segment,
        all_sections: bool
    ) -> Result<u32> {
        let fc = match self.overrides.get(port_name) {
            Some(fc) => fc,
            None => match direction {
                PortDirection::Input => &self.default_in,
                PortDirection::Output => &self.default_out,
            },
        };
        fc.segment_fc(segment, all_sections)
    }
}
