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

use thiserror::Error;

/// Everything that can go wrong while synthesizing a fabric.
///
/// None of these are recoverable: the graph walks are deterministic, so
/// retrying an operation that failed yields the same failure.
#[derive(Debug, Error)]
pub enum FabricError {
    /// Bad FC value, bad switch-box pattern parameter, duplicate name,
    /// unsupported module-class combination or malformed architecture file.
    #[error("configuration error: {0}")]
    Config(String),

    /// Overlapping instance, out-of-bounds or edge-incompatible placement.
    #[error("placement conflict: {0}")]
    Placement(String),

    /// The architecture is self-contradictory (multiple drivers, a node
    /// re-exposed with a different source, an unsatisfiable span limit...).
    #[error("internal consistency error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse architecture description: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("could not serialize netlist: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FabricError>;

impl FabricError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn placement<S: Into<String>>(msg: S) -> Self {
        Self::Placement(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}
