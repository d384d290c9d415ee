/*
 *  lib.rs
 *
 *  LySpec - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  cava spectrum and now playing text on a 128x64 OLED
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

pub mod analysis;
pub mod compose;
pub mod config;
pub mod constants;
pub mod display;
pub mod ingest;
pub mod pacer;
pub mod pipeline;
pub mod pump;
pub mod track;

pub use config::{Cli, Config, ConfigError, ConfigStore};
pub use pipeline::{Pipeline, PipelineOptions};
