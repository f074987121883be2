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
//! Sample-chain container codecs and slice metadata for hardware samplers.
//!
//! Samples are decoded from WAV, AIFF, MIDI SDS and Polyend `.pti` containers
//! (and anything symphonia reads) into planar audio at a common working rate
//! with normalized slices, then re-encoded as WAV, OP-1 AIFF or Octatrack `.ot`.

pub mod audio;
pub mod chain;
pub mod codec;
pub mod config;
pub mod export;
pub mod import;
pub mod slices;
pub mod tempo;
#[cfg(test)]
mod testutil;
pub mod util;
