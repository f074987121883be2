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
use crate::audio::AudioError;
use crate::slices::SliceError;

/// How a decode attempt failed, as reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The bytes belong to some other container; try the next decoder.
    FormatMismatch,
    /// A recognized container in a variant that is not supported.
    UnsupportedVariant,
    /// The container is recognized but internally inconsistent.
    MalformedData,
}

/// Error types for container decoding
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Not a {0} file")]
    FormatMismatch(&'static str),

    #[error("Unsupported {format} variant: {detail}")]
    UnsupportedVariant {
        format: &'static str,
        detail: String,
    },

    #[error("Malformed {format} data: {detail}")]
    Malformed {
        format: &'static str,
        detail: String,
    },

    #[error("Invalid decoded audio: {0}")]
    Audio(#[from] AudioError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DecodeError {
    pub fn unsupported(format: &'static str, detail: impl Into<String>) -> Self {
        DecodeError::UnsupportedVariant {
            format,
            detail: detail.into(),
        }
    }

    pub fn malformed(format: &'static str, detail: impl Into<String>) -> Self {
        DecodeError::Malformed {
            format,
            detail: detail.into(),
        }
    }

    /// Classifies the error for the tagged failure result.
    pub fn kind(&self) -> FailureKind {
        match self {
            DecodeError::FormatMismatch(_) => FailureKind::FormatMismatch,
            DecodeError::UnsupportedVariant { .. } => FailureKind::UnsupportedVariant,
            DecodeError::Malformed { .. } | DecodeError::Audio(_) | DecodeError::IoError(_) => {
                FailureKind::MalformedData
            }
        }
    }
}

/// Error types for container encoding
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("{format} output does not support {bits}-bit samples")]
    UnsupportedBitDepth { format: &'static str, bits: u16 },

    #[error("No AIFF sample rate encoding for {0}Hz")]
    UnsupportedRate(u32),

    #[error("{format} output does not support {channels} channels")]
    UnsupportedChannels {
        format: &'static str,
        channels: usize,
    },

    #[error("{format} metadata is {size} bytes, the limit is {limit}")]
    MetadataTooLarge {
        format: &'static str,
        size: usize,
        limit: usize,
    },

    #[error("{count} slices exceed the limit of {limit}")]
    TooManySlices { count: usize, limit: usize },

    #[error("Slice metadata error: {0}")]
    Slices(#[from] SliceError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
