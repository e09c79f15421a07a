//! Incoming camera frames and their structural validation.
//!
//! Pixel decoding belongs to the engine. Before a frame is handed over we only
//! check that the buffers are self-consistent and that the frame carries the
//! images the configured sensor needs (a depth image for RGB-D, a right image
//! for stereo).

use std::str::FromStr;

use thiserror::Error;

use crate::engine::SensorMode;

/// Pixel layout of an image buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Mono8,
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
    Mono16,
    /// 16-bit unsigned depth, millimetres.
    Depth16,
    /// 32-bit float depth, metres.
    Depth32F,
}

impl Encoding {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Mono8 => 1,
            Self::Rgb8 | Self::Bgr8 => 3,
            Self::Rgba8 | Self::Bgra8 | Self::Depth32F => 4,
            Self::Mono16 | Self::Depth16 => 2,
        }
    }

    /// Whether the encoding can carry a depth image.
    pub fn is_depth(self) -> bool {
        matches!(self, Self::Mono16 | Self::Depth16 | Self::Depth32F)
    }
}

impl FromStr for Encoding {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mono8" | "8UC1" => Ok(Self::Mono8),
            "rgb8" => Ok(Self::Rgb8),
            "bgr8" | "8UC3" => Ok(Self::Bgr8),
            "rgba8" => Ok(Self::Rgba8),
            "bgra8" | "8UC4" => Ok(Self::Bgra8),
            "mono16" => Ok(Self::Mono16),
            "16UC1" => Ok(Self::Depth16),
            "32FC1" => Ok(Self::Depth32F),
            other => Err(ConversionError::UnsupportedEncoding(other.to_string())),
        }
    }
}

/// Reasons a frame is rejected before reaching the engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConversionError {
    #[error("unsupported image encoding '{0}'")]
    UnsupportedEncoding(String),
    #[error("{which} image has zero size ({width}x{height})")]
    EmptyImage {
        which: &'static str,
        width: u32,
        height: u32,
    },
    #[error("{which} image row step {step} is shorter than {min} bytes")]
    StepTooSmall {
        which: &'static str,
        step: usize,
        min: usize,
    },
    #[error("{which} image buffer holds {actual} bytes, expected at least {expected}")]
    TruncatedData {
        which: &'static str,
        actual: usize,
        expected: usize,
    },
    #[error("{which} image of {height} rows at step {step} overflows the address space")]
    SizeOverflow {
        which: &'static str,
        step: usize,
        height: u32,
    },
    #[error("{sensor} frames need a {which} image")]
    MissingSecondary {
        sensor: SensorMode,
        which: &'static str,
    },
    #[error("{sensor} frames take no secondary image")]
    UnexpectedSecondary { sensor: SensorMode },
    #[error("depth image encoding {0:?} does not carry depth")]
    NotDepth(Encoding),
    #[error("secondary image is {secondary:?}, primary is {primary:?}")]
    SizeMismatch {
        primary: (u32, u32),
        secondary: (u32, u32),
    },
    #[error("image timestamp {0} is not finite")]
    BadTimestamp(f64),
}

/// Raw image as received from the camera driver.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMsg {
    pub timestamp_s: f64,
    pub width: u32,
    pub height: u32,
    /// Row length in bytes.
    pub step: usize,
    pub encoding: String,
    pub data: Vec<u8>,
}

impl ImageMsg {
    /// Tightly packed image (`step == width * bytes_per_pixel`).
    pub fn packed(timestamp_s: f64, width: u32, height: u32, encoding: Encoding, data: Vec<u8>) -> Self {
        Self {
            timestamp_s,
            width,
            height,
            step: width as usize * encoding.bytes_per_pixel(),
            encoding: encoding_name(encoding).to_string(),
            data,
        }
    }
}

fn encoding_name(encoding: Encoding) -> &'static str {
    match encoding {
        Encoding::Mono8 => "mono8",
        Encoding::Rgb8 => "rgb8",
        Encoding::Bgr8 => "bgr8",
        Encoding::Rgba8 => "rgba8",
        Encoding::Bgra8 => "bgra8",
        Encoding::Mono16 => "mono16",
        Encoding::Depth16 => "16UC1",
        Encoding::Depth32F => "32FC1",
    }
}

/// A validated image.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub timestamp_s: f64,
    pub width: u32,
    pub height: u32,
    pub step: usize,
    pub encoding: Encoding,
    pub data: Vec<u8>,
}

impl Image {
    fn from_msg(msg: ImageMsg, which: &'static str) -> Result<Self, ConversionError> {
        if !msg.timestamp_s.is_finite() {
            return Err(ConversionError::BadTimestamp(msg.timestamp_s));
        }
        let encoding: Encoding = msg.encoding.parse()?;
        if msg.width == 0 || msg.height == 0 {
            return Err(ConversionError::EmptyImage {
                which,
                width: msg.width,
                height: msg.height,
            });
        }
        let min_step = msg.width as usize * encoding.bytes_per_pixel();
        if msg.step < min_step {
            return Err(ConversionError::StepTooSmall {
                which,
                step: msg.step,
                min: min_step,
            });
        }
        let expected = msg
            .step
            .checked_mul(msg.height as usize)
            .ok_or(ConversionError::SizeOverflow {
                which,
                step: msg.step,
                height: msg.height,
            })?;
        if msg.data.len() < expected {
            return Err(ConversionError::TruncatedData {
                which,
                actual: msg.data.len(),
                expected,
            });
        }

        Ok(Self {
            timestamp_s: msg.timestamp_s,
            width: msg.width,
            height: msg.height,
            step: msg.step,
            encoding,
            data: msg.data,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Images for one tracking call, as received.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameInput {
    /// Colour/left/mono image.
    pub primary: ImageMsg,
    /// Depth image (RGB-D) or right image (stereo).
    pub secondary: Option<ImageMsg>,
}

impl FrameInput {
    pub fn mono(image: ImageMsg) -> Self {
        Self {
            primary: image,
            secondary: None,
        }
    }

    pub fn rgbd(rgb: ImageMsg, depth: ImageMsg) -> Self {
        Self {
            primary: rgb,
            secondary: Some(depth),
        }
    }

    pub fn stereo(left: ImageMsg, right: ImageMsg) -> Self {
        Self {
            primary: left,
            secondary: Some(right),
        }
    }
}

/// A validated frame, ready for the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub primary: Image,
    pub secondary: Option<Image>,
}

impl Frame {
    /// Validate `input` against what `sensor` expects.
    pub fn from_input(input: FrameInput, sensor: SensorMode) -> Result<Self, ConversionError> {
        let primary = Image::from_msg(input.primary, "primary")?;

        let secondary = match (sensor.secondary_image(), input.secondary) {
            (Some(which), Some(msg)) => {
                let image = Image::from_msg(msg, which)?;
                if sensor.is_rgbd() && !image.encoding.is_depth() {
                    return Err(ConversionError::NotDepth(image.encoding));
                }
                if image.size() != primary.size() {
                    return Err(ConversionError::SizeMismatch {
                        primary: primary.size(),
                        secondary: image.size(),
                    });
                }
                Some(image)
            }
            (Some(which), None) => {
                return Err(ConversionError::MissingSecondary { sensor, which });
            }
            (None, Some(_)) => return Err(ConversionError::UnexpectedSecondary { sensor }),
            (None, None) => None,
        };

        Ok(Self { primary, secondary })
    }

    /// Timestamp passed to the engine: the primary image's.
    pub fn timestamp_s(&self) -> f64 {
        self.primary.timestamp_s
    }

    /// Latest IMU timestamp that belongs to this frame.
    pub fn imu_cutoff_s(&self) -> f64 {
        match &self.secondary {
            Some(sec) => self.primary.timestamp_s.min(sec.timestamp_s),
            None => self.primary.timestamp_s,
        }
    }
}
