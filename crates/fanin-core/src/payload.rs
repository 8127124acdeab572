//! Domain payload schemas exchanged inside envelopes.
//!
//! The layouts follow the Foxglove protobuf schemas so that the output can
//! be consumed directly by visualization tools.

use crate::{error::CodecError, time::timestamp_to_duration};
use bytes::Bytes;
use prost::Message;
use std::{fmt, str::FromStr, time::Duration};

/// A point in time, independent of any time zone or calendar.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Message)]
pub struct Timestamp {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}

/// A compressed image.
#[derive(Clone, PartialEq, Message)]
pub struct CompressedImage {
    #[prost(message, optional, tag = "1")]
    pub timestamp: Option<Timestamp>,
    #[prost(string, tag = "4")]
    pub frame_id: String,
    #[prost(bytes = "bytes", tag = "2")]
    pub data: Bytes,
    /// Image format, one of `webp`, `jpeg` or `png`.
    #[prost(string, tag = "3")]
    pub format: String,
}

/// A vector in 3D space.
#[derive(Clone, Copy, PartialEq, Message)]
pub struct Vector3 {
    #[prost(double, tag = "1")]
    pub x: f64,
    #[prost(double, tag = "2")]
    pub y: f64,
    #[prost(double, tag = "3")]
    pub z: f64,
}

/// A quaternion representing a rotation in 3D space.
#[derive(Clone, Copy, PartialEq, Message)]
pub struct Quaternion {
    #[prost(double, tag = "1")]
    pub x: f64,
    #[prost(double, tag = "2")]
    pub y: f64,
    #[prost(double, tag = "3")]
    pub z: f64,
    #[prost(double, tag = "4")]
    pub w: f64,
}

/// A position and orientation in 3D space.
#[derive(Clone, Copy, PartialEq, Message)]
pub struct Pose {
    #[prost(message, optional, tag = "1")]
    pub position: Option<Vector3>,
    #[prost(message, optional, tag = "2")]
    pub orientation: Option<Quaternion>,
}

/// Numeric type of a packed field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum NumericType {
    Unknown = 0,
    Uint8 = 1,
    Int8 = 2,
    Uint16 = 3,
    Int16 = 4,
    Uint32 = 5,
    Int32 = 6,
    Float32 = 7,
    Float64 = 8,
}

/// A field present within each element of a packed byte buffer.
#[derive(Clone, PartialEq, Message)]
pub struct PackedElementField {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(fixed32, tag = "2")]
    pub offset: u32,
    #[prost(enumeration = "NumericType", tag = "3")]
    pub r#type: i32,
}

/// A collection of N-dimensional points.
#[derive(Clone, PartialEq, Message)]
pub struct PointCloud {
    #[prost(message, optional, tag = "1")]
    pub timestamp: Option<Timestamp>,
    #[prost(string, tag = "2")]
    pub frame_id: String,
    #[prost(message, optional, tag = "3")]
    pub pose: Option<Pose>,
    /// Number of bytes between points in `data`.
    #[prost(fixed32, tag = "4")]
    pub point_stride: u32,
    #[prost(message, repeated, tag = "5")]
    pub fields: Vec<PackedElementField>,
    #[prost(bytes = "bytes", tag = "6")]
    pub data: Bytes,
}

impl PointCloud {
    /// Number of whole points in `data`.
    pub fn num_points(&self) -> usize {
        match self.point_stride {
            0 => 0,
            stride => self.data.len() / stride as usize,
        }
    }
}

/// Provides the acquisition timestamp and frame of a sensor payload.
pub trait WithTimestamp {
    fn timestamp(&self) -> Duration;

    fn frame_id(&self) -> &str;
}

impl WithTimestamp for CompressedImage {
    fn timestamp(&self) -> Duration {
        self.timestamp
            .as_ref()
            .map(timestamp_to_duration)
            .unwrap_or_default()
    }

    fn frame_id(&self) -> &str {
        &self.frame_id
    }
}

impl WithTimestamp for PointCloud {
    fn timestamp(&self) -> Duration {
        self.timestamp
            .as_ref()
            .map(timestamp_to_duration)
            .unwrap_or_default()
    }

    fn frame_id(&self) -> &str {
        &self.frame_id
    }
}

/// The schema carried under a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    CompressedImage,
    PointCloud,
}

impl PayloadKind {
    /// The well-known subject name for this schema.
    pub fn subject(self) -> &'static str {
        match self {
            PayloadKind::CompressedImage => "compressed_image",
            PayloadKind::PointCloud => "point_cloud",
        }
    }

    /// Look up the schema for a well-known subject.
    pub fn from_subject(subject: &str) -> Result<Self, CodecError> {
        match subject {
            "compressed_image" => Ok(PayloadKind::CompressedImage),
            "point_cloud" => Ok(PayloadKind::PointCloud),
            other => Err(CodecError::UnsupportedSubject(other.to_string())),
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subject())
    }
}

/// A decoded sensor payload of any supported schema.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorPayload {
    Image(CompressedImage),
    PointCloud(PointCloud),
}

impl SensorPayload {
    /// Decode `content` according to `kind`.
    ///
    /// A payload without a timestamp is rejected.
    pub fn decode(kind: PayloadKind, content: &[u8]) -> Result<Self, CodecError> {
        let payload = match kind {
            PayloadKind::CompressedImage => {
                let image =
                    CompressedImage::decode(content).map_err(|source| CodecError::Payload {
                        kind: kind.subject(),
                        source,
                    })?;
                if image.timestamp.is_none() {
                    return Err(CodecError::MissingField {
                        message: "CompressedImage",
                        field: "timestamp",
                    });
                }
                SensorPayload::Image(image)
            }
            PayloadKind::PointCloud => {
                let cloud = PointCloud::decode(content).map_err(|source| CodecError::Payload {
                    kind: kind.subject(),
                    source,
                })?;
                if cloud.timestamp.is_none() {
                    return Err(CodecError::MissingField {
                        message: "PointCloud",
                        field: "timestamp",
                    });
                }
                SensorPayload::PointCloud(cloud)
            }
        };
        Ok(payload)
    }

    pub fn kind(&self) -> PayloadKind {
        match self {
            SensorPayload::Image(_) => PayloadKind::CompressedImage,
            SensorPayload::PointCloud(_) => PayloadKind::PointCloud,
        }
    }

    /// The opaque data body.
    pub fn data(&self) -> &Bytes {
        match self {
            SensorPayload::Image(image) => &image.data,
            SensorPayload::PointCloud(cloud) => &cloud.data,
        }
    }
}

impl WithTimestamp for SensorPayload {
    fn timestamp(&self) -> Duration {
        match self {
            SensorPayload::Image(image) => image.timestamp(),
            SensorPayload::PointCloud(cloud) => cloud.timestamp(),
        }
    }

    fn frame_id(&self) -> &str {
        match self {
            SensorPayload::Image(image) => image.frame_id(),
            SensorPayload::PointCloud(cloud) => cloud.frame_id(),
        }
    }
}

/// Format tag of a compressed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Png,
    Webp,
}

impl ImageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = eyre::Error;

    fn from_str(s: &str) -> eyre::Result<Self> {
        match s {
            "jpeg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            "webp" => Ok(ImageFormat::Webp),
            other => eyre::bail!("unsupported image format '{}'", other),
        }
    }
}
