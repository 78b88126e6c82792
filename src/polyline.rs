//! Polyline representation and codec for route geometries.
//!
//! Paths are held as decoded coordinates internally and encoded with the
//! signed zig-zag, 5-bit chunked, ASCII-offset scheme at 1e5 precision used
//! by common mapping SDKs.

use serde::{Deserialize, Serialize};

use crate::error::PolylineError;
use crate::model::Coordinates;

const PRECISION: f64 = 1e5;
const ASCII_OFFSET: u8 = 63;
const CHUNK_BITS: u32 = 5;
const CHUNK_MASK: i64 = 0x1f;
const CONTINUATION: i64 = 0x20;

/// A polyline as a sequence of decoded points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<Coordinates>,
}

impl Polyline {
    /// Wraps already-decoded points. No validation is done.
    pub fn new(points: Vec<Coordinates>) -> Self {
        Self { points }
    }

    /// Points in path order.
    pub fn points(&self) -> &[Coordinates] {
        &self.points
    }

    pub fn into_points(self) -> Vec<Coordinates> {
        self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Encodes the points, latitude delta before longitude delta per point.
    pub fn encode(&self) -> String {
        let mut encoded = String::with_capacity(self.points.len() * 8);
        let (mut prev_lat, mut prev_lon) = (0i64, 0i64);

        for point in &self.points {
            let lat = scale(point.lat);
            let lon = scale(point.lon);
            encode_value(lat - prev_lat, &mut encoded);
            encode_value(lon - prev_lon, &mut encoded);
            prev_lat = lat;
            prev_lon = lon;
        }

        encoded
    }

    pub fn decode(encoded: &str) -> Result<Self, PolylineError> {
        let bytes = encoded.as_bytes();
        let mut offset = 0;
        let mut points = Vec::new();
        let (mut lat, mut lon) = (0i64, 0i64);

        while offset < bytes.len() {
            lat += decode_value(bytes, &mut offset)?;
            if offset >= bytes.len() {
                return Err(PolylineError::UnpairedCoordinate);
            }
            lon += decode_value(bytes, &mut offset)?;
            points.push(Coordinates::new(lat as f64 / PRECISION, lon as f64 / PRECISION));
        }

        Ok(Self { points })
    }
}

/// Joins leg polylines into one path.
///
/// Each leg after the first starts where the previous one ended, so its
/// first point is dropped before concatenation. A single polyline is
/// returned untouched.
pub fn combine<S: AsRef<str>>(polylines: &[S]) -> Result<String, PolylineError> {
    match polylines {
        [] => return Ok(String::new()),
        [only] => return Ok(only.as_ref().to_string()),
        _ => {}
    }

    let mut points = Vec::new();
    for (i, encoded) in polylines.iter().enumerate() {
        let leg = Polyline::decode(encoded.as_ref())?.into_points();
        let skip = usize::from(i > 0);
        points.extend(leg.into_iter().skip(skip));
    }

    Ok(Polyline::new(points).encode())
}

fn scale(degrees: f64) -> i64 {
    (degrees * PRECISION).round() as i64
}

fn encode_value(value: i64, out: &mut String) {
    let mut value = if value < 0 { (!value << 1) | 1 } else { value << 1 };

    while value >= CONTINUATION {
        out.push((((value & CHUNK_MASK) | CONTINUATION) as u8 + ASCII_OFFSET) as char);
        value >>= CHUNK_BITS;
    }
    out.push((value as u8 + ASCII_OFFSET) as char);
}

fn decode_value(bytes: &[u8], offset: &mut usize) -> Result<i64, PolylineError> {
    let mut result = 0i64;
    let mut shift = 0u32;

    loop {
        let Some(&byte) = bytes.get(*offset) else {
            return Err(PolylineError::Truncated);
        };
        if !(ASCII_OFFSET..=ASCII_OFFSET + 0x3f).contains(&byte) || shift > 60 {
            return Err(PolylineError::InvalidByte {
                byte,
                offset: *offset,
            });
        }
        *offset += 1;

        let chunk = i64::from(byte - ASCII_OFFSET);
        result |= (chunk & CHUNK_MASK) << shift;
        shift += CHUNK_BITS;

        if chunk & CONTINUATION == 0 {
            break;
        }
    }

    Ok(if result & 1 == 1 { !(result >> 1) } else { result >> 1 })
}
