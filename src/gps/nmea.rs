//! Minimal NMEA 0183 decoding for the two sentences the tracker cares about:
//! GGA (fix data) and RMC (recommended minimum: speed and course).

use crate::error::NmeaError;

const KNOTS_TO_KMH: f64 = 1.852;

/// GGA payload. Coordinates are `None` while the receiver has no position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GgaFix {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub fix_quality: u8,
    pub satellites: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RmcCourse {
    pub speed_kmh: Option<f64>,
    pub course_deg: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sentence {
    Gga(GgaFix),
    Rmc(RmcCourse),
}

/// Parse one line. `Ok(None)` for blank lines and sentence types we ignore
/// (GSV, GSA, VTG, ...).
pub fn parse_sentence(line: &str) -> Result<Option<Sentence>, NmeaError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let body = line.strip_prefix('$').ok_or(NmeaError::MissingStart)?;

    let body = match body.split_once('*') {
        Some((data, checksum)) => {
            verify_checksum(data, checksum)?;
            data
        }
        None => body,
    };

    let fields: Vec<&str> = body.split(',').collect();
    // Talker id is the first two characters (GP, GN, GL, GA, BD, ...).
    let kind = fields[0].get(2..).unwrap_or("");
    match kind {
        "GGA" => parse_gga(&fields).map(|fix| Some(Sentence::Gga(fix))),
        "RMC" => parse_rmc(&fields).map(|course| Some(Sentence::Rmc(course))),
        _ => Ok(None),
    }
}

fn verify_checksum(data: &str, checksum: &str) -> Result<(), NmeaError> {
    let checksum = checksum.trim();
    let expected = u8::from_str_radix(checksum, 16)
        .map_err(|_| NmeaError::BadChecksumField(checksum.to_string()))?;
    let computed = data.bytes().fold(0u8, |acc, b| acc ^ b);
    if expected != computed {
        return Err(NmeaError::Checksum { expected, computed });
    }
    Ok(())
}

fn require(kind: &'static str, fields: &[&str], needed: usize) -> Result<(), NmeaError> {
    if fields.len() < needed {
        return Err(NmeaError::TooFewFields {
            kind,
            found: fields.len(),
            needed,
        });
    }
    Ok(())
}

// $--GGA,hhmmss.ss,llll.ll,a,yyyyy.yy,a,q,nn,h.h,alt,M,...
fn parse_gga(fields: &[&str]) -> Result<GgaFix, NmeaError> {
    require("GGA", fields, 10)?;

    let latitude = coordinate("latitude", fields[2], fields[3], 'N', 'S')?;
    let longitude = coordinate("longitude", fields[4], fields[5], 'E', 'W')?;
    let fix_quality = optional_number::<u8>("fix quality", fields[6])?.unwrap_or(0);
    let satellites = optional_number::<u32>("satellites", fields[7])?.unwrap_or(0);
    let altitude = optional_number::<f64>("altitude", fields[9])?;

    Ok(GgaFix {
        latitude,
        longitude,
        altitude,
        fix_quality,
        satellites,
    })
}

// $--RMC,hhmmss.ss,A,llll.ll,a,yyyyy.yy,a,x.x,x.x,ddmmyy,...
fn parse_rmc(fields: &[&str]) -> Result<RmcCourse, NmeaError> {
    require("RMC", fields, 9)?;

    let speed_knots = optional_number::<f64>("speed", fields[7])?;
    let course_deg = optional_number::<f64>("course", fields[8])?;

    Ok(RmcCourse {
        speed_kmh: speed_knots.map(|knots| knots * KNOTS_TO_KMH),
        course_deg,
    })
}

fn optional_number<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<Option<T>, NmeaError> {
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>().map(Some).map_err(|_| NmeaError::BadField {
        field,
        value: raw.to_string(),
    })
}

/// `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere -> signed decimal degrees.
fn coordinate(
    field: &'static str,
    raw: &str,
    hemisphere: &str,
    positive: char,
    negative: char,
) -> Result<Option<f64>, NmeaError> {
    let Some(value) = optional_number::<f64>(field, raw)? else {
        return Ok(None);
    };
    if !value.is_finite() || value < 0.0 {
        return Err(NmeaError::BadField {
            field,
            value: raw.to_string(),
        });
    }

    let degrees = (value / 100.0).trunc();
    let minutes = value - degrees * 100.0;
    if minutes >= 60.0 {
        return Err(NmeaError::BadField {
            field,
            value: raw.to_string(),
        });
    }
    let decimal = degrees + minutes / 60.0;

    let mut hemi = hemisphere.chars();
    match (hemi.next(), hemi.next()) {
        (Some(c), None) if c == positive => Ok(Some(decimal)),
        (Some(c), None) if c == negative => Ok(Some(-decimal)),
        _ => Err(NmeaError::BadField {
            field: "hemisphere",
            value: hemisphere.to_string(),
        }),
    }
}

/// Append `*hh` to a sentence body.
#[cfg(test)]
pub(crate) fn with_checksum(body: &str) -> String {
    let data = body.strip_prefix('$').unwrap_or(body);
    let checksum = data.bytes().fold(0u8, |acc, b| acc ^ b);
    format!("${}*{:02X}", data, checksum)
}
