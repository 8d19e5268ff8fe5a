//! GPS extraction from embedded EXIF metadata.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use exif::{In, Reader, Tag, Value};

use crate::types::GpsFix;

/// Raw GPS tag values as read from an EXIF block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpsTags {
    pub latitude: Option<[f64; 3]>,
    pub latitude_ref: Option<String>,
    pub longitude: Option<[f64; 3]>,
    pub longitude_ref: Option<String>,
    pub altitude: Option<f64>,
    /// 1 means below sea level.
    pub altitude_ref: Option<u32>,
}

impl GpsTags {
    fn is_empty(&self) -> bool {
        *self == GpsTags::default()
    }

    /// Convert to decimal degrees with hemisphere and altitude sign correction.
    ///
    /// Latitude and longitude each need both their value and reference tag;
    /// without both axes there is no fix.
    pub fn to_fix(&self) -> Option<GpsFix> {
        let latitude = match (&self.latitude, &self.latitude_ref) {
            (Some(dms), Some(reference)) => {
                let value = dms_to_decimal(*dms);
                Some(if reference.eq_ignore_ascii_case("S") { -value } else { value })
            }
            _ => None,
        }?;

        let longitude = match (&self.longitude, &self.longitude_ref) {
            (Some(dms), Some(reference)) => {
                let value = dms_to_decimal(*dms);
                Some(if reference.eq_ignore_ascii_case("W") { -value } else { value })
            }
            _ => None,
        }?;

        let altitude = self
            .altitude
            .map(|alt| if self.altitude_ref == Some(1) { -alt } else { alt });

        Some(GpsFix {
            latitude,
            longitude,
            altitude,
        })
    }
}

/// `deg + min/60 + sec/3600`.
pub fn dms_to_decimal(dms: [f64; 3]) -> f64 {
    let [deg, min, sec] = dms;
    deg + min / 60.0 + sec / 3600.0
}

/// Extract a GPS fix from the image at `path`.
///
/// Missing metadata, a missing GPS block, or any parse failure yields `None`.
pub fn extract_gps(path: &Path) -> Option<GpsFix> {
    match read_gps_tags(path) {
        Ok(Some(tags)) => tags.to_fix(),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("Could not extract EXIF GPS from {}: {e}", path.display());
            None
        }
    }
}

/// Read the GPS tags of an image. `Ok(None)` means the image has no EXIF or no GPS block.
pub fn read_gps_tags(path: &Path) -> Result<Option<GpsTags>, exif::Error> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let exif = match Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_)) => {
            tracing::debug!("No EXIF block in {}", path.display());
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let tags = GpsTags {
        latitude: exif
            .get_field(Tag::GPSLatitude, In::PRIMARY)
            .and_then(|f| rational_triple(&f.value)),
        latitude_ref: exif
            .get_field(Tag::GPSLatitudeRef, In::PRIMARY)
            .and_then(|f| ascii_value(&f.value)),
        longitude: exif
            .get_field(Tag::GPSLongitude, In::PRIMARY)
            .and_then(|f| rational_triple(&f.value)),
        longitude_ref: exif
            .get_field(Tag::GPSLongitudeRef, In::PRIMARY)
            .and_then(|f| ascii_value(&f.value)),
        altitude: exif
            .get_field(Tag::GPSAltitude, In::PRIMARY)
            .and_then(|f| match &f.value {
                Value::Rational(v) => v.first().map(|r| r.to_f64()),
                _ => None,
            }),
        altitude_ref: exif
            .get_field(Tag::GPSAltitudeRef, In::PRIMARY)
            .and_then(|f| f.value.get_uint(0)),
    };

    if tags.is_empty() {
        return Ok(None);
    }
    Ok(Some(tags))
}

fn rational_triple(value: &Value) -> Option<[f64; 3]> {
    match value {
        Value::Rational(v) if v.len() >= 3 => Some([v[0].to_f64(), v[1].to_f64(), v[2].to_f64()]),
        _ => None,
    }
}

fn ascii_value(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use exif::experimental::Writer;
    use exif::{Field, Rational};

    use super::*;

    fn rationals(parts: &[(u32, u32)]) -> Value {
        Value::Rational(parts.iter().map(|&(num, denom)| Rational { num, denom }).collect())
    }

    /// JPEG carrying 25°1'58.8", 121°33'55.44" and a 12.5 m altitude.
    fn write_tagged_jpeg(path: &Path, lat_ref: &str, lon_ref: &str, altitude_ref: u8) {
        let field = |tag, value| Field {
            tag,
            ifd_num: In::PRIMARY,
            value,
        };
        let fields = [
            field(Tag::GPSLatitudeRef, Value::Ascii(vec![lat_ref.as_bytes().to_vec()])),
            field(Tag::GPSLatitude, rationals(&[(25, 1), (1, 1), (588, 10)])),
            field(Tag::GPSLongitudeRef, Value::Ascii(vec![lon_ref.as_bytes().to_vec()])),
            field(Tag::GPSLongitude, rationals(&[(121, 1), (33, 1), (5544, 100)])),
            field(Tag::GPSAltitudeRef, Value::Byte(vec![altitude_ref])),
            field(Tag::GPSAltitude, rationals(&[(125, 10)])),
        ];
        let mut writer = Writer::new();
        for f in &fields {
            writer.push_field(f);
        }
        let mut tiff = Cursor::new(Vec::new());
        writer.write(&mut tiff, false).unwrap();
        let tiff = tiff.into_inner();

        let mut jpeg = Cursor::new(Vec::new());
        image::DynamicImage::new_rgb8(8, 8)
            .write_to(&mut jpeg, image::ImageFormat::Jpeg)
            .unwrap();
        let jpeg = jpeg.into_inner();

        let segment_len = u16::try_from(2 + 6 + tiff.len()).unwrap();
        let mut out = jpeg[..2].to_vec();
        out.extend_from_slice(&[0xFF, 0xE1]);
        out.extend_from_slice(&segment_len.to_be_bytes());
        out.extend_from_slice(b"Exif\0\0");
        out.extend_from_slice(&tiff);
        out.extend_from_slice(&jpeg[2..]);
        std::fs::write(path, out).unwrap();
    }

    fn tags(lat_ref: &str, lon_ref: &str) -> GpsTags {
        GpsTags {
            latitude: Some([25.0, 1.0, 58.8]),
            latitude_ref: Some(lat_ref.to_string()),
            longitude: Some([121.0, 33.0, 55.44]),
            longitude_ref: Some(lon_ref.to_string()),
            altitude: Some(12.5),
            altitude_ref: Some(0),
        }
    }

    #[test]
    fn test_dms_to_decimal() {
        let value = dms_to_decimal([25.0, 1.0, 58.8]);
        assert!((value - 25.033).abs() < 1e-9);
    }

    #[test]
    fn test_northern_eastern_fix() {
        let fix = tags("N", "E").to_fix().unwrap();
        assert!((fix.latitude - 25.033).abs() < 1e-9);
        assert!((fix.longitude - 121.5654).abs() < 1e-9);
        assert_eq!(fix.altitude, Some(12.5));
    }

    #[test]
    fn test_southern_western_fix_is_negated() {
        let fix = tags("S", "W").to_fix().unwrap();
        assert!(fix.latitude < 0.0);
        assert!(fix.longitude < 0.0);
    }

    #[test]
    fn test_below_sea_level_altitude() {
        let mut t = tags("N", "E");
        t.altitude_ref = Some(1);
        assert_eq!(t.to_fix().unwrap().altitude, Some(-12.5));
    }

    #[test]
    fn test_missing_reference_gives_no_fix() {
        let mut t = tags("N", "E");
        t.longitude_ref = None;
        assert!(t.to_fix().is_none());
    }

    #[test]
    fn test_missing_altitude_is_none() {
        let mut t = tags("N", "E");
        t.altitude = None;
        let fix = t.to_fix().unwrap();
        assert!(fix.altitude.is_none());
    }

    #[test]
    fn test_reads_tags_from_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tagged.jpg");
        write_tagged_jpeg(&path, "N", "E", 0);

        let tags = read_gps_tags(&path).unwrap().unwrap();
        assert_eq!(tags.latitude_ref.as_deref(), Some("N"));
        assert_eq!(tags.longitude_ref.as_deref(), Some("E"));
        assert_eq!(tags.altitude_ref, Some(0));

        let fix = extract_gps(&path).unwrap();
        assert!((fix.latitude - 25.033).abs() < 1e-9);
        assert!((fix.longitude - 121.5654).abs() < 1e-9);
        assert_eq!(fix.altitude, Some(12.5));
    }

    #[test]
    fn test_southern_western_jpeg_below_sea_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("south.jpg");
        write_tagged_jpeg(&path, "S", "W", 1);

        let fix = extract_gps(&path).unwrap();
        assert!((fix.latitude + 25.033).abs() < 1e-9);
        assert!((fix.longitude + 121.5654).abs() < 1e-9);
        assert_eq!(fix.altitude, Some(-12.5));
    }

    #[test]
    fn test_image_without_exif() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.png");
        image::DynamicImage::new_rgb8(8, 8).save(&path).unwrap();
        assert!(extract_gps(&path).is_none());
    }

    #[test]
    fn test_garbage_file_is_absorbed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();
        assert!(extract_gps(&path).is_none());
    }

    #[test]
    fn test_missing_file_is_absorbed() {
        assert!(extract_gps(Path::new("/nonexistent/photo.jpg")).is_none());
    }
}
