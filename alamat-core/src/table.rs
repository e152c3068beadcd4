//! CSV input and output
//!
//! Input columns are found by name from a fixed synonym list, so sheets
//! exported from different tools work without renaming headers. Output
//! headers follow the Indonesian layout users already know.

use crate::error::Error;
use crate::{Coordinate, GeocodeResult, GeocodeStatus};
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use serde::Serialize;
use std::io::{Read, Write};

const LATITUDE_NAMES: &[&str] = &["latitude", "lat", "y"];
const LONGITUDE_NAMES: &[&str] = &["longitude", "lon", "lng", "long", "x"];
const LOCALITY_NAMES: &[&str] = &["kelurahan", "desa", "locality", "suburb", "village"];
const SUBDISTRICT_NAMES: &[&str] = &["kecamatan", "subdistrict", "sub_district", "district"];

/// Road column value for rows nothing could resolve
pub const NOT_FOUND_ROAD: &str = "NOT_FOUND";

/// Road column value for resolved rows without a street name
pub const NO_ROAD: &str = "Tidak ada";

/// Sample rows offered to users as a starting point
const TEMPLATE_ROWS: [(f64, f64, &str, &str); 5] = [
    (-6.2088, 106.8456, "Menteng", "Menteng"),
    (-6.1751, 106.8650, "Gambir", "Gambir"),
    (-6.2146, 106.8451, "Tanah Abang", "Tanah Abang"),
    (-6.1969, 106.7685, "Kebon Jeruk", "Kebon Jeruk"),
    (-6.1703, 106.8143, "Petojo", "Gambir"),
];

/// Column positions detected in the input header
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMap {
    pub latitude: usize,
    pub longitude: usize,
    pub locality: Option<usize>,
    pub subdistrict: Option<usize>,
    /// Header names as written in the file, for reporting
    pub latitude_name: String,
    pub longitude_name: String,
}

impl ColumnMap {
    /// Find the coordinate and expectation columns in a header row
    pub fn detect(headers: &StringRecord) -> Result<Self, Error> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|header| names.contains(&header.trim().to_lowercase().as_str()))
        };

        let (latitude, longitude) = match (find(LATITUDE_NAMES), find(LONGITUDE_NAMES)) {
            (Some(lat), Some(lon)) => (lat, lon),
            (lat, lon) => {
                let mut missing = Vec::new();
                if lat.is_none() {
                    missing.push(format!("latitude ({})", LATITUDE_NAMES.join("/")));
                }
                if lon.is_none() {
                    missing.push(format!("longitude ({})", LONGITUDE_NAMES.join("/")));
                }
                return Err(Error::InputValidation(format!(
                    "Cannot find {} column",
                    missing.join(" and ")
                )));
            }
        };

        Ok(Self {
            latitude,
            longitude,
            locality: find(LOCALITY_NAMES),
            subdistrict: find(SUBDISTRICT_NAMES),
            latitude_name: headers[latitude].trim().to_string(),
            longitude_name: headers[longitude].trim().to_string(),
        })
    }
}

/// Parsed and validated input
#[derive(Debug, Clone)]
pub struct InputTable {
    pub columns: ColumnMap,
    pub coordinates: Vec<Coordinate>,
}

/// Read a CSV table of coordinates
///
/// Fails with [`Error::InputValidation`] when the coordinate columns are
/// missing or a row holds a value that is not a valid coordinate.
pub fn read_table<R: Read>(input: R) -> Result<InputTable, Error> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(input);

    let columns = ColumnMap::detect(reader.headers()?)?;
    log::info!("Using columns: {}, {}", columns.latitude_name, columns.longitude_name);

    let mut coordinates = Vec::new();
    for (row_index, record) in reader.records().enumerate() {
        let record = record?;
        let row_number = row_index + 1;

        let latitude = parse_number(&record, columns.latitude, "latitude", row_number)?;
        let longitude = parse_number(&record, columns.longitude, "longitude", row_number)?;

        let coordinate = Coordinate::new(row_index, latitude, longitude).with_expected(
            columns.locality.and_then(|i| record.get(i)),
            columns.subdistrict.and_then(|i| record.get(i)),
        );

        if !coordinate.is_in_range() {
            return Err(Error::InputValidation(format!(
                "Row {}: coordinate {}, {} is out of range",
                row_number, latitude, longitude
            )));
        }

        coordinates.push(coordinate);
    }

    log::info!("Loaded {} rows", coordinates.len());
    Ok(InputTable {
        columns,
        coordinates,
    })
}

fn parse_number(record: &StringRecord, column: usize, what: &str, row_number: usize) -> Result<f64, Error> {
    let raw = record.get(column).unwrap_or_default();
    // Spreadsheets in Indonesian locales export decimal commas
    raw.replace(',', ".").parse::<f64>().map_err(|_| {
        Error::InputValidation(format!(
            "Row {}: {} value '{}' is not a number",
            row_number, what, raw
        ))
    })
}

/// Output header, in the field order of [`OutputRow`]
const OUTPUT_HEADERS: [&str; 14] = [
    "Nama_Jalan",
    "Kelurahan",
    "Kecamatan",
    "Kota",
    "Provinsi",
    "Alamat_Lengkap",
    "Confidence",
    "Status",
    "Source",
    "Error",
    "Latitude",
    "Longitude",
    "Kelurahan_Original",
    "Kecamatan_Original",
];

/// One output row, in column order
#[derive(Debug, Serialize)]
struct OutputRow<'a> {
    road: &'a str,
    locality: &'a str,
    sub_district: &'a str,
    city: &'a str,
    province: &'a str,
    display_name: &'a str,
    confidence: String,
    status: &'a str,
    provider: &'a str,
    failure: &'a str,
    latitude: f64,
    longitude: f64,
    expected_locality: &'a str,
    expected_subdistrict: &'a str,
}

impl<'a> From<&'a GeocodeResult> for OutputRow<'a> {
    fn from(result: &'a GeocodeResult) -> Self {
        let road = match (result.status, result.road.as_deref()) {
            (GeocodeStatus::NotFound, _) => NOT_FOUND_ROAD,
            (GeocodeStatus::Ok, Some(road)) => road,
            (GeocodeStatus::Ok, None) => NO_ROAD,
        };

        Self {
            road,
            locality: result.locality.as_deref().unwrap_or_default(),
            sub_district: result.sub_district.as_deref().unwrap_or_default(),
            city: result.city.as_deref().unwrap_or_default(),
            province: result.province.as_deref().unwrap_or_default(),
            display_name: result.display_name.as_deref().unwrap_or_default(),
            confidence: format!("{:.2}", result.confidence),
            status: result.status.as_str(),
            provider: &result.provider,
            failure: result.failure.as_deref().unwrap_or_default(),
            latitude: result.latitude,
            longitude: result.longitude,
            expected_locality: result.expected_locality.as_deref().unwrap_or_default(),
            expected_subdistrict: result.expected_subdistrict.as_deref().unwrap_or_default(),
        }
    }
}

/// Write results as CSV, one row per result in the given order
///
/// The header is always written, so an empty batch still yields a table.
pub fn write_results<W: Write>(output: W, results: &[GeocodeResult]) -> Result<(), Error> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(output);
    writer.write_record(OUTPUT_HEADERS)?;
    for result in results {
        writer.serialize(OutputRow::from(result))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the sample input table
pub fn write_template<W: Write>(output: W) -> Result<(), Error> {
    let mut writer = WriterBuilder::new().from_writer(output);
    writer.write_record(["latitude", "longitude", "kelurahan", "kecamatan"])?;
    for (lat, lon, kelurahan, kecamatan) in TEMPLATE_ROWS {
        writer.write_record([
            lat.to_string(),
            lon.to_string(),
            kelurahan.to_string(),
            kecamatan.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::AddressCandidate;
    use crate::FetchFailure;
    use std::fs::File;
    use tempfile::TempDir;

    fn headers(names: &[&str]) -> StringRecord {
        StringRecord::from(names.to_vec())
    }

    #[test]
    fn test_detect_synonyms_case_insensitive() {
        let columns = ColumnMap::detect(&headers(&["ID", " LAT ", "Lng", "Kecamatan", "Desa"])).unwrap();
        assert_eq!(columns.latitude, 1);
        assert_eq!(columns.longitude, 2);
        assert_eq!(columns.subdistrict, Some(3));
        assert_eq!(columns.locality, Some(4));
        assert_eq!(columns.latitude_name, "LAT");
        assert_eq!(columns.longitude_name, "Lng");
    }

    #[test]
    fn test_detect_xy_columns() {
        let columns = ColumnMap::detect(&headers(&["x", "y"])).unwrap();
        assert_eq!(columns.latitude, 1);
        assert_eq!(columns.longitude, 0);
        assert_eq!(columns.locality, None);
    }

    #[test]
    fn test_detect_missing_longitude() {
        let err = ColumnMap::detect(&headers(&["latitude", "kelurahan"])).unwrap_err();
        match err {
            Error::InputValidation(message) => {
                assert!(message.contains("longitude"), "{}", message);
                assert!(!message.contains("latitude ("), "{}", message);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_read_table() {
        let csv = "latitude,longitude,kelurahan,kecamatan\n\
                   -6.2088,106.8456,Menteng,Menteng\n\
                   \"-6,1751\",\"106,8650\",,Gambir\n";
        let table = read_table(csv.as_bytes()).unwrap();

        assert_eq!(table.coordinates.len(), 2);
        let first = &table.coordinates[0];
        assert_eq!(first.row_index, 0);
        assert_eq!(first.latitude, -6.2088);
        assert_eq!(first.expected_locality.as_deref(), Some("Menteng"));

        let second = &table.coordinates[1];
        assert_eq!(second.row_index, 1);
        assert_eq!(second.latitude, -6.1751);
        assert_eq!(second.longitude, 106.865);
        assert_eq!(second.expected_locality, None);
        assert_eq!(second.expected_subdistrict.as_deref(), Some("Gambir"));
    }

    #[test]
    fn test_read_table_rejects_bad_values() {
        let not_a_number = "lat,lon\n-6.2,106.8\nabc,106.8\n";
        match read_table(not_a_number.as_bytes()) {
            Err(Error::InputValidation(message)) => assert!(message.starts_with("Row 2"), "{}", message),
            other => panic!("unexpected result {:?}", other),
        }

        let out_of_range = "lat,lon\n-96.2,106.8\n";
        assert!(matches!(
            read_table(out_of_range.as_bytes()),
            Err(Error::InputValidation(_))
        ));
    }

    #[test]
    fn test_write_results() {
        let ok_row = Coordinate::new(0, -6.2088, 106.8456).with_expected(Some("Menteng"), None);
        let mut candidate = AddressCandidate::empty("nominatim");
        candidate.locality = Some("Menteng".to_string());
        candidate.city = Some("Jakarta Pusat".to_string());

        let missing_row = Coordinate::new(1, -6.1751, 106.865);
        let results = vec![
            GeocodeResult::found(&ok_row, candidate, 0.6),
            GeocodeResult::not_found(&missing_row, Some(&FetchFailure::RateLimited)),
        ];

        let mut out = Vec::new();
        write_results(&mut out, &results).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "Nama_Jalan,Kelurahan,Kecamatan,Kota,Provinsi,Alamat_Lengkap,Confidence,Status,Source,Error,Latitude,Longitude,Kelurahan_Original,Kecamatan_Original"
        );
        assert_eq!(
            lines[1],
            "Tidak ada,Menteng,,Jakarta Pusat,,,0.60,OK,nominatim,,-6.2088,106.8456,Menteng,"
        );
        assert_eq!(
            lines[2],
            "NOT_FOUND,,,,,,0.00,NOT_FOUND,none,rate_limit,-6.1751,106.865,,"
        );
    }

    #[test]
    fn test_write_results_empty_has_header() {
        let mut out = Vec::new();
        write_results(&mut out, &[]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), format!("{}\n", OUTPUT_HEADERS.join(",")));
    }

    #[test]
    fn test_template_reads_back() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("template.csv");

        write_template(File::create(&path)?)?;
        let table = read_table(File::open(&path)?)?;

        assert_eq!(table.coordinates.len(), 5);
        assert!(table.coordinates.iter().all(|c| c.has_expectations()));
        assert_eq!(table.coordinates[4].expected_locality.as_deref(), Some("Petojo"));
        assert_eq!(table.coordinates[4].expected_subdistrict.as_deref(), Some("Gambir"));
        Ok(())
    }
}
