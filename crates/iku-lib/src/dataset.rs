//! CSV loading for the provincial training and hot-test files
//!
//! The source spreadsheets mix Indonesian number formatting (`1.234,5`,
//! `22.774.562`) with plain decimals (`43.14`), and their headers carry
//! stray whitespace and byte-order marks. Everything is normalized here so
//! the rest of the crate only sees clean `f64` rows.

use crate::augment::AugmentedDataset;
use crate::error::{IkuError, Result};
use crate::models::{FeatureVector, ProvinceRecord, FEATURE_COLUMNS, NUM_FEATURES};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info};

/// Column holding the province name
pub const PROVINCE_COLUMN: &str = "Provinsi";

/// Column holding the observed air quality index
pub const TARGET_COLUMN: &str = "Indeks_Kualitas_Udara_(%)";

/// Trim, drop byte-order marks and join internal whitespace with `_`
pub fn clean_column_name(name: &str) -> String {
    name.replace('\u{feff}', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Parse a numeric cell written with either Indonesian or plain formatting.
///
/// With a comma present, dots group thousands and the comma is the decimal
/// separator. Without one, dots are thousands separators only when the
/// string is exactly `d{1,3}(.ddd)+`; otherwise the dot is a decimal point.
pub fn normalize_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else if is_thousands_grouped(&cleaned) {
        cleaned.replace('.', "")
    } else {
        cleaned
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn is_thousands_grouped(value: &str) -> bool {
    let digits = value.strip_prefix('-').unwrap_or(value);
    let mut groups = digits.split('.');
    let head_ok = groups
        .next()
        .map(|g| (1..=3).contains(&g.len()) && g.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false);
    let mut tail_count = 0;
    for group in groups {
        if group.len() != 3 || !group.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        tail_count += 1;
    }
    head_ok && tail_count > 0
}

/// Read province records from any CSV source.
///
/// The four feature columns are required. The province column falls back
/// to `row N` when absent; the target column is optional.
pub fn read_records<R: Read>(source: R) -> Result<Vec<ProvinceRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers: Vec<String> = reader.headers()?.iter().map(clean_column_name).collect();
    let position = |name: &str| headers.iter().position(|h| h == name);

    let mut feature_idx = [0usize; NUM_FEATURES];
    for (slot, column) in feature_idx.iter_mut().zip(FEATURE_COLUMNS) {
        *slot = position(column).ok_or_else(|| {
            IkuError::InvalidInput(format!("CSV is missing required column {}", column))
        })?;
    }
    let province_idx = position(PROVINCE_COLUMN);
    let target_idx = position(TARGET_COLUMN);

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let line = record
            .position()
            .map(|p| p.line())
            .unwrap_or(row as u64 + 2);

        let cell = |idx: usize, column: &str| -> Result<f64> {
            let raw = record.get(idx).unwrap_or("");
            normalize_number(raw).ok_or_else(|| {
                IkuError::InvalidInput(format!(
                    "column {} on line {}: cannot parse {:?} as a number",
                    column, line, raw
                ))
            })
        };

        let mut values = [0.0; NUM_FEATURES];
        for i in 0..NUM_FEATURES {
            values[i] = cell(feature_idx[i], FEATURE_COLUMNS[i])?;
        }
        let actual = match target_idx {
            Some(idx) if !record.get(idx).unwrap_or("").is_empty() => {
                Some(cell(idx, TARGET_COLUMN)?)
            }
            _ => None,
        };
        let province = province_idx
            .and_then(|idx| record.get(idx))
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("row {}", row + 1));

        records.push(ProvinceRecord {
            province,
            features: FeatureVector::from_array(values),
            actual,
        });
    }

    debug!(rows = records.len(), has_target = target_idx.is_some(), "CSV parsed");
    Ok(records)
}

/// Load province records from a CSV file
pub fn load_records(path: &Path) -> Result<Vec<ProvinceRecord>> {
    let file = File::open(path)?;
    let records = read_records(file)?;
    info!(path = %path.display(), rows = records.len(), "Dataset loaded");
    Ok(records)
}

/// Split records into a feature matrix and target vector.
///
/// Every record must carry an observed target.
pub fn labeled_rows(records: &[ProvinceRecord]) -> Result<(Vec<[f64; NUM_FEATURES]>, Vec<f64>)> {
    let mut x = Vec::with_capacity(records.len());
    let mut y = Vec::with_capacity(records.len());
    for record in records {
        let target = record.actual.ok_or_else(|| {
            IkuError::InvalidInput(format!(
                "record {} has no {} value",
                record.province, TARGET_COLUMN
            ))
        })?;
        x.push(record.features.to_array());
        y.push(target);
    }
    Ok((x, y))
}

/// Write an augmented dataset with the original column headers.
///
/// Values carry six decimals so they never look like thousands-grouped
/// integers when read back.
pub fn write_augmented<W: Write>(sink: W, dataset: &AugmentedDataset) -> Result<()> {
    let mut writer = csv::Writer::from_writer(sink);
    let mut header: Vec<&str> = FEATURE_COLUMNS.to_vec();
    header.push(TARGET_COLUMN);
    writer.write_record(&header)?;

    for (row, target) in dataset.features.iter().zip(&dataset.targets) {
        let mut cells: Vec<String> = row.iter().map(|v| format!("{:.6}", v)).collect();
        cells.push(format!("{:.6}", target));
        writer.write_record(&cells)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_augmented_csv(path: &Path, dataset: &AugmentedDataset) -> Result<()> {
    let file = File::create(path)?;
    write_augmented(file, dataset)?;
    info!(path = %path.display(), rows = dataset.len(), "Augmented dataset written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_column_name() {
        assert_eq!(clean_column_name("  IKTL_(%) "), "IKTL_(%)");
        assert_eq!(clean_column_name("\u{feff}Provinsi"), "Provinsi");
        assert_eq!(
            clean_column_name("Rumah Tangga  Listrik\tPLN_(%)"),
            "Rumah_Tangga_Listrik_PLN_(%)"
        );
    }

    #[test]
    fn test_normalize_number_formats() {
        assert_eq!(normalize_number("1.234,5"), Some(1234.5));
        assert_eq!(normalize_number("22.774.562"), Some(22774562.0));
        assert_eq!(normalize_number("142.862"), Some(142862.0));
        assert_eq!(normalize_number("43.14"), Some(43.14));
        assert_eq!(normalize_number("87,65"), Some(87.65));
        assert_eq!(normalize_number("336798"), Some(336798.0));
        assert_eq!(normalize_number("1234.5"), Some(1234.5));
        assert_eq!(normalize_number("-1.000"), Some(-1000.0));
        assert_eq!(normalize_number(" 12 "), Some(12.0));
    }

    #[test]
    fn test_normalize_number_rejects_garbage() {
        assert_eq!(normalize_number(""), None);
        assert_eq!(normalize_number("   "), None);
        assert_eq!(normalize_number("n/a"), None);
        assert_eq!(normalize_number("inf"), None);
    }

    #[test]
    fn test_read_records_with_indonesian_formatting() {
        let csv = "\u{feff}Provinsi,IKTL_(%),Karhutla_(ha),Kendaraan_Bermotor,Rumah Tangga Listrik PLN_(%),Indeks_Kualitas_Udara_(%)\n\
                   Aceh,\"75,12\",\"1.234,5\",2.345.678,\"98,10\",\"88,4\"\n\
                   Bali,60.5,0,142.862,100,90\n";
        let records = read_records(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].province, "Aceh");
        assert_eq!(
            records[0].features.to_array(),
            [75.12, 1234.5, 2345678.0, 98.1]
        );
        assert_eq!(records[0].actual, Some(88.4));

        assert_eq!(records[1].features.motor_vehicles, 142862.0);
        assert_eq!(records[1].features.land_cover_quality, 60.5);
    }

    #[test]
    fn test_target_column_optional() {
        let csv = "IKTL_(%),Karhutla_(ha),Kendaraan_Bermotor,Rumah_Tangga_Listrik_PLN_(%)\n\
                   50,0,200000,80\n";
        let records = read_records(csv.as_bytes()).unwrap();
        assert_eq!(records[0].actual, None);
        assert_eq!(records[0].province, "row 1");
        assert!(labeled_rows(&records).is_err());
    }

    #[test]
    fn test_missing_column_is_reported() {
        let csv = "Provinsi,IKTL_(%),Kendaraan_Bermotor,Rumah_Tangga_Listrik_PLN_(%)\nAceh,1,2,3\n";
        let err = read_records(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Karhutla_(ha)"));
    }

    #[test]
    fn test_bad_cell_names_column_and_line() {
        let csv = "Provinsi,IKTL_(%),Karhutla_(ha),Kendaraan_Bermotor,Rumah_Tangga_Listrik_PLN_(%)\n\
                   Aceh,1,2,3,4\n\
                   Bali,1,abc,3,4\n";
        let err = read_records(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, IkuError::InvalidInput(_)));
        let message = err.to_string();
        assert!(message.contains("Karhutla_(ha)"));
        assert!(message.contains("line 3"));
    }

    #[test]
    fn test_augmented_csv_reads_back() {
        let dataset = AugmentedDataset {
            features: vec![[97.123, 1500.0, 142862.0, 43.14], [12.0, 0.0, 22774562.0, 100.0]],
            targets: vec![88.5, 71.25],
        };
        let mut buffer = Vec::new();
        write_augmented(&mut buffer, &dataset).unwrap();

        let records = read_records(buffer.as_slice()).unwrap();
        let (x, y) = labeled_rows(&records).unwrap();
        assert_eq!(x, dataset.features);
        assert_eq!(y, dataset.targets);
    }
}
