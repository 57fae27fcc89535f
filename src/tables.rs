//!
//! The Tables module holds the schemas for the census extracts this crate formats.  Each one is
//! a field list and nothing else; the parse and binary logic lives in [RecordSchema].
//!
//! Column positions follow the column order of the published extract files.
//!

use crate::error::Result;
use crate::schema::{FieldKind, FieldSpec, RecordSchema};
use crate::secondary_index::IndexSpec;

/// Household Sample of Anonymised Records.  One row per household, described by its Household
/// Reference Person (HRP).
pub fn hsar() -> Result<RecordSchema> {
    RecordSchema::new("HSAR", vec![
        FieldSpec::new("household_id", FieldKind::Int, 0).range(0, i32::MAX as i64),
        FieldSpec::new("region", FieldKind::Byte, 1).range(1, 12),
        FieldSpec::new("hrp_age_band", FieldKind::Byte, 2).range(1, 16),
        FieldSpec::new("hrp_sex", FieldKind::Byte, 3).range(1, 2),
        FieldSpec::new("persons", FieldKind::Byte, 4).range(1, 30),
        FieldSpec::new("tenure", FieldKind::Byte, 5).range(1, 9).nullable(),
        FieldSpec::new("cars", FieldKind::Byte, 6).range(0, 4).nullable(),
        FieldSpec::new("limiting_illness", FieldKind::Bool, 7).nullable(),
    ]).map(|schema| schema.with_missing_tokens(&["", "-9"]))
}

/// Individual Sample of Anonymised Records.  One row per person.
pub fn isar() -> Result<RecordSchema> {
    RecordSchema::new("ISAR", vec![
        FieldSpec::new("person_id", FieldKind::Int, 0).range(0, i32::MAX as i64),
        FieldSpec::new("region", FieldKind::Byte, 1).range(1, 12),
        FieldSpec::new("age", FieldKind::Short, 2).range(0, 120),
        FieldSpec::new("age_band", FieldKind::Byte, 3).range(1, 16),
        FieldSpec::new("sex", FieldKind::Byte, 4).range(1, 2),
        FieldSpec::new("is_hrp", FieldKind::Bool, 5),
        FieldSpec::new("economic_activity", FieldKind::Byte, 6).range(1, 12).nullable(),
        FieldSpec::new("ethnic_group", FieldKind::Byte, 7).range(1, 16).nullable(),
    ]).map(|schema| schema.with_missing_tokens(&["", "-9"]))
}

/// Special Workplace Statistics: origin-destination flows of workers between areas
pub fn sws() -> Result<RecordSchema> {
    RecordSchema::new("SWS", vec![
        FieldSpec::new("origin", FieldKind::Code(10), 0),
        FieldSpec::new("destination", FieldKind::Code(10), 1),
        FieldSpec::new("all_persons", FieldKind::Int, 2).range(0, i32::MAX as i64),
        FieldSpec::new("males", FieldKind::Int, 3).range(0, i32::MAX as i64),
        FieldSpec::new("females", FieldKind::Int, 4).range(0, i32::MAX as i64),
    ])
}

/// Index of Multiple Deprivation.  One row per LSOA with its overall and domain ranks, rank 1 being
/// the most deprived.
pub fn imd() -> Result<RecordSchema> {
    RecordSchema::new("IMD", vec![
        FieldSpec::new("lsoa_code", FieldKind::Code(9), 0),
        FieldSpec::new("lad_code", FieldKind::Code(9), 1),
        FieldSpec::new("imd_rank", FieldKind::Int, 2).range(1, i32::MAX as i64).nullable(),
        FieldSpec::new("income_rank", FieldKind::Int, 3).range(1, i32::MAX as i64).nullable(),
        FieldSpec::new("employment_rank", FieldKind::Int, 4).range(1, i32::MAX as i64).nullable(),
    ])
}

/// Groups HSAR households by the age band and sex of their reference person, for cohort sampling
pub fn hsar_hrp_age_sex_index() -> IndexSpec {
    IndexSpec::new("hrp_age_sex", &["hrp_age_band", "hrp_sex"])
}

/// Groups ISAR people by age band and sex
pub fn isar_age_sex_index() -> IndexSpec {
    IndexSpec::new("age_sex", &["age_band", "sex"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::FieldValue;

    /// Encodes and decodes `values`, which must come back unchanged at the schema's record length
    fn assert_round_trip(schema : &RecordSchema, values : Vec<FieldValue>) {
        let record = schema.record(values).unwrap();
        let bytes = schema.encode(&record).unwrap();
        assert_eq!(bytes.len(), schema.record_length(), "{}", schema.name());
        assert_eq!(schema.decode(&bytes).unwrap(), record, "{}", schema.name());
    }

    #[test]
    fn test_record_lengths() {
        assert_eq!(hsar().unwrap().record_length(), 4 + 7);
        assert_eq!(isar().unwrap().record_length(), 4 + 1 + 2 + 1 + 1 + 1 + 1 + 1);
        assert_eq!(sws().unwrap().record_length(), 10 + 10 + 4 * 3);
        assert_eq!(imd().unwrap().record_length(), 9 + 9 + 4 * 3);
    }

    #[test]
    fn test_hsar_round_trip() {
        let schema = hsar().unwrap();
        assert_round_trip(&schema, vec![
            FieldValue::Int(48213), FieldValue::Byte(12), FieldValue::Byte(16), FieldValue::Byte(2),
            FieldValue::Byte(30), FieldValue::Byte(9), FieldValue::Byte(0), FieldValue::Bool(true),
        ]);
        //tenure, cars and limiting_illness are the nullable fields
        assert_round_trip(&schema, vec![
            FieldValue::Int(0), FieldValue::Byte(1), FieldValue::Byte(1), FieldValue::Byte(1),
            FieldValue::Byte(1), FieldValue::Missing, FieldValue::Missing, FieldValue::Missing,
        ]);
    }

    #[test]
    fn test_isar_round_trip() {
        let schema = isar().unwrap();
        assert_round_trip(&schema, vec![
            FieldValue::Int(i32::MAX), FieldValue::Byte(3), FieldValue::Short(120), FieldValue::Byte(16),
            FieldValue::Byte(1), FieldValue::Bool(false), FieldValue::Byte(12), FieldValue::Byte(16),
        ]);
        assert_round_trip(&schema, vec![
            FieldValue::Int(7), FieldValue::Byte(3), FieldValue::Short(0), FieldValue::Byte(1),
            FieldValue::Byte(2), FieldValue::Bool(true), FieldValue::Missing, FieldValue::Missing,
        ]);
    }

    #[test]
    fn test_sws_round_trip() {
        let schema = sws().unwrap();
        assert_round_trip(&schema, vec![
            FieldValue::Code("E02002330".to_string()), FieldValue::Code("W010000001".to_string()),
            FieldValue::Int(153), FieldValue::Int(80), FieldValue::Int(73),
        ]);
    }

    #[test]
    fn test_imd_round_trip() {
        let schema = imd().unwrap();
        assert_round_trip(&schema, vec![
            FieldValue::Code("E01000001".to_string()), FieldValue::Code("E09000001".to_string()),
            FieldValue::Int(29199), FieldValue::Int(32831), FieldValue::Int(1),
        ]);
        assert_round_trip(&schema, vec![
            FieldValue::Code("E01000001".to_string()), FieldValue::Code("E09000001".to_string()),
            FieldValue::Missing, FieldValue::Missing, FieldValue::Missing,
        ]);
    }

    #[test]
    fn test_index_fields_exist() {
        for field in hsar_hrp_age_sex_index().fields.iter() {
            assert!(hsar().unwrap().index_of(field).is_ok());
        }
        for field in isar_age_sex_index().fields.iter() {
            assert!(isar().unwrap().index_of(field).is_ok());
        }
    }

    #[test]
    fn test_sentinel_rows_are_rejected() {
        let schema = hsar().unwrap();
        let row = csv::StringRecord::from(vec!["17", "3", "-9", "1", "2", "1", "0", "1"]);
        assert!(schema.parse_row(&row).is_err());

        //Optional fields take the census -9 marker as missing
        let row = csv::StringRecord::from(vec!["17", "3", "5", "1", "2", "-9", "-9", "-9"]);
        let record = schema.parse_row(&row).unwrap();
        assert!(schema.value(&record, "tenure").unwrap().is_missing());
    }
}
