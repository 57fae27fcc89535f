//!
//! The SecondaryIndex module contains the derived in-memory indexes of a [RecordStore](crate::RecordStore).
//! [IndexSpec] is re-exported.
//!

use std::collections::HashMap;

use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::Result;
use crate::records::{FieldValue, Record, RecordID};
use crate::schema::RecordSchema;

/// Describes an index: a name, and the fields whose values together form the bucket key
///
/// The key is the plain tuple of the field values, e.g. `[Byte(5), Byte(2)]` for
/// `(age band 5, female)`, so equality and hashing come from [FieldValue] itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name : String,
    pub fields : Vec<String>,
}

impl IndexSpec {
    pub fn new(name : &str, fields : &[&str]) -> Self {
        Self{
            name : name.to_string(),
            fields : fields.iter().map(|field| field.to_string()).collect(),
        }
    }
}

/// A built index.  It is never updated in place; the store throws it away and rebuilds it with a
/// full scan every time the cache is loaded.
pub(crate) struct SecondaryIndex {
    spec : IndexSpec,
    field_idxs : Vec<usize>,
    buckets : HashMap<Vec<FieldValue>, Vec<RecordID>>,
}

impl SecondaryIndex {

    /// Resolves the index field names against the schema, so an unknown field is refused at registration
    pub fn new(spec : IndexSpec, schema : &RecordSchema) -> Result<Self> {
        let field_idxs = spec.fields.iter()
            .map(|field| schema.index_of(field))
            .collect::<Result<Vec<usize>>>()?;
        Ok(Self{
            spec,
            field_idxs,
            buckets : HashMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    /// Replaces the buckets with ones computed from every cached record.  The bucket contents are
    /// in ascending RecordID order.
    pub fn rebuild(&mut self, records : &[Record]) {
        self.buckets.clear();
        for (idx, record) in records.iter().enumerate() {
            let key = self.key_for(record);
            self.buckets.entry(key).or_default().push(RecordID(idx as u32));
        }
    }

    fn key_for(&self, record : &Record) -> Vec<FieldValue> {
        self.field_idxs.iter()
            .map(|idx| record.value(*idx).cloned().unwrap_or(FieldValue::Missing))
            .collect()
    }

    pub fn bucket(&self, key : &[FieldValue]) -> &[RecordID] {
        self.buckets.get(key).map(|bucket| &bucket[..]).unwrap_or(&[])
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Picks one member of the bucket uniformly, or `None` if the bucket is empty
    pub fn choose<R : Rng + ?Sized>(&self, key : &[FieldValue], rng : &mut R) -> Option<RecordID> {
        let bucket = self.bucket(key);
        if bucket.is_empty() {
            None
        } else {
            Some(bucket[rng.gen_range(0..bucket.len())])
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    use super::*;
    use crate::schema::{FieldKind, FieldSpec};

    fn schema() -> RecordSchema {
        RecordSchema::new("people", vec![
            FieldSpec::new("age_band", FieldKind::Byte, 0),
            FieldSpec::new("sex", FieldKind::Byte, 1),
        ]).unwrap()
    }

    fn records(schema : &RecordSchema) -> Vec<Record> {
        [(1, 1), (1, 2), (1, 1), (2, 2)].iter()
            .map(|(age, sex)| schema.record(vec![FieldValue::Byte(*age), FieldValue::Byte(*sex)]).unwrap())
            .collect()
    }

    #[test]
    fn test_rebuild_groups_by_composite_key() {
        let schema = schema();
        let mut index = SecondaryIndex::new(IndexSpec::new("age_sex", &["age_band", "sex"]), &schema).unwrap();
        index.rebuild(&records(&schema));

        assert_eq!(index.bucket_count(), 3);
        assert_eq!(index.bucket(&[FieldValue::Byte(1), FieldValue::Byte(1)]), &[RecordID(0), RecordID(2)]);
        assert_eq!(index.bucket(&[FieldValue::Byte(2), FieldValue::Byte(2)]), &[RecordID(3)]);
        assert!(index.bucket(&[FieldValue::Byte(2), FieldValue::Byte(1)]).is_empty());
    }

    #[test]
    fn test_unknown_field_is_refused() {
        assert!(SecondaryIndex::new(IndexSpec::new("bad", &["age_band", "height"]), &schema()).is_err());
    }

    #[test]
    fn test_choose_is_reproducible_with_a_seed() {
        let schema = schema();
        let mut index = SecondaryIndex::new(IndexSpec::new("age_sex", &["age_band", "sex"]), &schema).unwrap();
        index.rebuild(&records(&schema));
        let key = [FieldValue::Byte(1), FieldValue::Byte(1)];

        let picks_a : Vec<_> = { let mut rng = Pcg64::seed_from_u64(7); (0..20).map(|_| index.choose(&key, &mut rng).unwrap()).collect() };
        let picks_b : Vec<_> = { let mut rng = Pcg64::seed_from_u64(7); (0..20).map(|_| index.choose(&key, &mut rng).unwrap()).collect() };
        assert_eq!(picks_a, picks_b);
        assert!(picks_a.iter().all(|id| *id == RecordID(0) || *id == RecordID(2)));

        let mut rng = Pcg64::seed_from_u64(7);
        assert_eq!(index.choose(&[FieldValue::Byte(9), FieldValue::Byte(9)], &mut rng), None);
    }
}
