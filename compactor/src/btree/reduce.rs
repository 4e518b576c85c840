//! Per-subtree aggregate values.
//!
//! Every node pointer carries a reduce value summarising the subtree below
//! it. A builder folds each item it receives into one accumulator; when the
//! node is flushed a clone of the accumulator is frozen into the pointer and
//! the accumulator is reset for the next node. Pointer nodes combine their
//! children's frozen values with `accumulate_subtree` (a "rereduce").
//!
//! The set of reducers is closed; the trait is sealed.

use bytes::Bytes;

use crate::btree::KvItem;
use crate::term::{TermError, TermReader, TermWriter, encode_u64, tags};
use crate::types::{DiskRecordHeader, DocInfo};

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::CountingReduce {}
    impl Sealed for super::ByIdReduce {}
    impl Sealed for super::NullReduce {}
}

/// An aggregate maintained over the items of a subtree.
///
/// `Clone` takes an independent snapshot; `Default` is the empty state.
pub trait Reduce: sealed::Sealed + Clone + Default + std::fmt::Debug {
    /// Fold one leaf key/value item into the running state.
    fn accumulate_leaf(&mut self, item: &KvItem) -> Result<(), TermError>;

    /// Fold another subtree's finalized state into this one.
    fn accumulate_subtree(&mut self, other: &Self);

    /// Encode the current state as a term.
    fn encode(&self) -> Bytes;

    /// Decode a value produced by `encode`.
    fn decode(encoded: &[u8]) -> Result<Self, TermError>;

    /// Return to the empty state.
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Counts leaf items. Used for the by-sequence index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountingReduce {
    pub count: u64,
}

impl Reduce for CountingReduce {
    fn accumulate_leaf(&mut self, _item: &KvItem) -> Result<(), TermError> {
        self.count += 1;
        Ok(())
    }

    fn accumulate_subtree(&mut self, other: &Self) {
        self.count += other.count;
    }

    fn encode(&self) -> Bytes {
        encode_u64(self.count)
    }

    fn decode(encoded: &[u8]) -> Result<Self, TermError> {
        let mut reader = TermReader::new(encoded);
        let count = reader.u64()?;
        reader.finish()?;
        Ok(Self { count })
    }
}

/// Live/deleted document counts and total document size. Used for the by-id
/// index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByIdReduce {
    pub live: u64,
    pub deleted: u64,
    pub total_size: u64,
}

impl ByIdReduce {
    /// Fold a temporary-file record without going through an encoded item.
    pub fn accumulate_raw_record(&mut self, record: &DiskRecordHeader) {
        self.add(record.deleted, record.size);
    }

    fn add(&mut self, deleted: bool, size: u32) {
        if deleted {
            self.deleted += 1;
        } else {
            self.live += 1;
        }
        self.total_size += u64::from(size);
    }
}

impl Reduce for ByIdReduce {
    /// Decodes the item as a by-id index entry.
    fn accumulate_leaf(&mut self, item: &KvItem) -> Result<(), TermError> {
        let info = DocInfo::from_id_entry(&item.key, &item.value)?;
        self.add(info.deleted, info.size);
        Ok(())
    }

    fn accumulate_subtree(&mut self, other: &Self) {
        self.live += other.live;
        self.deleted += other.deleted;
        self.total_size += other.total_size;
    }

    fn encode(&self) -> Bytes {
        let mut writer = TermWriter::with_capacity(2 + 3 * 11);
        writer.tuple_header(3);
        writer.u64(self.live);
        writer.u64(self.deleted);
        writer.u64(self.total_size);
        writer.finish()
    }

    fn decode(encoded: &[u8]) -> Result<Self, TermError> {
        let mut reader = TermReader::new(encoded);
        reader.tuple_of(3)?;
        let value = Self {
            live: reader.u64()?,
            deleted: reader.u64()?,
            total_size: reader.u64()?,
        };
        reader.finish()?;
        Ok(value)
    }
}

/// Carries no information. Encodes as the empty list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullReduce;

impl Reduce for NullReduce {
    fn accumulate_leaf(&mut self, _item: &KvItem) -> Result<(), TermError> {
        Ok(())
    }

    fn accumulate_subtree(&mut self, _other: &Self) {}

    fn encode(&self) -> Bytes {
        Bytes::from_static(&[tags::NIL])
    }

    fn decode(encoded: &[u8]) -> Result<Self, TermError> {
        let mut reader = TermReader::new(encoded);
        let offset = reader.position();
        if reader.list_header()? != 0 {
            return Err(TermError::UnexpectedTag {
                offset,
                expected: "nil",
                found: tags::LIST,
            });
        }
        reader.finish()?;
        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_item(id: &str, deleted: bool, size: u32) -> KvItem {
        let info = DocInfo {
            id: Bytes::copy_from_slice(id.as_bytes()),
            deleted,
            size,
            ..DocInfo::default()
        };
        KvItem::new(
            info.id_key().expect("key"),
            info.id_value().expect("value"),
        )
    }

    #[test]
    fn test_counting() {
        let mut reduce = CountingReduce::default();
        let item = KvItem::new(encode_u64(1), encode_u64(2));
        reduce.accumulate_leaf(&item).expect("leaf");
        reduce.accumulate_leaf(&item).expect("leaf");

        let mut parent = CountingReduce { count: 40 };
        parent.accumulate_subtree(&reduce);
        assert_eq!(parent.count, 42);
        assert_eq!(parent.encode().as_ref(), &[97, 42]);
        assert_eq!(CountingReduce::decode(&parent.encode()).expect("decode"), parent);
    }

    #[test]
    fn test_by_id_leaf_and_raw_paths_agree() {
        let mut from_items = ByIdReduce::default();
        from_items
            .accumulate_leaf(&id_item("a", false, 100))
            .expect("leaf");
        from_items
            .accumulate_leaf(&id_item("b", true, 5))
            .expect("leaf");

        let mut from_records = ByIdReduce::default();
        for (deleted, size) in [(false, 100), (true, 5)] {
            from_records.accumulate_raw_record(&DiskRecordHeader {
                db_seq: 1,
                rev_seq: 1,
                body_offset: 0,
                len: 42,
                id_len: 0,
                rev_meta_len: 0,
                size,
                deleted,
                content_meta: 0,
            });
        }

        let expected = ByIdReduce {
            live: 1,
            deleted: 1,
            total_size: 105,
        };
        assert_eq!(from_items, expected);
        assert_eq!(from_records, expected);
    }

    #[test]
    fn test_by_id_leaf_rejects_foreign_value() {
        let mut reduce = ByIdReduce::default();
        let item = KvItem::new(encode_u64(1), encode_u64(2));
        assert!(reduce.accumulate_leaf(&item).is_err());
        assert_eq!(reduce, ByIdReduce::default());
    }

    #[test]
    fn test_by_id_encoding() {
        let reduce = ByIdReduce {
            live: 7,
            deleted: 3,
            total_size: 715,
        };
        let encoded = reduce.encode();
        assert_eq!(encoded.as_ref(), &[104, 3, 97, 7, 97, 3, 98, 0, 0, 2, 203]);
        assert_eq!(ByIdReduce::decode(&encoded).expect("decode"), reduce);
    }

    #[test]
    fn test_clone_is_independent_of_reset() {
        let mut reduce = ByIdReduce::default();
        reduce.accumulate_leaf(&id_item("a", false, 9)).expect("leaf");
        let frozen = reduce;
        reduce.reset();
        assert_eq!(reduce, ByIdReduce::default());
        assert_eq!(frozen.live, 1);
        assert_eq!(frozen.total_size, 9);
    }

    #[test]
    fn test_null() {
        let mut reduce = NullReduce;
        reduce
            .accumulate_leaf(&KvItem::new(encode_u64(1), encode_u64(1)))
            .expect("leaf");
        assert_eq!(reduce.encode().as_ref(), &[106]);
        assert_eq!(NullReduce::decode(&[106]).expect("decode"), NullReduce);
        assert!(NullReduce::decode(&[97, 1]).is_err());
    }
}
