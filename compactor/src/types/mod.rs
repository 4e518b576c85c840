//! Document metadata types shared by the indexes and the compactor.

mod disk_record;
mod doc_info;

pub use disk_record::{
    DISK_RECORD_HEADER_SIZE, DiskRecordCodec, DiskRecordHeader, RecordError, decode_record,
    encode_record,
};
pub use doc_info::DocInfo;
