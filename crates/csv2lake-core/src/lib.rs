// csv2lake-core - Table storage over an object store
//
// A table is a directory of immutable Parquet data files plus a commit log.
// Each commit records the complete active file list, so readers always resolve
// a consistent snapshot: an in-flight write (data file uploaded, commit not
// yet) is never observable.
//
// This layer is stateless between calls. There is no retry, backoff, or
// timeout handling here; that belongs to the store client or the caller.

mod encoding;
mod error;
mod log;
mod scan;
mod schema;
mod storage;
mod writer;

pub use error::{LakeError, Result};
pub use log::{CommitEntry, CommitOperation};
pub use scan::{CmpOp, Predicate, ScalarValue, TableReader, TableScan};
pub use storage::build_operator;
pub use writer::{SchemaMode, TableWriter, WriteMode};

// Re-export so callers can construct in-memory operators in tests without
// depending on opendal directly.
pub use opendal::Operator;
