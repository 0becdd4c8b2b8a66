mod error;
mod schema;
mod tuple;
mod value;

pub use error::{RecordError, RecordResult};
pub use schema::{ColumnDef, TupleDesc};
pub use tuple::{RecordId, SlotId, Tuple};
pub use value::{Field, FieldType};
