//! Table-valued parameters built on PostgreSQL composite-type arrays.
//!
//! Two binding styles are provided:
//!
//! - **Materialized**: rows are copied into a `Vec` of a `#[derive(ToSql)]`
//!   composite ([`MovieInsertRecord`], [`IdRecord`]) and the vector is bound.
//! - **Streamed**: [`RecordStream`] borrows the source rows and encodes each
//!   record straight into the bind buffer, so the rows are never copied into
//!   an intermediate collection.
//!
//! Both produce identical wire bytes for the same rows.

use crate::Movie;
use bytes::{BufMut, BytesMut};
use postgres_protocol::types::{self as wire, ArrayDimension};
use postgres_types::{to_sql_checked, Field, IsNull, Kind, ToSql, Type};
use std::error::Error;
use std::fmt;

type BoxError = Box<dyn Error + Sync + Send>;

/// Server type backing row inserts.
pub const MOVIES_INSERT_TYPE: &str = "tvp_movies_insert";

/// Server type backing id sets.
pub const IDS_TYPE: &str = "tvp_ids";

// ────────────────────────────────────────────────────────────────────────────────
// Materialized records
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, ToSql)]
#[postgres(name = "tvp_movies_insert")]
pub struct MovieInsertRecord {
    pub name: String,
}

impl From<&Movie> for MovieInsertRecord {
    fn from(movie: &Movie) -> Self {
        Self {
            name: movie.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ToSql)]
#[postgres(name = "tvp_ids")]
pub struct IdRecord {
    pub id: i32,
}

// ────────────────────────────────────────────────────────────────────────────────
// Streamed records
// ────────────────────────────────────────────────────────────────────────────────

/// A row that can be written as one record of a server composite type.
pub trait TableRecord: fmt::Debug + Sync {
    /// Name of the composite type the record binds against.
    const TYPE_NAME: &'static str;

    /// Encode the value of `field` in binary form.
    fn write_field(&self, field: &Field, out: &mut BytesMut) -> Result<IsNull, BoxError>;
}

impl TableRecord for Movie {
    const TYPE_NAME: &'static str = MOVIES_INSERT_TYPE;

    fn write_field(&self, field: &Field, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match field.name() {
            "name" => self.name.to_sql(field.type_(), out),
            other => Err(format!("{} has no field {other:?}", Self::TYPE_NAME).into()),
        }
    }
}

// Id sets are bound materialized (`IdRecord`); the streamed form exists to
// check both encodings agree.
#[cfg(test)]
impl TableRecord for i32 {
    const TYPE_NAME: &'static str = IDS_TYPE;

    fn write_field(&self, field: &Field, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match field.name() {
            "id" => self.to_sql(field.type_(), out),
            other => Err(format!("{} has no field {other:?}", Self::TYPE_NAME).into()),
        }
    }
}

/// Composite-array parameter encoded on demand from borrowed rows.
pub struct RecordStream<'a, T> {
    rows: &'a [T],
}

impl<'a, T: TableRecord> RecordStream<'a, T> {
    pub fn new(rows: &'a [T]) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<T> fmt::Debug for RecordStream<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStream")
            .field("records", &self.rows.len())
            .finish()
    }
}

impl<T: TableRecord> ToSql for RecordStream<'_, T> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        let member = match ty.kind() {
            Kind::Array(member) => member,
            _ => return Err(format!("expected an array of {}, got {}", T::TYPE_NAME, ty).into()),
        };
        let fields = match member.kind() {
            Kind::Composite(fields) => fields,
            _ => return Err(format!("{} is not a composite type", member).into()),
        };
        let dimension = ArrayDimension {
            len: i32::try_from(self.rows.len())?,
            lower_bound: 1,
        };

        wire::array_to_sql(
            Some(dimension),
            member.oid(),
            self.rows.iter(),
            |row, buf| {
                write_record(row, fields, buf)?;
                Ok(postgres_protocol::IsNull::No)
            },
            out,
        )?;
        Ok(IsNull::No)
    }

    fn accepts(ty: &Type) -> bool {
        match ty.kind() {
            Kind::Array(member) => {
                member.name() == T::TYPE_NAME && matches!(member.kind(), Kind::Composite(_))
            }
            _ => false,
        }
    }

    to_sql_checked!();
}

/// Binary composite layout: field count, then `(oid, len, bytes)` per field.
fn write_record<T: TableRecord>(
    row: &T,
    fields: &[Field],
    buf: &mut BytesMut,
) -> Result<(), BoxError> {
    buf.put_i32(i32::try_from(fields.len())?);
    for field in fields {
        buf.put_u32(field.type_().oid());
        let len_at = buf.len();
        buf.put_i32(0);
        let len = match row.write_field(field, buf)? {
            IsNull::Yes => -1,
            IsNull::No => i32::try_from(buf.len() - len_at - 4)?,
        };
        buf[len_at..len_at + 4].copy_from_slice(&len.to_be_bytes());
    }
    Ok(())
}
