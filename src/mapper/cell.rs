//! Cell coercion: converting a raw result cell into a field's declared type
//!
//! Every type a mapped field may declare implements [`FromCell`]. The impl decides
//! what the "missing" marker ([`CellValue::Null`]) becomes for that type and how a
//! present cell is converted.

use crate::db::CellValue;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Why a single cell could not be coerced
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CellError {
    /// The cell's kind cannot become the declared type
    Incompatible,
    /// The conversion was attempted and failed
    Invalid(String),
    /// The declared type cannot be mapped from any cell
    Unsupported,
}

impl CellError {
    fn invalid(detail: impl Into<String>) -> Self {
        CellError::Invalid(detail.into())
    }
}

/// Conversion from a result cell into a field value.
pub trait FromCell: Sized {
    /// Convert a present (non-NULL) cell
    fn from_value(cell: &CellValue) -> Result<Self, CellError>;

    /// Value for the missing marker
    fn from_missing() -> Result<Self, CellError>;

    fn from_cell(cell: &CellValue) -> Result<Self, CellError> {
        if cell.is_null() {
            Self::from_missing()
        } else {
            Self::from_value(cell)
        }
    }
}

macro_rules! integer_from_cell {
    ($($ty:ty),*) => {$(
        impl FromCell for $ty {
            fn from_value(cell: &CellValue) -> Result<Self, CellError> {
                match cell {
                    CellValue::Int(v) => <$ty>::try_from(*v)
                        .map_err(|_| CellError::invalid(format!("{} is out of range", v))),
                    _ => Err(CellError::Incompatible),
                }
            }

            fn from_missing() -> Result<Self, CellError> {
                Ok(0)
            }
        }
    )*};
}

integer_from_cell!(i8, i16, i32, i64, u8, u16, u32, u64);

impl FromCell for f64 {
    fn from_value(cell: &CellValue) -> Result<Self, CellError> {
        match cell {
            CellValue::Float(v) => Ok(*v),
            CellValue::Int(v) => Ok(*v as f64),
            CellValue::Decimal(v) => v
                .to_f64()
                .ok_or_else(|| CellError::invalid(format!("{} does not fit a double", v))),
            _ => Err(CellError::Incompatible),
        }
    }

    fn from_missing() -> Result<Self, CellError> {
        Ok(0.0)
    }
}

impl FromCell for f32 {
    /// Parsed from the cell's text, so numeric strings are accepted too
    fn from_value(cell: &CellValue) -> Result<Self, CellError> {
        match cell {
            CellValue::Float(v) => Ok(*v as f32),
            CellValue::Int(_) | CellValue::Decimal(_) | CellValue::String(_) => {
                let text = cell.to_string();
                text.trim()
                    .parse::<f32>()
                    .map_err(|e| CellError::invalid(format!("'{}': {}", text, e)))
            }
            _ => Err(CellError::Incompatible),
        }
    }

    fn from_missing() -> Result<Self, CellError> {
        Ok(0.0)
    }
}

impl FromCell for Decimal {
    fn from_value(cell: &CellValue) -> Result<Self, CellError> {
        match cell {
            CellValue::Decimal(v) => Ok(*v),
            CellValue::Int(v) => Ok(Decimal::from(*v)),
            CellValue::Float(v) => {
                Decimal::try_from(*v).map_err(|e| CellError::invalid(e.to_string()))
            }
            // numerics wider than 96 bits arrive as text
            CellValue::String(v) => v
                .trim()
                .parse::<Decimal>()
                .map_err(|e| CellError::invalid(format!("'{}': {}", v, e))),
            _ => Err(CellError::Incompatible),
        }
    }

    fn from_missing() -> Result<Self, CellError> {
        Ok(Decimal::ZERO)
    }
}

impl FromCell for bool {
    fn from_value(cell: &CellValue) -> Result<Self, CellError> {
        match cell {
            CellValue::Bool(v) => Ok(*v),
            CellValue::Int(v) => Ok(*v != 0),
            _ => Err(CellError::Incompatible),
        }
    }

    fn from_missing() -> Result<Self, CellError> {
        Ok(false)
    }
}

impl FromCell for char {
    fn from_value(cell: &CellValue) -> Result<Self, CellError> {
        match cell {
            CellValue::String(v) => {
                let mut chars = v.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(CellError::invalid(format!("'{}' is not a single character", v))),
                }
            }
            _ => Err(CellError::Incompatible),
        }
    }

    fn from_missing() -> Result<Self, CellError> {
        Ok('\0')
    }
}

impl FromCell for String {
    fn from_value(cell: &CellValue) -> Result<Self, CellError> {
        match cell {
            CellValue::String(v) | CellValue::DateTime(v) => Ok(v.clone()),
            _ => Err(CellError::Incompatible),
        }
    }

    fn from_missing() -> Result<Self, CellError> {
        Ok(String::new())
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

/// Parse the textual form of a date/time cell. Date-only text yields midnight;
/// a trailing UTC offset is ignored.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = chrono::DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f %:z") {
        return Some(dt.naive_local());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    parse_date(text).and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%m/%d/%Y"))
        .ok()
}

impl FromCell for NaiveDateTime {
    fn from_value(cell: &CellValue) -> Result<Self, CellError> {
        let text = cell.to_string();
        parse_datetime(&text).ok_or_else(|| CellError::invalid(format!("'{}' is not a date/time", text)))
    }

    fn from_missing() -> Result<Self, CellError> {
        Ok(NaiveDateTime::default())
    }
}

impl FromCell for NaiveDate {
    fn from_value(cell: &CellValue) -> Result<Self, CellError> {
        let text = cell.to_string();
        parse_date(text.trim())
            .or_else(|| parse_datetime(&text).map(|dt| dt.date()))
            .ok_or_else(|| CellError::invalid(format!("'{}' is not a date", text)))
    }

    fn from_missing() -> Result<Self, CellError> {
        Ok(NaiveDate::default())
    }
}

impl FromCell for Uuid {
    fn from_value(cell: &CellValue) -> Result<Self, CellError> {
        match cell {
            CellValue::Guid(v) => Ok(*v),
            CellValue::String(v) => Uuid::parse_str(v.trim()).map_err(|e| CellError::invalid(e.to_string())),
            _ => Err(CellError::Incompatible),
        }
    }

    fn from_missing() -> Result<Self, CellError> {
        Ok(Uuid::nil())
    }
}

impl FromCell for Vec<bool> {
    /// One flag per byte, non-zero is true
    fn from_value(cell: &CellValue) -> Result<Self, CellError> {
        match cell {
            CellValue::Binary(bytes) => Ok(bytes.iter().map(|b| *b != 0).collect()),
            _ => Err(CellError::Incompatible),
        }
    }

    fn from_missing() -> Result<Self, CellError> {
        Ok(Vec::new())
    }
}

impl FromCell for Vec<u8> {
    /// Binary cells pass through. Any other cell is transcoded from its text at two
    /// bytes per character (UTF-16LE), which existing consumers of byte fields rely on.
    fn from_value(cell: &CellValue) -> Result<Self, CellError> {
        match cell {
            CellValue::Binary(bytes) => Ok(bytes.clone()),
            other => Ok(text_to_wide_bytes(&other.to_string())),
        }
    }

    fn from_missing() -> Result<Self, CellError> {
        Ok(Vec::new())
    }
}

fn text_to_wide_bytes(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

/// The raw cell, untouched
impl FromCell for CellValue {
    fn from_value(cell: &CellValue) -> Result<Self, CellError> {
        Ok(cell.clone())
    }

    fn from_missing() -> Result<Self, CellError> {
        Ok(CellValue::Null)
    }
}

impl<T: FromCell> FromCell for Option<T> {
    fn from_value(cell: &CellValue) -> Result<Self, CellError> {
        T::from_value(cell).map(Some)
    }

    fn from_missing() -> Result<Self, CellError> {
        Ok(None)
    }
}

/// Define a fieldless enum that maps from an integral cell.
///
/// The enum must also implement `Default`; that variant is used for the missing
/// marker on non-optional fields. Discriminants not listed fail the conversion.
///
/// ```
/// use sql_dal::sql_enum;
///
/// sql_enum! {
///     #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
///     pub enum OrderStatus {
///         #[default]
///         Pending = 0,
///         Shipped = 1,
///         Cancelled = 9,
///     }
/// }
/// ```
#[macro_export]
macro_rules! sql_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:expr ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $( $(#[$vmeta])* $variant = $value ),*
        }

        impl $crate::mapper::FromCell for $name {
            fn from_value(cell: &$crate::db::CellValue) -> ::std::result::Result<Self, $crate::mapper::CellError> {
                let raw = match cell {
                    $crate::db::CellValue::Int(v) => *v,
                    _ => return Err($crate::mapper::CellError::Incompatible),
                };
                $( if raw == ($value) as i64 { return Ok($name::$variant); } )*
                Err($crate::mapper::CellError::Invalid(format!(
                    "{} is not a value of {}",
                    raw,
                    stringify!($name)
                )))
            }

            fn from_missing() -> ::std::result::Result<Self, $crate::mapper::CellError> {
                Ok(<$name as ::std::default::Default>::default())
            }
        }
    };
}
