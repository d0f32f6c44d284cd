//! Mapping descriptors: which result column sets which field

use crate::db::CellValue;
use crate::mapper::cell::{CellError, FromCell};

type Setter<T> = Box<dyn Fn(&mut T, &CellValue) -> Result<(), CellError> + Send + Sync>;

/// One column-to-field binding
pub struct FieldMapping<T> {
    pub column: String,
    pub field: String,
    pub declared_type: String,
    setter: Setter<T>,
}

impl<T> FieldMapping<T> {
    pub(crate) fn apply(&self, target: &mut T, cell: &CellValue) -> Result<(), CellError> {
        (self.setter)(target, cell)
    }
}

impl<T> std::fmt::Debug for FieldMapping<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldMapping")
            .field("column", &self.column)
            .field("field", &self.field)
            .field("declared_type", &self.declared_type)
            .finish()
    }
}

/// The column → setter table for one target shape.
///
/// Built with [`RowMapping::field`]; usually produced by [`MapRow::row_mapping`]
/// through [`impl_map_row!`](crate::impl_map_row).
pub struct RowMapping<T> {
    target: &'static str,
    fields: Vec<FieldMapping<T>>,
}

impl<T: 'static> RowMapping<T> {
    pub fn new(target: &'static str) -> Self {
        Self {
            target,
            fields: Vec::new(),
        }
    }

    /// Bind `column` to a field set by `setter`. The field is reported under the
    /// column's name in errors.
    pub fn field<F, S>(self, column: &str, setter: S) -> Self
    where
        F: FromCell + 'static,
        S: Fn(&mut T, F) + Send + Sync + 'static,
    {
        self.named_field(column, column, setter)
    }

    /// Bind `column` to the field called `field`
    pub fn named_field<F, S>(mut self, column: &str, field: &str, setter: S) -> Self
    where
        F: FromCell + 'static,
        S: Fn(&mut T, F) + Send + Sync + 'static,
    {
        self.fields.push(FieldMapping {
            column: column.to_string(),
            field: field.to_string(),
            declared_type: short_type_name(std::any::type_name::<F>()),
            setter: Box::new(move |target, cell| {
                let value = F::from_cell(cell)?;
                setter(target, value);
                Ok(())
            }),
        });
        self
    }
}

impl<T> RowMapping<T> {
    pub fn target(&self) -> &'static str {
        self.target
    }

    pub fn fields(&self) -> &[FieldMapping<T>] {
        &self.fields
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.column.as_str())
    }
}

/// A type that result rows can be mapped onto
pub trait MapRow: Default + Sized + 'static {
    fn row_mapping() -> RowMapping<Self>;
}

/// Strip module paths from a type name: `core::option::Option<alloc::string::String>`
/// becomes `Option<String>`.
pub fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();
    let mut chars = full.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                segment.clear();
            }
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | '&' | ';' => {
                out.push_str(&segment);
                segment.clear();
                out.push(c);
            }
            _ => segment.push(c),
        }
    }
    out.push_str(&segment);
    out
}

/// Implement [`MapRow`] for a struct by listing its mapped fields.
///
/// A field maps from the column of the same name unless `as "Column"` is given.
/// The struct must implement `Default`.
///
/// ```
/// use sql_dal::impl_map_row;
///
/// #[derive(Default)]
/// struct User {
///     id: i32,
///     display_name: Option<String>,
/// }
///
/// impl_map_row!(User {
///     id as "Id",
///     display_name as "DisplayName",
/// });
/// ```
#[macro_export]
macro_rules! impl_map_row {
    ($ty:ident { $( $field:ident $( as $column:literal )? ),* $(,)? }) => {
        impl $crate::mapper::MapRow for $ty {
            fn row_mapping() -> $crate::mapper::RowMapping<Self> {
                $crate::mapper::RowMapping::new(stringify!($ty))
                $(
                    .named_field(
                        $crate::impl_map_row!(@column $field $( $column )?),
                        stringify!($field),
                        |row: &mut $ty, value| row.$field = value,
                    )
                )*
            }
        }
    };
    (@column $field:ident $column:literal) => { $column };
    (@column $field:ident) => { stringify!($field) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Sample {
        id: i32,
        label: Option<String>,
    }

    crate::impl_map_row!(Sample { id as "Id", label });

    #[test]
    fn test_macro_builds_descriptor() {
        let mapping = Sample::row_mapping();
        assert_eq!(mapping.target(), "Sample");
        assert_eq!(mapping.column_names().collect::<Vec<_>>(), vec!["Id", "label"]);
        assert_eq!(mapping.fields()[0].field, "id");
        assert_eq!(mapping.fields()[0].declared_type, "i32");
        assert_eq!(mapping.fields()[1].declared_type, "Option<String>");
    }

    #[test]
    fn test_setter_applies_coerced_value() {
        let mapping = Sample::row_mapping();
        let mut sample = Sample::default();
        mapping.fields()[0].apply(&mut sample, &CellValue::Int(9)).unwrap();
        mapping.fields()[1]
            .apply(&mut sample, &CellValue::String("nine".into()))
            .unwrap();
        assert_eq!(sample.id, 9);
        assert_eq!(sample.label.as_deref(), Some("nine"));
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("i32"), "i32");
        assert_eq!(
            short_type_name("core::option::Option<alloc::string::String>"),
            "Option<String>"
        );
        assert_eq!(
            short_type_name("alloc::vec::Vec<u8>"),
            "Vec<u8>"
        );
    }
}
