use super::{DataType, DbError, Result, Value};
use std::collections::BTreeMap;

/// Ordered field name -> value mapping used for row data, contexts,
/// update values and where clauses.
pub type Fields = BTreeMap<String, Value>;

/// Builds a [`Fields`] map from `name => value` pairs.
///
/// ```
/// use memorm::{fields, Value};
///
/// let row = fields! { "name" => "Alice", "age" => 30 };
/// assert_eq!(row["age"], Value::Integer(30));
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        $crate::core::Fields::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut fields = $crate::core::Fields::new();
        $(
            fields.insert(::std::string::String::from($name), $crate::core::Value::from($value));
        )+
        fields
    }};
}

/// Overlays `context` on top of `base`; context entries win on collisions.
pub fn merge_fields(context: &Fields, base: &Fields) -> Fields {
    let mut merged = base.clone();
    for (name, value) in context {
        merged.insert(name.clone(), value.clone());
    }
    merged
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        if matches!(value, Value::Null) {
            if !self.nullable {
                return Err(DbError::ConstraintViolation(format!(
                    "Column '{}' cannot be NULL",
                    self.name
                )));
            }
            return Ok(());
        }

        if !self.data_type.is_compatible(value) {
            return Err(DbError::TypeMismatch(format!(
                "Column '{}' expects type {}, got {}",
                self.name,
                self.data_type,
                value.type_name()
            )));
        }

        Ok(())
    }
}

/// Table layout: columns plus the name of the primary column.
///
/// The primary column is always an auto-assigned integer; it is added to
/// the column list when the caller does not declare it.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    primary_column: String,
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self::with_primary(name, "id", columns)
    }

    pub fn with_primary(
        name: impl Into<String>,
        primary_column: impl Into<String>,
        mut columns: Vec<Column>,
    ) -> Self {
        let primary_column = primary_column.into();
        if !columns.iter().any(|col| col.name == primary_column) {
            columns.insert(0, Column::new(primary_column.clone(), DataType::Integer));
        }

        Self {
            name: name.into(),
            primary_column,
            columns,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_column(&self) -> &str {
        &self.primary_column
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|col| col.name == name)
    }

    /// Checks a full row: every value must belong to a known column and
    /// every non-nullable column must be present.
    pub fn validate_row(&self, row: &Fields) -> Result<()> {
        self.validate_values(row)?;

        for column in &self.columns {
            if !column.nullable && !row.contains_key(&column.name) {
                return Err(DbError::ConstraintViolation(format!(
                    "Column '{}' cannot be NULL",
                    column.name
                )));
            }
        }

        Ok(())
    }

    /// Checks a partial set of values (update payloads, where clauses).
    pub fn validate_values(&self, values: &Fields) -> Result<()> {
        for (name, value) in values {
            let column = self
                .get_column(name)
                .ok_or_else(|| DbError::ColumnNotFound(name.clone(), self.name.clone()))?;
            column.validate(value)?;
        }
        Ok(())
    }
}
