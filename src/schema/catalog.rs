//! Catalog queries issued by a metadata load

use crate::db::quote_identifier;

/// One fetch-and-populate step of a metadata load, in load order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Columns,
    StoredProcedures,
    Functions,
    Constraints,
    DefaultValues,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Columns,
        Stage::StoredProcedures,
        Stage::Functions,
        Stage::Constraints,
        Stage::DefaultValues,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Columns => "columns",
            Stage::StoredProcedures => "stored procedures",
            Stage::Functions => "functions",
            Stage::Constraints => "constraints",
            Stage::DefaultValues => "default values",
        }
    }

    /// The statement run against `database`
    pub fn query(self, database: &str) -> String {
        format!("USE {};\n{}", quote_identifier(database), self.body())
    }

    fn body(self) -> &'static str {
        match self {
            Stage::Columns => COLUMNS,
            Stage::StoredProcedures => STORED_PROCEDURES,
            Stage::Functions => FUNCTIONS,
            Stage::Constraints => CONSTRAINTS,
            Stage::DefaultValues => DEFAULT_VALUES,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// types without an SqlDbType variant are left out
const COLUMNS: &str = r#"
SELECT
    o.name AS [TableName],
    c.name AS [ColumnName],
    t.name AS [DataType],
    CAST(c.max_length AS INT) AS [Length],
    CAST(c.precision AS INT) AS [Precision],
    CAST(c.scale AS INT) AS [Scale],
    c.is_nullable AS [IsNullable],
    CAST(ISNULL(pk.IsPK, 0) AS BIT) AS [IsPK],
    c.is_identity AS [IsIdentity],
    c.column_id AS [ColumnOrdinal]
FROM sys.objects o
INNER JOIN sys.columns c ON o.object_id = c.object_id
INNER JOIN sys.types t ON c.user_type_id = t.user_type_id
LEFT JOIN (
    SELECT DISTINCT tc.TABLE_NAME AS [TableName], ku.COLUMN_NAME AS [ColumnName], 1 AS [IsPK]
    FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE ku
    INNER JOIN INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc ON ku.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
    WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
) pk ON pk.[TableName] = o.name AND pk.[ColumnName] = c.name
WHERE o.type = 'U'
  AND t.name NOT IN ('sysname', 'hierarchyid', 'geometry', 'geography')
  AND t.is_user_defined = 0
ORDER BY o.name, c.column_id"#;

const STORED_PROCEDURES: &str = r#"
SELECT o.name AS [Name], sc.text AS [Body]
FROM sys.objects o
INNER JOIN syscomments sc ON o.object_id = sc.id
WHERE o.type = 'P'
  AND o.is_ms_shipped = 0
ORDER BY o.name, sc.colid"#;

const FUNCTIONS: &str = r#"
SELECT o.name AS [Name], sc.text AS [Body]
FROM sys.objects o
INNER JOIN syscomments sc ON o.object_id = sc.id
WHERE o.type IN ('FN', 'IF', 'TF')
  AND o.is_ms_shipped = 0
ORDER BY o.name, sc.colid"#;

const CONSTRAINTS: &str = r#"
SELECT
    rc.CONSTRAINT_NAME AS [ConstraintName],
    fk.TABLE_NAME AS [FKTable],
    cu.COLUMN_NAME AS [FKColumn],
    pk.TABLE_NAME AS [PKTable],
    pt.COLUMN_NAME AS [PKColumn]
FROM INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS rc
INNER JOIN INFORMATION_SCHEMA.TABLE_CONSTRAINTS fk ON rc.CONSTRAINT_NAME = fk.CONSTRAINT_NAME
INNER JOIN INFORMATION_SCHEMA.TABLE_CONSTRAINTS pk ON rc.UNIQUE_CONSTRAINT_NAME = pk.CONSTRAINT_NAME
INNER JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE cu ON rc.CONSTRAINT_NAME = cu.CONSTRAINT_NAME
INNER JOIN (
    SELECT i1.TABLE_NAME, i2.COLUMN_NAME
    FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS i1
    INNER JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE i2 ON i1.CONSTRAINT_NAME = i2.CONSTRAINT_NAME
    WHERE i1.CONSTRAINT_TYPE = 'PRIMARY KEY'
) pt ON pt.TABLE_NAME = pk.TABLE_NAME
ORDER BY rc.CONSTRAINT_NAME"#;

const DEFAULT_VALUES: &str = r#"
SELECT
    o.name AS [TableName],
    c.name AS [ColumnName],
    dc.definition AS [DefaultValue]
FROM sys.default_constraints dc
INNER JOIN sys.objects o ON dc.parent_object_id = o.object_id
INNER JOIN sys.columns c ON c.object_id = dc.parent_object_id AND c.column_id = dc.parent_column_id
WHERE o.is_ms_shipped = 0
ORDER BY o.name, c.column_id"#;
