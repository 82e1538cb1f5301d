//! SQLite-backed file catalog implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::{
    path_to_db, CatalogError, ConversionEvent, ConvertAction, ConvertedFile, Destination,
    EncodingHint, EventFilter, EventRecord, FileCatalog, OnConflict, ProcessingStatus,
    SourceFile, SourceKind, SourceQuery,
};

const ORIGINAL_COLUMNS: &str = "uuid, relative_path, checksum, size, encoding, puid, action, \
     action_data, processed, parent, NULL, NULL, NULL, 0";

const MASTER_COLUMNS: &str = "uuid, relative_path, checksum, size, encoding, puid, NULL, NULL, \
     processed, NULL, convert_access, convert_statutory, original_uuid, sequence";

/// SQLite-backed file catalog.
pub struct SqliteFileCatalog {
    conn: Mutex<Connection>,
}

impl SqliteFileCatalog {
    /// Open a catalog database, creating the file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, CatalogError> {
        let conn = Connection::open(path).map_err(|e| CatalogError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory catalog (useful for testing).
    pub fn in_memory() -> Result<Self, CatalogError> {
        let conn =
            Connection::open_in_memory().map_err(|e| CatalogError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CatalogError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS original_files (
                uuid TEXT PRIMARY KEY,
                relative_path TEXT NOT NULL UNIQUE,
                checksum TEXT NOT NULL,
                size INTEGER NOT NULL,
                encoding TEXT,
                puid TEXT,
                action TEXT,
                action_data TEXT NOT NULL DEFAULT '{}',
                processed INTEGER NOT NULL DEFAULT 0,
                parent TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_original_files_path ON original_files(lower(relative_path));
            CREATE INDEX IF NOT EXISTS idx_original_files_checksum ON original_files(checksum);
            CREATE INDEX IF NOT EXISTS idx_original_files_parent ON original_files(parent);

            CREATE TABLE IF NOT EXISTS master_files (
                uuid TEXT PRIMARY KEY,
                original_uuid TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                relative_path TEXT NOT NULL,
                checksum TEXT NOT NULL,
                size INTEGER NOT NULL,
                encoding TEXT,
                puid TEXT,
                convert_access TEXT,
                convert_statutory TEXT,
                processed INTEGER NOT NULL DEFAULT 0,
                UNIQUE(original_uuid, sequence)
            );

            CREATE INDEX IF NOT EXISTS idx_master_files_path ON master_files(lower(relative_path));

            CREATE TABLE IF NOT EXISTS access_files (
                uuid TEXT PRIMARY KEY,
                original_uuid TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                relative_path TEXT NOT NULL,
                checksum TEXT NOT NULL,
                size INTEGER NOT NULL,
                puid TEXT,
                UNIQUE(original_uuid, sequence)
            );

            CREATE TABLE IF NOT EXISTS statutory_files (
                uuid TEXT PRIMARY KEY,
                original_uuid TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                relative_path TEXT NOT NULL,
                checksum TEXT NOT NULL,
                size INTEGER NOT NULL,
                puid TEXT,
                UNIQUE(original_uuid, sequence)
            );

            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                uuid TEXT,
                operation TEXT NOT NULL,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_uuid ON events(uuid);
            CREATE INDEX IF NOT EXISTS idx_events_operation ON events(operation);
            "#,
        )
        .map_err(|e| CatalogError::Database(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CatalogError> {
        self.conn
            .lock()
            .map_err(|_| CatalogError::Internal("catalog connection lock poisoned".to_string()))
    }

    fn columns(kind: SourceKind) -> &'static str {
        match kind {
            SourceKind::Original => ORIGINAL_COLUMNS,
            SourceKind::Master => MASTER_COLUMNS,
        }
    }

    fn pending_filter(query: &SourceQuery) -> Result<&'static str, CatalogError> {
        match (query.kind, query.destination) {
            (SourceKind::Original, Destination::Master) => Ok("action IN ('convert', 'ignore')"),
            (SourceKind::Master, Destination::Access) => Ok("convert_access IS NOT NULL"),
            (SourceKind::Master, Destination::Statutory) => Ok("convert_statutory IS NOT NULL"),
            (kind, destination) => Err(CatalogError::Internal(format!(
                "{} files cannot be converted to {} files",
                kind.as_str(),
                destination.as_str()
            ))),
        }
    }

    /// Convert a row selected with [`Self::columns`] to a SourceFile.
    fn row_to_source(kind: SourceKind, row: &rusqlite::Row) -> rusqlite::Result<SourceFile> {
        let relative_path: String = row.get(1)?;
        let size: i64 = row.get(3)?;
        let encoding: Option<String> = row.get(4)?;
        let action_data: Option<String> = row.get(7)?;
        let processed: i64 = row.get(8)?;
        let sequence: i64 = row.get(13)?;

        Ok(SourceFile {
            uuid: parse_uuid(row, 0)?,
            kind,
            relative_path: PathBuf::from(relative_path),
            root: None,
            checksum: row.get(2)?,
            size: size.max(0) as u64,
            encoding: encoding.map(|encoding| EncodingHint { encoding }),
            puid: row.get(5)?,
            action: row.get(6)?,
            action_data: parse_json_column(7, action_data)?.unwrap_or_default(),
            convert_access: parse_json_column::<ConvertAction>(10, row.get(10)?)?,
            convert_statutory: parse_json_column::<ConvertAction>(11, row.get(11)?)?,
            processed: ProcessingStatus::from_bits(processed as u8),
            parent: parse_optional_uuid(row, 9)?,
            original_uuid: parse_optional_uuid(row, 12)?,
            sequence: sequence.max(0) as u32,
        })
    }

    fn row_to_converted(row: &rusqlite::Row) -> rusqlite::Result<ConvertedFile> {
        let sequence: i64 = row.get(2)?;
        let relative_path: String = row.get(3)?;
        let size: i64 = row.get(5)?;

        Ok(ConvertedFile {
            uuid: parse_uuid(row, 0)?,
            original_uuid: parse_uuid(row, 1)?,
            sequence: sequence.max(0) as u32,
            relative_path: PathBuf::from(relative_path),
            checksum: row.get(4)?,
            size: size.max(0) as u64,
            puid: row.get(6)?,
        })
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<EventRecord> {
        let timestamp_str: String = row.get(1)?;
        let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let data: String = row.get(4)?;

        Ok(EventRecord {
            id: row.get(0)?,
            timestamp,
            uuid: parse_optional_uuid(row, 2)?,
            operation: row.get(3)?,
            data: parse_json_column::<ConversionEvent>(4, Some(data))?.ok_or(
                rusqlite::Error::InvalidColumnType(4, "data".to_string(), Type::Null),
            )?,
        })
    }
}

impl FileCatalog for SqliteFileCatalog {
    fn insert_source(
        &self,
        file: &SourceFile,
        on_conflict: OnConflict,
    ) -> Result<(), CatalogError> {
        let conn = self.conn()?;
        let verb = match on_conflict {
            OnConflict::Replace => "INSERT OR REPLACE",
            OnConflict::Fail => "INSERT",
        };
        let encoding = file.encoding.as_ref().map(|e| e.encoding.clone());

        let result = match file.kind {
            SourceKind::Original => conn.execute(
                &format!(
                    "{verb} INTO original_files (uuid, relative_path, checksum, size, encoding, puid, action, action_data, processed, parent)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                ),
                params![
                    file.uuid.to_string(),
                    path_to_db(&file.relative_path),
                    &file.checksum,
                    file.size as i64,
                    encoding,
                    &file.puid,
                    &file.action,
                    to_json(&file.action_data)?,
                    file.processed.bits() as i64,
                    file.parent.map(|p| p.to_string()),
                ],
            ),
            SourceKind::Master => {
                let original_uuid = file.original_uuid.ok_or_else(|| {
                    CatalogError::Internal(format!("master file {} has no original", file.uuid))
                })?;
                conn.execute(
                    &format!(
                        "{verb} INTO master_files (uuid, original_uuid, sequence, relative_path, checksum, size, encoding, puid, convert_access, convert_statutory, processed)
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                    ),
                    params![
                        file.uuid.to_string(),
                        original_uuid.to_string(),
                        file.sequence as i64,
                        path_to_db(&file.relative_path),
                        &file.checksum,
                        file.size as i64,
                        encoding,
                        &file.puid,
                        file.convert_access.as_ref().map(to_json).transpose()?,
                        file.convert_statutory.as_ref().map(to_json).transpose()?,
                        file.processed.bits() as i64,
                    ],
                )
            }
        };

        result
            .map(|_| ())
            .map_err(|e| map_insert_error(e, &file.uuid.to_string()))
    }

    fn select_sources(&self, query: &SourceQuery) -> Result<Vec<SourceFile>, CatalogError> {
        let conn = self.conn()?;
        let pending = Self::pending_filter(query)?;
        let (restriction, filter_values) = match &query.filter {
            Some(filter) => {
                let (sql, values) = filter.to_sql(query.kind, 5)?;
                (format!(" AND ({sql})"), values)
            }
            None => (String::new(), Vec::new()),
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE {}{} AND (processed & ?1) = 0
               AND (?2 IS NULL OR lower(relative_path) > ?2 OR (lower(relative_path) = ?2 AND uuid > ?3))
             ORDER BY lower(relative_path), uuid
             LIMIT ?4",
            Self::columns(query.kind),
            query.kind.table(),
            pending,
            restriction
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let (path_key, uuid) = match &query.after {
            Some(cursor) => (
                Value::Text(cursor.path_key.clone()),
                Value::Text(cursor.uuid.to_string()),
            ),
            None => (Value::Null, Value::Null),
        };
        let mut values = vec![
            Value::Integer(query.destination.status_bit() as i64),
            path_key,
            uuid,
            Value::Integer(query.limit as i64),
        ];
        values.extend(filter_values.into_iter().map(Value::Text));

        let kind = query.kind;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Self::row_to_source(kind, row)
            })
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row.map_err(|e| CatalogError::Database(e.to_string()))?);
        }
        Ok(files)
    }

    fn get_source(&self, kind: SourceKind, uuid: Uuid) -> Result<SourceFile, CatalogError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM {} WHERE uuid = ?",
                Self::columns(kind),
                kind.table()
            ),
            params![uuid.to_string()],
            |row| Self::row_to_source(kind, row),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => CatalogError::NotFound(uuid.to_string()),
            _ => CatalogError::Database(e.to_string()),
        })
    }

    fn update_source(&self, file: &SourceFile) -> Result<(), CatalogError> {
        let conn = self.conn()?;
        let updated = match file.kind {
            SourceKind::Original => conn.execute(
                "UPDATE original_files SET action = ?, action_data = ?, processed = ? WHERE uuid = ?",
                params![
                    &file.action,
                    to_json(&file.action_data)?,
                    file.processed.bits() as i64,
                    file.uuid.to_string(),
                ],
            ),
            SourceKind::Master => conn.execute(
                "UPDATE master_files SET convert_access = ?, convert_statutory = ?, processed = ? WHERE uuid = ?",
                params![
                    file.convert_access.as_ref().map(to_json).transpose()?,
                    file.convert_statutory.as_ref().map(to_json).transpose()?,
                    file.processed.bits() as i64,
                    file.uuid.to_string(),
                ],
            ),
        }
        .map_err(|e| CatalogError::Database(e.to_string()))?;

        if updated == 0 {
            return Err(CatalogError::NotFound(file.uuid.to_string()));
        }
        Ok(())
    }

    fn insert_converted(
        &self,
        destination: Destination,
        file: &ConvertedFile,
        on_conflict: OnConflict,
    ) -> Result<(), CatalogError> {
        let conn = self.conn()?;
        let table = destination.table();

        // A replaced master is a new file, so its own derivatives are stale.
        let reset = if destination == Destination::Master {
            ", processed = 0"
        } else {
            ""
        };
        let conflict_clause = match on_conflict {
            OnConflict::Replace => format!(
                "ON CONFLICT(original_uuid, sequence) DO UPDATE SET
                    uuid = excluded.uuid,
                    relative_path = excluded.relative_path,
                    checksum = excluded.checksum,
                    size = excluded.size,
                    puid = excluded.puid{reset}"
            ),
            OnConflict::Fail => String::new(),
        };

        conn.execute(
            &format!(
                "INSERT INTO {table} (uuid, original_uuid, sequence, relative_path, checksum, size, puid)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 {conflict_clause}"
            ),
            params![
                file.uuid.to_string(),
                file.original_uuid.to_string(),
                file.sequence as i64,
                path_to_db(&file.relative_path),
                &file.checksum,
                file.size as i64,
                &file.puid,
            ],
        )
        .map(|_| ())
        .map_err(|e| {
            map_insert_error(
                e,
                &format!("{}#{} in {}", file.original_uuid, file.sequence, table),
            )
        })
    }

    fn converted_files(
        &self,
        destination: Destination,
        original_uuid: Uuid,
    ) -> Result<Vec<ConvertedFile>, CatalogError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT uuid, original_uuid, sequence, relative_path, checksum, size, puid
                 FROM {} WHERE original_uuid = ? ORDER BY sequence",
                destination.table()
            ))
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![original_uuid.to_string()], Self::row_to_converted)
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row.map_err(|e| CatalogError::Database(e.to_string()))?);
        }
        Ok(files)
    }

    fn find_duplicate(&self, checksum: &str) -> Result<Option<SourceFile>, CatalogError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {ORIGINAL_COLUMNS} FROM original_files
                 WHERE checksum = ? AND (action IS NULL OR action != 'ignore')
                 ORDER BY lower(relative_path), uuid
                 LIMIT 1"
            ),
            params![checksum],
            |row| Self::row_to_source(SourceKind::Original, row),
        )
        .optional()
        .map_err(|e| CatalogError::Database(e.to_string()))
    }

    fn children(&self, parent: Uuid) -> Result<Vec<PathBuf>, CatalogError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT relative_path FROM original_files WHERE parent = ?
                 ORDER BY lower(relative_path), uuid",
            )
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![parent.to_string()], |row| row.get::<_, String>(0))
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let mut paths = Vec::new();
        for row in rows {
            paths.push(PathBuf::from(
                row.map_err(|e| CatalogError::Database(e.to_string()))?,
            ));
        }
        Ok(paths)
    }

    fn insert_event(&self, event: &EventRecord) -> Result<i64, CatalogError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO events (timestamp, uuid, operation, data) VALUES (?, ?, ?, ?)",
            params![
                event.timestamp.to_rfc3339(),
                event.uuid.map(|u| u.to_string()),
                &event.operation,
                to_json(&event.data)?,
            ],
        )
        .map_err(|e| CatalogError::Database(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    fn events(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, CatalogError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, timestamp, uuid, operation, data FROM events
                 WHERE (?1 IS NULL OR uuid = ?1)
                   AND (?2 IS NULL OR operation LIKE '%:' || ?2)
                 ORDER BY id DESC
                 LIMIT ?3",
            )
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(
                params![
                    filter.uuid.map(|u| u.to_string()),
                    &filter.event_type,
                    filter.limit
                ],
                Self::row_to_event,
            )
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row.map_err(|e| CatalogError::Database(e.to_string()))?);
        }
        Ok(events)
    }

    fn begin(&self) -> Result<(), CatalogError> {
        let conn = self.conn()?;
        if conn.is_autocommit() {
            conn.execute_batch("BEGIN")
                .map_err(|e| CatalogError::Database(e.to_string()))?;
        }
        Ok(())
    }

    fn commit(&self) -> Result<(), CatalogError> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")
                .map_err(|e| CatalogError::Database(e.to_string()))?;
        }
        Ok(())
    }

    fn rollback(&self) -> Result<(), CatalogError> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")
                .map_err(|e| CatalogError::Database(e.to_string()))?;
        }
        Ok(())
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, CatalogError> {
    serde_json::to_string(value).map_err(|e| CatalogError::Serialization(e.to_string()))
}

fn parse_json_column<T: DeserializeOwned>(
    idx: usize,
    value: Option<String>,
) -> rusqlite::Result<Option<T>> {
    value
        .map(|text| {
            serde_json::from_str(&text)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
        })
        .transpose()
}

fn parse_uuid(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_optional_uuid(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        Uuid::parse_str(&t)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn map_insert_error(error: rusqlite::Error, key: &str) -> CatalogError {
    match &error {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            CatalogError::AlreadyExists(key.to_string())
        }
        _ => CatalogError::Database(error.to_string()),
    }
}
