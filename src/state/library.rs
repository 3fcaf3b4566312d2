use super::data::{DerivativeSet, FolderId, ImageRecord, NewImage};
use chrono::Utc;
use rusqlite::{params, types::Type, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::{Path, PathBuf};

const IMAGE_COLUMNS: &str = "id, fk_folder, name, type, size, width, height, ratio, \
                             path_thumb, path_low, path_preview, imported_at";

/// The Library manages the SQLite image catalog.
/// It stores one row per ingested upload: folder, original name and type,
/// geometry and the three derivative paths. It never touches image files.
pub struct Library {
    conn: Connection,
    db_path: Option<PathBuf>,
}

impl Library {
    /// Open (or create) the catalog at `db_path`.
    /// The parent directory must already exist.
    pub fn open(db_path: &Path) -> SqlResult<Self> {
        let conn = Connection::open(db_path)?;
        tracing::info!(path = %db_path.display(), "catalog opened");

        let library = Library {
            conn,
            db_path: Some(db_path.to_path_buf()),
        };
        library.init_schema()?;
        Ok(library)
    }

    /// Catalog that lives only as long as the value
    pub fn open_in_memory() -> SqlResult<Self> {
        let library = Library {
            conn: Connection::open_in_memory()?,
            db_path: None,
        };
        library.init_schema()?;
        Ok(library)
    }

    /// Create tables and indexes if they don't exist.
    fn init_schema(&self) -> SqlResult<()> {
        // width/height/ratio stay NULL for files stored without decoding
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS images (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                fk_folder       INTEGER NOT NULL,
                name            TEXT NOT NULL,
                type            TEXT NOT NULL,
                size            INTEGER NOT NULL,
                width           INTEGER,
                height          INTEGER,
                ratio           REAL,
                path_thumb      TEXT NOT NULL,
                path_low        TEXT NOT NULL,
                path_preview    TEXT NOT NULL,
                imported_at     INTEGER NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_images_folder
             ON images(fk_folder)",
            [],
        )?;

        tracing::debug!("catalog schema initialized");
        Ok(())
    }

    /// Path of the database file (`None` when in memory)
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn image_count(&self) -> SqlResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))
    }

    /// Insert a freshly ingested image and return it with its new id
    pub fn add_image(&self, image: &NewImage) -> SqlResult<ImageRecord> {
        let imported_at = Utc::now().timestamp();
        let set = &image.derivatives;

        self.conn.execute(
            "INSERT INTO images (fk_folder, name, type, size, width, height, ratio,
                                 path_thumb, path_low, path_preview, imported_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                set.folder_id.get(),
                image.name,
                image.mime_type,
                image.byte_size as i64,
                set.width,
                set.height,
                set.ratio,
                set.path_thumb,
                set.path_low,
                set.path_preview,
                imported_at,
            ],
        )?;

        Ok(ImageRecord {
            id: self.conn.last_insert_rowid(),
            name: image.name.clone(),
            mime_type: image.mime_type.clone(),
            byte_size: image.byte_size,
            imported_at,
            derivatives: set.clone(),
        })
    }

    /// All images of one folder, oldest first
    pub fn get_images(&self, folder: FolderId) -> SqlResult<Vec<ImageRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE fk_folder = ?1 ORDER BY id"
        ))?;

        let rows = stmt.query_map([folder.get()], image_from_row)?;
        rows.collect()
    }

    pub fn get_image_by_id(&self, id: i64) -> SqlResult<Option<ImageRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = ?1"),
                [id],
                image_from_row,
            )
            .optional()
    }

    /// Remove a row; false when there was no such id
    pub fn delete_image(&self, id: i64) -> SqlResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM images WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }
}

fn image_from_row(row: &Row<'_>) -> SqlResult<ImageRecord> {
    let folder: i64 = row.get(1)?;
    let folder_id = FolderId::new(folder)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Integer, Box::new(e)))?;
    let size: i64 = row.get(4)?;

    Ok(ImageRecord {
        id: row.get(0)?,
        name: row.get(2)?,
        mime_type: row.get(3)?,
        byte_size: size.max(0) as u64,
        imported_at: row.get(11)?,
        derivatives: DerivativeSet {
            folder_id,
            width: row.get(5)?,
            height: row.get(6)?,
            ratio: row.get(7)?,
            path_thumb: row.get(8)?,
            path_low: row.get(9)?,
            path_preview: row.get(10)?,
        },
    })
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}
