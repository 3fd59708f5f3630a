use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::model::config::BoardConfig;
use crate::persist::server::BoardDocument;

/// Directory holding a board's files
pub const BOARD_DIR: &str = ".taskspace";
pub const CONFIG_FILE: &str = "board.toml";
pub const DATA_FILE: &str = "board.json";

/// Error type for board I/O operations
#[derive(Debug, thiserror::Error)]
pub enum BoardIoError {
    #[error("not a taskspace board: no .taskspace/ directory found")]
    NotABoard,
    #[error("a board already exists at {0}")]
    AlreadyInitialized(PathBuf),
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse board.toml: {0}")]
    ConfigParseError(#[from] toml::de::Error),
    #[error("could not parse {path}: {source}")]
    DataParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Find the board by walking up from the given directory, looking for a
/// `.taskspace/` subdirectory. Returns the board directory itself.
pub fn discover_board(start: &Path) -> Result<PathBuf, BoardIoError> {
    let mut current = start.to_path_buf();
    loop {
        let board_dir = current.join(BOARD_DIR);
        if board_dir.is_dir() {
            return Ok(board_dir);
        }
        if !current.pop() {
            return Err(BoardIoError::NotABoard);
        }
    }
}

/// Create an empty board under `root`. Returns the board directory.
pub fn init_board(root: &Path) -> Result<PathBuf, BoardIoError> {
    let board_dir = root.join(BOARD_DIR);
    if board_dir.join(DATA_FILE).exists() {
        return Err(BoardIoError::AlreadyInitialized(board_dir));
    }
    fs::create_dir_all(&board_dir)?;

    let config = "\
# taskspace board configuration

[limits]
max_tasks_per_space = 50

[edit]
debounce_ms = 750
on_teardown = \"flush\"

[archive]
retention_days = 30
";
    atomic_write(&board_dir.join(CONFIG_FILE), config.as_bytes())?;
    save_document(&board_dir, &BoardDocument::default())?;
    Ok(board_dir)
}

/// Load board.toml. A missing file yields the defaults.
pub fn load_config(board_dir: &Path) -> Result<BoardConfig, BoardIoError> {
    let path = board_dir.join(CONFIG_FILE);
    match fs::read_to_string(&path) {
        Ok(text) => Ok(toml::from_str(&text)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BoardConfig::default()),
        Err(e) => Err(BoardIoError::ReadError { path, source: e }),
    }
}

/// Load the board data. A missing file is an empty board.
pub fn load_document(board_dir: &Path) -> Result<BoardDocument, BoardIoError> {
    let path = board_dir.join(DATA_FILE);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BoardDocument::default()),
        Err(e) => return Err(BoardIoError::ReadError { path, source: e }),
    };
    serde_json::from_str(&text).map_err(|e| BoardIoError::DataParseError { path, source: e })
}

/// Save the board data atomically
pub fn save_document(board_dir: &Path, doc: &BoardDocument) -> Result<(), BoardIoError> {
    let path = board_dir.join(DATA_FILE);
    let mut content = serde_json::to_string_pretty(doc)
        .map_err(|e| BoardIoError::DataParseError {
            path: path.clone(),
            source: e,
        })?;
    content.push('\n');
    atomic_write(&path, content.as_bytes()).map_err(|e| BoardIoError::ReadError { path, source: e })
}

/// Write via a temp file in the same directory, then rename over the target
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Space, SpaceId};
    use tempfile::TempDir;

    #[test]
    fn test_init_and_discover() {
        let tmp = TempDir::new().unwrap();
        let board_dir = init_board(tmp.path()).unwrap();
        assert!(board_dir.join(CONFIG_FILE).exists());
        assert!(board_dir.join(DATA_FILE).exists());

        let nested = tmp.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        assert_eq!(discover_board(&nested).unwrap(), board_dir);

        assert!(matches!(
            init_board(tmp.path()),
            Err(BoardIoError::AlreadyInitialized(_))
        ));
    }

    #[test]
    fn test_discover_not_found() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            discover_board(tmp.path()),
            Err(BoardIoError::NotABoard)
        ));
    }

    #[test]
    fn test_init_config_parses_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let board_dir = init_board(tmp.path()).unwrap();
        assert_eq!(load_config(&board_dir).unwrap(), BoardConfig::default());
    }

    #[test]
    fn test_document_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let mut doc = BoardDocument::default();
        doc.next_id = 4;
        doc.spaces.push(Space::new(SpaceId::from("srv-1"), "Work"));
        save_document(tmp.path(), &doc).unwrap();
        assert_eq!(load_document(tmp.path()).unwrap(), doc);
    }

    #[test]
    fn test_missing_files_are_defaults() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(load_document(tmp.path()).unwrap(), BoardDocument::default());
        assert_eq!(load_config(tmp.path()).unwrap(), BoardConfig::default());
    }

    #[test]
    fn test_corrupt_data_is_reported() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(DATA_FILE), "{ not json").unwrap();
        assert!(matches!(
            load_document(tmp.path()),
            Err(BoardIoError::DataParseError { .. })
        ));
    }
}
