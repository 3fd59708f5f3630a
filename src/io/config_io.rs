use std::fs;
use std::path::{Path, PathBuf};

use crate::io::board_io::{CONFIG_FILE, atomic_write};
use crate::model::config::BoardConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse board.toml: {0}")]
    Parse(#[from] toml_edit::TomlError),
    #[error("invalid config: {0}")]
    Invalid(#[from] toml::de::Error),
    #[error("config key must look like section.field, got {0:?}")]
    BadKey(String),
}

/// Read board.toml, returning both the parsed config and the raw
/// toml_edit document for round-trip-safe editing. A missing file reads as
/// an empty document.
pub fn read_config(board_dir: &Path) -> Result<(BoardConfig, toml_edit::DocumentMut), ConfigError> {
    let path = board_dir.join(CONFIG_FILE);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(ConfigError::ReadError { path, source: e }),
    };
    let config: BoardConfig = toml::from_str(&text)?;
    let doc: toml_edit::DocumentMut = text.parse()?;
    Ok((config, doc))
}

/// Write the config document back to disk, preserving formatting.
pub fn write_config(board_dir: &Path, doc: &toml_edit::DocumentMut) -> Result<(), ConfigError> {
    let path = board_dir.join(CONFIG_FILE);
    atomic_write(&path, doc.to_string().as_bytes())
        .map_err(|e| ConfigError::ReadError { path, source: e })
}

/// Set `section.field` to a raw value. Integers, floats and booleans are
/// stored as such; anything else is stored as a string. The edited document
/// must still parse as a valid config.
pub fn set_config_value(
    doc: &mut toml_edit::DocumentMut,
    key: &str,
    raw: &str,
) -> Result<BoardConfig, ConfigError> {
    let Some((section, field)) = key.split_once('.') else {
        return Err(ConfigError::BadKey(key.to_string()));
    };
    if section.is_empty() || field.is_empty() || field.contains('.') {
        return Err(ConfigError::BadKey(key.to_string()));
    }

    let value = if let Ok(i) = raw.parse::<i64>() {
        toml_edit::value(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        toml_edit::value(f)
    } else if let Ok(b) = raw.parse::<bool>() {
        toml_edit::value(b)
    } else {
        toml_edit::value(raw)
    };

    if !doc.contains_key(section) {
        doc[section] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    doc[section][field] = value;

    let config: BoardConfig = toml::from_str(&doc.to_string())?;
    Ok(config)
}

/// Look up `section.field` in the parsed config, rendered as TOML
pub fn get_config_value(config: &BoardConfig, key: &str) -> Result<Option<String>, ConfigError> {
    let Some((section, field)) = key.split_once('.') else {
        return Err(ConfigError::BadKey(key.to_string()));
    };
    let value = toml::Value::try_from(config).ok();
    Ok(value
        .as_ref()
        .and_then(|v| v.get(section))
        .and_then(|s| s.get(field))
        .map(|v| v.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::TeardownPolicy;
    use tempfile::TempDir;

    fn sample_config() -> &'static str {
        r#"# board settings
[limits]
max_tasks_per_space = 50  # hard cap

[edit]
debounce_ms = 750
"#
    }

    #[test]
    fn test_round_trip_config() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        fs::write(&path, sample_config()).unwrap();

        let (_config, doc) = read_config(tmp.path()).unwrap();
        write_config(tmp.path(), &doc).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, sample_config());
    }

    #[test]
    fn test_set_value_keeps_comments() {
        let mut doc: toml_edit::DocumentMut = sample_config().parse().unwrap();
        let config = set_config_value(&mut doc, "edit.debounce_ms", "300").unwrap();
        assert_eq!(config.edit.debounce_ms, 300);
        let text = doc.to_string();
        assert!(text.contains("# hard cap"));
        assert!(text.contains("debounce_ms = 300"));
    }

    #[test]
    fn test_set_value_creates_section() {
        let mut doc: toml_edit::DocumentMut = sample_config().parse().unwrap();
        let config = set_config_value(&mut doc, "edit.on_teardown", "drop").unwrap();
        assert_eq!(config.edit.on_teardown, TeardownPolicy::Drop);
        let config = set_config_value(&mut doc, "archive.retention_days", "7").unwrap();
        assert_eq!(config.archive.retention_days, 7);
    }

    #[test]
    fn test_set_value_rejects_bad_input() {
        let mut doc: toml_edit::DocumentMut = sample_config().parse().unwrap();
        assert!(matches!(
            set_config_value(&mut doc, "debounce_ms", "1"),
            Err(ConfigError::BadKey(_))
        ));
        assert!(matches!(
            set_config_value(&mut doc, "edit.debounce_ms", "soon"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_get_value() {
        let config = BoardConfig::default();
        assert_eq!(
            get_config_value(&config, "limits.max_tasks_per_space").unwrap(),
            Some("50".to_string())
        );
        assert_eq!(get_config_value(&config, "limits.nope").unwrap(), None);
    }
}
