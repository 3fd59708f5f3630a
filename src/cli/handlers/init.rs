use std::path::PathBuf;
use std::sync::Arc;

use crate::board::Board;
use crate::cli::commands::InitArgs;
use crate::io::board_io;
use crate::persist::FileBackend;

/// Reject blank and duplicate space names, case-insensitively.
fn validate_space_names(names: &[String]) -> Result<(), String> {
    let mut seen = std::collections::HashSet::new();
    for name in names {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err("space name cannot be empty".to_string());
        }
        if !seen.insert(trimmed.to_lowercase()) {
            return Err(format!("duplicate space name \"{}\"", trimmed));
        }
    }
    Ok(())
}

pub async fn cmd_init(args: InitArgs, board_dir: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let root = match board_dir {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir()?,
    };
    validate_space_names(&args.spaces)?;

    // Check for an enclosing board and note it
    if let Some(parent) = root.parent()
        && let Ok(outer) = board_io::discover_board(parent)
    {
        eprintln!("Note: enclosing board found at {}", outer.display());
        eprintln!("Creating new board in {}", root.join(board_io::BOARD_DIR).display());
    }

    let dir = board_io::init_board(&root)?;
    let config = board_io::load_config(&dir)?;
    let backend = Arc::new(FileBackend::open(&dir, config.limits.max_tasks_per_space));
    let mut board = Board::new(backend, config);
    for name in &args.spaces {
        let id = board.create_space(name, None).await?;
        println!("{}  {}", id, name.trim());
    }

    println!("Initialized board in {}", dir.display());
    Ok(())
}
