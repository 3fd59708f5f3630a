mod init;
pub use init::cmd_init;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use regex::Regex;

use crate::board::{Board, Outcome};
use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::{board_io, config_io};
use crate::model::{
    DueDateRange, OrderContext, Position, Progress, SortKey, Space, SpaceId, SpacePatch, TaskId,
    TaskPatch,
};
use crate::ops::view::ViewOptions;
use crate::ops::{check, search};
use crate::persist::FileBackend;
use crate::pipeline::Confirmation;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// An opened board plus the flags every handler needs
struct Session {
    board: Board,
    json: bool,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub async fn dispatch(cli: Cli) -> CmdResult {
    let json = cli.json;
    let board_dir = cli.board_dir;

    match cli.command {
        // Init runs before board discovery
        Commands::Init(args) => cmd_init(args, board_dir.as_deref()).await,
        Commands::Config(args) => cmd_config(args, board_dir.as_deref(), json),
        cmd => {
            let mut s = open_session(board_dir.as_deref(), json).await?;
            match cmd {
                // Read commands
                Commands::List(args) => cmd_list(&s, args),
                Commands::Show(args) => cmd_show(&s, args),
                Commands::Search(args) => cmd_search(&s, args),
                Commands::Check => cmd_check(&s),

                // Write commands
                Commands::Space(args) => cmd_space(&mut s, args).await,
                Commands::Add(args) => cmd_add(&mut s, args).await,
                Commands::Sub(args) => cmd_sub(&mut s, args).await,
                Commands::Mv(args) => cmd_mv(&mut s, args).await,
                Commands::Attach(args) => cmd_attach(&mut s, args).await,
                Commands::Detach(args) => cmd_detach(&mut s, args).await,
                Commands::Dup(args) => cmd_dup(&mut s, args).await,
                Commands::Archive(args) => {
                    let id = TaskId::from(args.id);
                    let outcome = s.board.archive_task(&id)?;
                    finish(&mut s, "archive", &id, outcome).await
                }
                Commands::Unarchive(args) => {
                    let id = TaskId::from(args.id);
                    let outcome = s.board.unarchive_task(&id)?;
                    finish(&mut s, "unarchive", &id, outcome).await
                }
                Commands::Rm(args) => {
                    let id = TaskId::from(args.id);
                    let outcome = s.board.delete_task_cascading(&id)?;
                    finish(&mut s, "delete", &id, outcome).await
                }
                Commands::Front(args) => {
                    let id = TaskId::from(args.id);
                    let outcome = s.board.bring_to_front(&id)?;
                    finish(&mut s, "front", &id, outcome).await
                }
                Commands::Edit(args) => cmd_edit(&mut s, args).await,
                Commands::Normalize(args) => cmd_normalize(&mut s, args).await,
                Commands::Purge(args) => cmd_purge(&mut s, args).await,

                Commands::Init(_) | Commands::Config(_) => Ok(()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn board_dir_from(override_dir: Option<&str>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let start = match override_dir {
        Some(dir) => std::fs::canonicalize(dir)
            .map_err(|e| format!("cannot resolve -C path '{}': {}", dir, e))?,
        None => std::env::current_dir()?,
    };
    Ok(board_io::discover_board(&start)?)
}

async fn open_session(override_dir: Option<&str>, json: bool) -> Result<Session, Box<dyn std::error::Error>> {
    let dir = board_dir_from(override_dir)?;
    let config = board_io::load_config(&dir)?;
    let backend = Arc::new(FileBackend::open(&dir, config.limits.max_tasks_per_space));
    let mut board = Board::new(backend, config);
    board.load_all().await?;
    Ok(Session { board, json })
}

fn find_space<'a>(board: &'a Board, key: &str) -> Result<&'a Space, String> {
    board
        .find_space(key)
        .ok_or_else(|| format!("space not found: {}", key))
}

fn parse_position(raw: &str) -> Result<Position, Box<dyn std::error::Error>> {
    Ok(raw.parse::<Position>()?)
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{}': expected YYYY-MM-DD", raw))
}

fn parse_progress(raw: &str) -> Result<Progress, String> {
    Progress::parse(raw).ok_or_else(|| {
        format!(
            "invalid progress '{}': expected not_started, in_progress, blocked or complete",
            raw
        )
    })
}

/// Wait for a mutation and report it. An ignored mutation named a task that
/// does not exist.
async fn finish(s: &mut Session, action: &'static str, id: &TaskId, outcome: Outcome) -> CmdResult {
    if outcome.is_ignored() {
        return Err(format!("task not found: {}", id).into());
    }
    let confirmation = s.board.run(outcome).await?;
    report(s, action, Some(id.to_string()), &confirmation);
    Ok(())
}

fn report(s: &Session, action: &'static str, id: Option<String>, confirmation: &Confirmation) {
    let created: Vec<String> = confirmation
        .rekeyed
        .iter()
        .map(|(_, server)| server.to_string())
        .collect();
    if s.json {
        let out = MutationJson {
            action,
            id,
            created,
        };
        if let Ok(text) = serde_json::to_string_pretty(&out) {
            println!("{}", text);
        }
    } else if let Some(first) = created.first() {
        // Creations print the new id, like `tsp add`
        println!("{}", first);
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Read command handlers
// ---------------------------------------------------------------------------

fn cmd_list(s: &Session, args: ListArgs) -> CmdResult {
    let sort = match &args.sort {
        Some(key) => Some(SortKey::parse(key).ok_or_else(|| format!("unknown sort key: {}", key))?),
        None => None,
    };
    let spaces: Vec<Space> = match &args.space {
        Some(key) => vec![find_space(&s.board, key)?.clone()],
        None => s.board.spaces(),
    };

    let mut lists = Vec::new();
    let mut trees = Vec::new();
    for space in &spaces {
        let mut opts = ViewOptions::for_space(space);
        if let Some(key) = sort {
            opts.sort = key;
            opts.reversed = args.reversed;
        } else if args.reversed {
            opts.reversed = !opts.reversed;
        }
        opts.include_archived = args.archived;
        opts.apply_filters = !args.unfiltered;

        if args.tree {
            trees.push(TaskTreeJson {
                space: space.id.clone(),
                tasks: s.board.tree(&space.id, opts),
            });
        } else {
            lists.push(TaskListJson {
                space: space.id.clone(),
                tasks: s.board.root_tasks(&space.id, opts),
            });
        }
    }

    if s.json {
        return if args.tree {
            print_json(&trees)
        } else {
            print_json(&lists)
        };
    }

    let multiple = spaces.len() > 1;
    for (i, space) in spaces.iter().enumerate() {
        if multiple {
            if i > 0 {
                println!();
            }
            println!("== {} ({}) ==", space.name, space.id);
        }
        if args.tree {
            for line in format_tree(&trees[i].tasks) {
                println!("{}", line);
            }
        } else {
            for task in &lists[i].tasks {
                println!("{}", format_task_line(task));
            }
        }
    }
    Ok(())
}

fn cmd_show(s: &Session, args: ShowArgs) -> CmdResult {
    let id = TaskId::from(args.id.as_str());
    let opts = ViewOptions {
        include_archived: true,
        ..Default::default()
    };
    if args.tree {
        let node = s
            .board
            .subtree(&id, opts)
            .ok_or_else(|| format!("task not found: {}", args.id))?;
        if s.json {
            return print_json(&node);
        }
        for line in format_tree(std::slice::from_ref(&node)) {
            println!("{}", line);
        }
        return Ok(());
    }

    let task = s
        .board
        .task(&id)
        .ok_or_else(|| format!("task not found: {}", args.id))?;
    if s.json {
        return print_json(&task);
    }
    for line in format_task_detail(&task) {
        println!("{}", line);
    }
    Ok(())
}

fn cmd_search(s: &Session, args: SearchArgs) -> CmdResult {
    let re = Regex::new(&args.pattern)?;
    let space = match &args.space {
        Some(key) => Some(find_space(&s.board, key)?.id.clone()),
        None => None,
    };
    let hits = search::search_tasks(s.board.store(), &re, space.as_ref(), args.archived);

    // One line per task, even when several fields match
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for hit in &hits {
        if !seen.insert(hit.task_id.clone()) {
            continue;
        }
        if let Some(task) = s.board.task(&TaskId::from(hit.task_id.as_str())) {
            out.push((hit, task));
        }
    }

    if s.json {
        let json: Vec<SearchHitJson> = out
            .iter()
            .map(|(hit, task)| hit_to_json(hit, &task.name))
            .collect();
        return print_json(&json);
    }
    for (hit, task) in &out {
        println!("[{}] {}", hit.space_id, format_task_line(task));
    }
    Ok(())
}

fn cmd_check(s: &Session) -> CmdResult {
    let result = check::check_store(s.board.store(), s.board.config());

    if s.json {
        return print_json(&result);
    }
    if !result.errors.is_empty() {
        println!("Errors:");
        for err in &result.errors {
            match err {
                check::CheckError::BrokenChain {
                    task_id,
                    expected,
                    actual,
                } => println!(
                    "  {} has ancestors [{}], expected [{}]",
                    task_id,
                    actual.join(", "),
                    expected.join(", ")
                ),
                check::CheckError::TooDeep { task_id, depth } => {
                    println!("  {} is nested {} levels deep", task_id, depth + 1)
                }
                check::CheckError::SubtaskMismatch {
                    parent_id,
                    missing,
                    extra,
                } => println!(
                    "  {} subtasks: missing [{}], extra [{}]",
                    parent_id,
                    missing.join(", "),
                    extra.join(", ")
                ),
                check::CheckError::OrderMismatch {
                    space_id,
                    missing,
                    extra,
                } => println!(
                    "  space {} order: missing [{}], extra [{}]",
                    space_id,
                    missing.join(", "),
                    extra.join(", ")
                ),
                check::CheckError::DuplicateEntry { context, task_id } => {
                    println!("  {} is listed twice in {}", task_id, context)
                }
                check::CheckError::ZIndexAboveMax {
                    space_id,
                    task_id,
                    z_index,
                    max_z_index,
                } => println!(
                    "  {} has z-index {} above space {} max {}",
                    task_id, z_index, space_id, max_z_index
                ),
                check::CheckError::MissingSpace { task_id, space_id } => {
                    println!("  {} belongs to missing space {}", task_id, space_id)
                }
                check::CheckError::StaleTempId {
                    task_id,
                    referenced_by,
                } => println!("  {} still references temporary id {}", referenced_by, task_id),
            }
        }
    }
    if !result.warnings.is_empty() {
        if !result.errors.is_empty() {
            println!();
        }
        println!("Warnings:");
        for warn in &result.warnings {
            match warn {
                check::CheckWarning::NeedsNormalize {
                    space_id,
                    max_z_index,
                } => println!(
                    "  space {} stacking has grown to {} (run `tsp normalize {}`)",
                    space_id, max_z_index, space_id
                ),
                check::CheckWarning::OverCapacity {
                    space_id,
                    count,
                    limit,
                } => println!("  space {} holds {} active tasks (limit {})", space_id, count, limit),
                check::CheckWarning::MissingArchivedAt { task_id } => {
                    println!("  {} is archived without an archive date", task_id)
                }
            }
        }
    }
    if result.valid {
        println!("✓ board is valid");
    } else {
        println!("✗ board has errors");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Space handlers
// ---------------------------------------------------------------------------

async fn cmd_space(s: &mut Session, args: SpaceCmd) -> CmdResult {
    let action = args.action.unwrap_or(SpaceAction::List);
    let (id, patch) = match action {
        SpaceAction::List => return cmd_space_list(s),
        SpaceAction::New { name, color } => {
            let id = s.board.create_space(&name, color.as_deref()).await?;
            if s.json {
                let space = find_space(&s.board, id.as_str())?;
                return print_json(&space_to_json(space, 0, 0));
            }
            println!("{}", id);
            return Ok(());
        }
        SpaceAction::Rm { space } => {
            let id = find_space(&s.board, &space)?.id.clone();
            let outcome = s.board.delete_space(&id)?;
            let confirmation = s.board.run(outcome).await?;
            report(s, "delete_space", Some(id.to_string()), &confirmation);
            return Ok(());
        }
        SpaceAction::Rename { space, name } => (
            space,
            SpacePatch {
                name: Some(name),
                ..Default::default()
            },
        ),
        SpaceAction::Color { space, color } => (
            space,
            SpacePatch {
                color: Some(color),
                ..Default::default()
            },
        ),
        SpaceAction::Sort {
            space,
            key,
            reversed,
        } => {
            let sort = SortKey::parse(&key).ok_or_else(|| format!("unknown sort key: {}", key))?;
            (
                space,
                SpacePatch {
                    sort: Some(sort),
                    sort_reversed: Some(reversed),
                    ..Default::default()
                },
            )
        }
        SpaceAction::Filter(filter) => (filter.space.clone(), filter_patch(filter)?),
    };

    let id: SpaceId = find_space(&s.board, &id)?.id.clone();
    let outcome = s.board.update_space(&id, patch)?;
    let confirmation = s.board.run(outcome).await?;
    report(s, "update_space", Some(id.to_string()), &confirmation);
    Ok(())
}

fn filter_patch(args: FilterArgs) -> Result<SpacePatch, Box<dyn std::error::Error>> {
    if args.clear {
        return Ok(SpacePatch {
            selected_emojis: Some(Vec::new()),
            selected_progresses: Some(Vec::new()),
            selected_due_date_range: Some(None),
            ..Default::default()
        });
    }
    let progresses = args
        .progress
        .iter()
        .map(|p| parse_progress(p))
        .collect::<Result<Vec<_>, _>>()?;
    let range = match (&args.due_from, &args.due_to) {
        (None, None) => None,
        (from, to) => Some(DueDateRange {
            from: from.as_deref().map(parse_date).transpose()?,
            to: to.as_deref().map(parse_date).transpose()?,
        }),
    };
    Ok(SpacePatch {
        selected_emojis: Some(args.emoji),
        selected_progresses: Some(progresses),
        selected_due_date_range: Some(range),
        ..Default::default()
    })
}

fn cmd_space_list(s: &Session) -> CmdResult {
    let spaces: Vec<SpaceJson> = s
        .board
        .spaces()
        .iter()
        .map(|space| {
            let store = s.board.store();
            let active = store.active_task_count(&space.id);
            let all = store.tasks_in_space(&space.id).count();
            space_to_json(space, active, all - active)
        })
        .collect();
    if s.json {
        return print_json(&spaces);
    }
    for space in &spaces {
        println!("{}", format_space_line(space));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Task handlers
// ---------------------------------------------------------------------------

async fn cmd_add(s: &mut Session, args: AddArgs) -> CmdResult {
    let space = find_space(&s.board, &args.space)?.id.clone();
    let outcome = s.board.create_root_task(&space, &args.name, args.x, args.y)?;
    let confirmation = s.board.run(outcome).await?;
    report(s, "add", None, &confirmation);
    Ok(())
}

async fn cmd_sub(s: &mut Session, args: SubArgs) -> CmdResult {
    let parent = TaskId::from(args.parent);
    let position = parse_position(&args.at)?;
    let outcome = s.board.create_subtask(&parent, &args.name, position)?;
    if outcome.is_ignored() {
        return Err(format!("task not found: {}", parent).into());
    }
    let confirmation = s.board.run(outcome).await?;
    report(s, "sub", None, &confirmation);
    Ok(())
}

async fn cmd_dup(s: &mut Session, args: IdArg) -> CmdResult {
    let id = TaskId::from(args.id);
    let outcome = s.board.duplicate_task(&id)?;
    finish(s, "dup", &id, outcome).await
}

/// Reorder within the task's own list, the same way a drag does
async fn cmd_mv(s: &mut Session, args: MvArgs) -> CmdResult {
    let id = TaskId::from(args.id);
    let position = parse_position(&args.position)?;
    let ctx: OrderContext = s
        .board
        .store()
        .context_of(&id)
        .ok_or_else(|| format!("task not found: {}", id))?;
    let prior = s.board.order_of(&ctx).unwrap_or_default();
    if !prior.contains(&id) {
        return Err(format!("{} is archived; unarchive it before moving", id).into());
    }
    s.board.move_temporary(&id, &ctx, &position)?;
    let outcome = s.board.commit_order(&ctx, prior)?;
    finish(s, "mv", &id, outcome).await
}

async fn cmd_attach(s: &mut Session, args: AttachArgs) -> CmdResult {
    let child = TaskId::from(args.child);
    let parent = TaskId::from(args.parent);
    let position = parse_position(&args.at)?;
    let outcome = s.board.attach_child(&child, &parent, position)?;
    finish(s, "attach", &child, outcome).await
}

async fn cmd_detach(s: &mut Session, args: DetachArgs) -> CmdResult {
    let id = TaskId::from(args.id);
    let task = s
        .board
        .task(&id)
        .ok_or_else(|| format!("task not found: {}", id))?;
    if task.parent_task_id.is_none() {
        return Err(format!("{} is already a root task", id).into());
    }
    let position = parse_position(&args.at)?;
    let x = args.x.unwrap_or(task.x);
    let y = args.y.unwrap_or(task.y);
    let outcome = s.board.detach_to_root(&id, x, y, position)?;
    finish(s, "detach", &id, outcome).await
}

async fn cmd_edit(s: &mut Session, args: EditArgs) -> CmdResult {
    let id = TaskId::from(args.id);
    let clearable = |raw: Option<String>| raw.map(|v| if v == "none" { None } else { Some(v) });
    let patch = TaskPatch {
        name: args.name,
        description: args.description,
        progress: args.progress.as_deref().map(parse_progress).transpose()?,
        x: args.x,
        y: args.y,
        width: args.width,
        height: args.height,
        due_date: match clearable(args.due) {
            Some(Some(raw)) => Some(Some(parse_date(&raw)?)),
            Some(None) => Some(None),
            None => None,
        },
        emoji: clearable(args.emoji),
        ..Default::default()
    };
    if patch.is_empty() {
        return Err("nothing to edit: pass at least one field".into());
    }
    let outcome = s.board.update_task(&id, patch)?;
    finish(s, "edit", &id, outcome).await
}

async fn cmd_normalize(s: &mut Session, args: SpaceArg) -> CmdResult {
    let id = find_space(&s.board, &args.space)?.id.clone();
    let outcome = s.board.normalize_z(&id)?;
    let confirmation = s.board.run(outcome).await?;
    report(s, "normalize", Some(id.to_string()), &confirmation);
    Ok(())
}

async fn cmd_purge(s: &mut Session, args: PurgeArgs) -> CmdResult {
    let now = Utc::now();
    if args.dry_run {
        let expired = crate::ops::archive::expired(
            s.board.store(),
            now,
            s.board.config().archive.retention_days,
        );
        if s.json {
            let ids: Vec<String> = expired.iter().map(|id| id.to_string()).collect();
            return print_json(&ids);
        }
        for id in &expired {
            if let Some(task) = s.board.task(id) {
                println!("{}", format_task_line(&task));
            }
        }
        return Ok(());
    }

    let mut purged = Vec::new();
    for in_flight in s.board.purge_expired_archives(now)? {
        let id = in_flight.ticket;
        s.board.run(Outcome::Sent(in_flight)).await?;
        purged.push(id);
    }
    if s.json {
        return print_json(&serde_json::json!({ "purged": purged.len() }));
    }
    println!("purged {} archived task(s)", purged.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn cmd_config(args: ConfigCmd, override_dir: Option<&str>, json: bool) -> CmdResult {
    let dir = board_dir_from(override_dir)?;
    let (config, mut doc) = config_io::read_config(&dir)?;
    match args.action {
        ConfigAction::Get { key: None } => {
            if json {
                return print_json(&config);
            }
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Get { key: Some(key) } => {
            let value = config_io::get_config_value(&config, &key)?
                .ok_or_else(|| format!("unknown setting: {}", key))?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            config_io::set_config_value(&mut doc, &key, &value)?;
            config_io::write_config(&dir, &doc)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_patch_parses_ranges() {
        let patch = filter_patch(FilterArgs {
            space: "s".into(),
            emoji: vec!["🔥".into()],
            progress: vec!["done".into()],
            due_from: Some("2025-01-01".into()),
            due_to: None,
            clear: false,
        })
        .unwrap();
        assert_eq!(patch.selected_progresses, Some(vec![Progress::Complete]));
        assert_eq!(
            patch.selected_due_date_range,
            Some(Some(DueDateRange {
                from: NaiveDate::from_ymd_opt(2025, 1, 1),
                to: None,
            }))
        );
    }

    #[test]
    fn filter_patch_rejects_bad_dates() {
        let result = filter_patch(FilterArgs {
            space: "s".into(),
            emoji: Vec::new(),
            progress: Vec::new(),
            due_from: Some("January".into()),
            due_to: None,
            clear: false,
        });
        assert!(result.is_err());
    }
}
