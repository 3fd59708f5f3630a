use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tsp", about = concat!("taskspace v", env!("CARGO_PKG_VERSION"), " - tasks on a canvas, nested and ordered"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run against a different board directory
    #[arg(short = 'C', long = "board-dir", global = true)]
    pub board_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new board in the current directory
    Init(InitArgs),
    /// Space management
    Space(SpaceCmd),
    /// Add a root task to a space
    Add(AddArgs),
    /// Add a subtask
    Sub(SubArgs),
    /// Reorder a task within its list
    Mv(MvArgs),
    /// Nest a task under another task
    Attach(AttachArgs),
    /// Promote a subtask to a root task
    Detach(DetachArgs),
    /// Duplicate a task and its subtasks
    Dup(IdArg),
    /// Archive a task and its subtasks
    Archive(IdArg),
    /// Restore an archived task
    Unarchive(IdArg),
    /// Permanently delete a task and its subtasks
    Rm(IdArg),
    /// Edit task fields
    Edit(EditArgs),
    /// Bring a task's card to the front
    Front(IdArg),
    /// Compact a space's stacking order
    Normalize(SpaceArg),
    /// List tasks in a space
    List(ListArgs),
    /// Show task details
    Show(ShowArgs),
    /// Search tasks by regex
    Search(SearchArgs),
    /// Validate board integrity
    Check,
    /// Delete archived tasks older than the retention window
    Purge(PurgeArgs),
    /// View or change board settings
    Config(ConfigCmd),
}

// ---------------------------------------------------------------------------
// Init / config
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct InitArgs {
    /// Create an initial space (repeatable)
    #[arg(long = "space")]
    pub spaces: Vec<String>,
}

#[derive(Args)]
pub struct ConfigCmd {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print a setting (section.field), or the whole config
    Get { key: Option<String> },
    /// Change a setting (section.field), keeping the file's formatting
    Set { key: String, value: String },
}

// ---------------------------------------------------------------------------
// Spaces
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct SpaceCmd {
    #[command(subcommand)]
    pub action: Option<SpaceAction>,
}

#[derive(Subcommand)]
pub enum SpaceAction {
    /// List spaces
    List,
    /// Create a space
    New {
        name: String,
        /// Hex color, e.g. "#22c55e"
        #[arg(long)]
        color: Option<String>,
    },
    /// Rename a space
    Rename { space: String, name: String },
    /// Change a space's color
    Color { space: String, color: String },
    /// Set the saved sort of a space
    Sort {
        space: String,
        /// custom, name, due, progress, created, updated
        key: String,
        #[arg(long)]
        reversed: bool,
    },
    /// Set or clear the saved filters of a space
    Filter(FilterArgs),
    /// Delete a space and all of its tasks
    Rm { space: String },
}

#[derive(Args)]
pub struct FilterArgs {
    pub space: String,
    /// Show only tasks with this emoji (repeatable)
    #[arg(long)]
    pub emoji: Vec<String>,
    /// Show only tasks with this progress (repeatable)
    #[arg(long)]
    pub progress: Vec<String>,
    /// Earliest due date (YYYY-MM-DD)
    #[arg(long)]
    pub due_from: Option<String>,
    /// Latest due date (YYYY-MM-DD)
    #[arg(long)]
    pub due_to: Option<String>,
    /// Remove all filters
    #[arg(long, conflicts_with_all = ["emoji", "progress", "due_from", "due_to"])]
    pub clear: bool,
}

// ---------------------------------------------------------------------------
// Task mutations
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct IdArg {
    /// Task ID
    pub id: String,
}

#[derive(Args)]
pub struct SpaceArg {
    /// Space ID or name
    pub space: String,
}

#[derive(Args)]
pub struct AddArgs {
    /// Space ID or name
    pub space: String,
    /// Task name
    pub name: String,
    #[arg(long, default_value_t = 0.0)]
    pub x: f64,
    #[arg(long, default_value_t = 0.0)]
    pub y: f64,
}

#[derive(Args)]
pub struct SubArgs {
    /// Parent task ID
    pub parent: String,
    /// Subtask name
    pub name: String,
    /// start, end, or after:<id>
    #[arg(long, default_value = "end")]
    pub at: String,
}

#[derive(Args)]
pub struct MvArgs {
    /// Task ID
    pub id: String,
    /// start, end, or after:<id>
    pub position: String,
}

#[derive(Args)]
pub struct AttachArgs {
    /// Task to nest
    pub child: String,
    /// New parent task
    pub parent: String,
    /// start, end, or after:<id>
    #[arg(long, default_value = "end")]
    pub at: String,
}

#[derive(Args)]
pub struct DetachArgs {
    /// Task ID
    pub id: String,
    #[arg(long)]
    pub x: Option<f64>,
    #[arg(long)]
    pub y: Option<f64>,
    /// start, end, or after:<id>
    #[arg(long, default_value = "end")]
    pub at: String,
}

#[derive(Args)]
pub struct EditArgs {
    /// Task ID
    pub id: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    /// not_started, in_progress, blocked, complete
    #[arg(long)]
    pub progress: Option<String>,
    /// YYYY-MM-DD, or "none" to clear
    #[arg(long)]
    pub due: Option<String>,
    /// An emoji, or "none" to clear
    #[arg(long)]
    pub emoji: Option<String>,
    #[arg(long)]
    pub x: Option<f64>,
    #[arg(long)]
    pub y: Option<f64>,
    #[arg(long)]
    pub width: Option<f64>,
    #[arg(long)]
    pub height: Option<f64>,
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ListArgs {
    /// Space ID or name (default: all spaces)
    pub space: Option<String>,
    /// Sort by: custom, name, due, progress, created, updated
    /// (default: the space's saved sort)
    #[arg(long)]
    pub sort: Option<String>,
    /// Reverse the sort
    #[arg(long)]
    pub reversed: bool,
    /// Include archived tasks
    #[arg(long)]
    pub archived: bool,
    /// Ignore the space's saved filters
    #[arg(long)]
    pub unfiltered: bool,
    /// Show subtasks nested under their parents
    #[arg(long)]
    pub tree: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Task ID
    pub id: String,
    /// Include the subtree
    #[arg(long)]
    pub tree: bool,
}

#[derive(Args)]
pub struct SearchArgs {
    /// Regex pattern
    pub pattern: String,
    /// Limit to one space
    #[arg(long)]
    pub space: Option<String>,
    /// Include archived tasks
    #[arg(long)]
    pub archived: bool,
}

#[derive(Args)]
pub struct PurgeArgs {
    /// Show what would be deleted without deleting
    #[arg(long)]
    pub dry_run: bool,
}
