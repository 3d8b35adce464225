//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for list/query commands.
#[derive(ValueEnum, Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table (default)
    #[default]
    Table,
    /// JSON (same as --json)
    Json,
    /// Comma-separated values
    Csv,
}

pub mod commands;

/// citedesk - traffic citations, fines, payments and official receipts
#[derive(Parser, Debug)]
#[command(name = "citedesk", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.citedesk/data/citedesk.db)
    #[arg(long, global = true, env = "CITEDESK_DB")]
    pub db: Option<PathBuf>,

    /// Operator name recorded in the audit log
    #[arg(long, global = true, env = "CITEDESK_ACTOR")]
    pub actor: Option<String>,

    /// Office settings file (default: ~/.citedesk/config.json)
    #[arg(long, global = true, env = "CITEDESK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Output format (table, json, csv)
    #[arg(long, value_enum, global = true, default_value_t)]
    pub format: OutputFormat,

    /// Output only the ID or number of what was created
    #[arg(long, global = true)]
    pub silent: bool,

    /// Preview import commits and backup pruning without writing
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the citedesk database
    Init {
        /// Overwrite an existing database
        #[arg(long)]
        force: bool,

        /// Load the standard violation schedule
        #[arg(long)]
        seed: bool,
    },

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Office settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Office user accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Driver registry and duplicate detection
    Driver {
        #[command(subcommand)]
        command: DriverCommands,
    },

    /// Violation types and their fine schedule
    #[command(name = "violation-type", alias = "vt")]
    ViolationType {
        #[command(subcommand)]
        command: ViolationTypeCommands,
    },

    /// Citation intake and lifecycle
    Citation {
        #[command(subcommand)]
        command: CitationCommands,
    },

    /// Preview the fines a citation would receive
    Fine {
        #[command(subcommand)]
        command: FineCommands,
    },

    /// Payments and OR numbers
    Payment {
        #[command(subcommand)]
        command: PaymentCommands,
    },

    /// Official receipts
    Receipt {
        #[command(subcommand)]
        command: ReceiptCommands,
    },

    /// Reports
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },

    /// Audit trail
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },

    /// Database backups
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },

    /// Spreadsheet import
    Import {
        #[command(subcommand)]
        command: ImportCommands,
    },

    /// Run the JSON HTTP API
    Serve {
        /// Address to listen on (default from config: 127.0.0.1:8080)
        #[arg(long)]
        bind: Option<String>,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective settings
    Show,

    /// Change one setting
    Set {
        /// Setting name (office_name, office_address, or_number_width,
        /// enforce_roles, import_match_threshold, duplicate_link_score,
        /// server_bind, backup_dir)
        key: String,

        /// New value
        value: String,
    },
}

// ============================================================================
// User Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum UserCommands {
    /// Create an office account
    Create {
        /// Login/actor name
        username: String,

        /// Full name
        #[arg(short, long)]
        name: String,

        /// Role (admin, cashier, enforcer, encoder)
        #[arg(short, long, default_value = "encoder")]
        role: String,
    },

    /// List accounts
    List {
        /// Include deactivated accounts
        #[arg(long)]
        all: bool,
    },

    /// Change an account's name, role or active flag
    Update {
        username: String,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        role: Option<String>,

        /// true to reactivate, false to deactivate
        #[arg(long)]
        active: Option<bool>,
    },
}

// ============================================================================
// Driver Commands
// ============================================================================

/// Driver identity fields shared by `driver add` and `citation create`.
#[derive(Args, Debug, Clone, Default)]
pub struct DriverArgs {
    /// Last name
    #[arg(long = "last")]
    pub last_name: Option<String>,

    /// First name
    #[arg(long = "first")]
    pub first_name: Option<String>,

    /// Middle name
    #[arg(long = "middle")]
    pub middle_name: Option<String>,

    /// Driver's license number
    #[arg(long)]
    pub license: Option<String>,

    /// Birth date (YYYY-MM-DD)
    #[arg(long)]
    pub birth_date: Option<String>,

    #[arg(long)]
    pub address: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum DriverCommands {
    /// Register a driver
    Add {
        #[command(flatten)]
        details: DriverArgs,

        /// Register even if the driver looks like an existing one
        #[arg(long)]
        force: bool,
    },

    /// Show a driver
    Show { id: String },

    /// List drivers
    List {
        /// Match name or license
        #[arg(short, long)]
        search: Option<String>,

        #[arg(short, long, default_value = "100")]
        limit: u32,
    },

    /// Correct a driver's details
    Update {
        id: String,

        #[command(flatten)]
        details: DriverArgs,
    },

    /// Find likely duplicates of one driver, or scan the whole registry
    Duplicates {
        /// Driver to check (omit to scan all drivers)
        id: Option<String>,
    },

    /// Merge a duplicate record into the one to keep
    Merge {
        /// Driver to keep
        keep: String,

        /// Driver to fold into it
        remove: String,
    },

    /// Citation history and offense totals
    History { id: String },
}

// ============================================================================
// Violation Type Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ViolationTypeCommands {
    /// Add a violation type
    Add {
        /// Short code (e.g. NH)
        code: String,

        /// Name (e.g. "No Helmet")
        name: String,

        /// Fines for 1st, 2nd and 3rd+ offense (e.g. 1000,1500,2000)
        #[arg(long, value_delimiter = ',', required = true)]
        fines: Vec<String>,

        #[arg(short, long)]
        category: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// List the schedule
    List {
        /// Include deactivated types
        #[arg(long)]
        all: bool,
    },

    /// Change a violation type
    Update {
        code: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(short, long)]
        category: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        /// New fines for 1st, 2nd and 3rd+ offense
        #[arg(long, value_delimiter = ',')]
        fines: Option<Vec<String>>,

        /// Reactivate a deactivated type
        #[arg(long)]
        activate: bool,
    },

    /// Stop using a violation type for new citations
    Deactivate { code: String },
}

// ============================================================================
// Citation Commands
// ============================================================================

#[derive(Args, Debug)]
pub struct CitationCreateArgs {
    /// Ticket number
    pub ticket: String,

    /// Existing driver ID (otherwise give --last/--first)
    #[arg(long = "driver")]
    pub driver_id: Option<String>,

    #[command(flatten)]
    pub driver: DriverArgs,

    /// Apprehension date and time (YYYY-MM-DD [HH:MM])
    #[arg(long)]
    pub date: String,

    /// Violation codes (comma-separated)
    #[arg(long, value_delimiter = ',', required = true)]
    pub violations: Vec<String>,

    #[arg(long)]
    pub place: Option<String>,

    #[arg(long)]
    pub plate: Option<String>,

    #[arg(long)]
    pub vehicle: Option<String>,

    /// Apprehending officer
    #[arg(long)]
    pub officer: Option<String>,

    #[arg(long)]
    pub remarks: Option<String>,

    /// Register a new driver even if it looks like an existing one
    #[arg(long)]
    pub force_new_driver: bool,
}

#[derive(Args, Debug)]
pub struct CitationListArgs {
    /// Status (pending, contested, paid, dismissed, void)
    #[arg(short, long)]
    pub status: Option<String>,

    #[arg(long = "driver")]
    pub driver_id: Option<String>,

    /// From date (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub from: Option<String>,

    /// To date (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub to: Option<String>,

    /// Match ticket, plate or driver name
    #[arg(long)]
    pub search: Option<String>,

    #[arg(short, long, default_value = "50")]
    pub limit: u32,
}

#[derive(Args, Debug)]
pub struct CitationUpdateArgs {
    pub id: String,

    /// New apprehension date and time
    #[arg(long)]
    pub date: Option<String>,

    #[arg(long)]
    pub place: Option<String>,

    #[arg(long)]
    pub plate: Option<String>,

    #[arg(long)]
    pub vehicle: Option<String>,

    #[arg(long)]
    pub officer: Option<String>,

    #[arg(long)]
    pub remarks: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum CitationCommands {
    /// Record a citation
    Create(CitationCreateArgs),

    /// Show a citation by ID or ticket number
    Show { id: String },

    /// List citations
    List(CitationListArgs),

    /// Edit an unpaid citation
    Update(CitationUpdateArgs),

    /// Add a violation to an unpaid citation
    AddViolation { id: String, code: String },

    /// Remove a violation from an unpaid citation
    RemoveViolation { id: String, code: String },

    /// Contest, void, dismiss or reopen a citation
    Status {
        id: String,

        /// New status
        status: String,

        /// Reason (required to void or dismiss)
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Recompute offense counts for a driver's unpaid citations
    Recalc {
        /// Driver ID
        driver: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum FineCommands {
    /// Fines a new citation would receive
    Preview {
        /// Violation codes (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        violations: Vec<String>,

        #[arg(long = "driver")]
        driver_id: Option<String>,

        /// Apprehension date and time (default: now)
        #[arg(long)]
        date: Option<String>,
    },
}

// ============================================================================
// Payment Commands
// ============================================================================

#[derive(Args, Debug)]
pub struct PaymentRecordArgs {
    /// Citation ID or ticket number
    pub citation: String,

    /// Official receipt number
    #[arg(long = "or")]
    pub or_number: String,

    /// Amount paid (default: the balance due)
    #[arg(long)]
    pub amount: Option<String>,

    /// Cash handed over
    #[arg(long)]
    pub tendered: Option<String>,

    /// Method (cash, check, money_order, online)
    #[arg(short, long, default_value = "cash")]
    pub method: String,

    /// Check number or transaction reference
    #[arg(long)]
    pub reference: Option<String>,

    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Args, Debug)]
pub struct PaymentListArgs {
    #[arg(short, long)]
    pub status: Option<String>,

    #[arg(short, long)]
    pub method: Option<String>,

    #[arg(long)]
    pub cashier: Option<String>,

    /// Citation ID or ticket number
    #[arg(long)]
    pub citation: Option<String>,

    #[arg(long)]
    pub from: Option<String>,

    #[arg(long)]
    pub to: Option<String>,

    #[arg(short, long, default_value = "100")]
    pub limit: u32,
}

#[derive(Subcommand, Debug)]
pub enum PaymentCommands {
    /// Record a payment (pending until its receipt prints)
    Record(PaymentRecordArgs),

    /// Confirm that a payment's receipt printed
    Confirm {
        /// Payment ID or OR number
        id: String,
    },

    /// Void a payment
    Void {
        id: String,

        #[arg(short, long, required = true)]
        reason: String,
    },

    /// Void a misprinted receipt and re-record it under a new OR number
    Reissue {
        id: String,

        /// Replacement OR number
        #[arg(long = "new-or")]
        new_or: String,
    },

    /// Refund a completed payment
    Refund {
        id: String,

        #[arg(short, long, required = true)]
        reason: String,
    },

    /// Show a payment by ID or OR number
    Show { id: String },

    /// List payments
    List(PaymentListArgs),

    /// Payments waiting for their receipt to print
    Pending,

    /// Whether an OR number can be used
    CheckOr { or_number: String },

    /// Suggest the next OR number
    NextOr,

    /// Totals by status, method and cashier
    Stats {
        #[arg(long)]
        from: Option<String>,

        #[arg(long)]
        to: Option<String>,
    },
}

// ============================================================================
// Receipt Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ReceiptCommands {
    /// Render a receipt without printing it
    Show { or_number: String },

    /// Print a receipt (confirms pending payments, otherwise a reprint)
    Print {
        or_number: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// ============================================================================
// Report Commands
// ============================================================================

#[derive(Args, Debug, Clone, Default)]
pub struct RangeArgs {
    /// From date (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub from: Option<String>,

    /// To date (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub to: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ReportCommands {
    /// Citations by status, fines and collections
    Summary(RangeArgs),

    /// Most common violations
    Violations {
        #[command(flatten)]
        range: RangeArgs,

        #[arg(long, default_value = "10")]
        top: u32,
    },

    /// Collections by day or month
    Collections {
        #[command(flatten)]
        range: RangeArgs,

        /// day or month
        #[arg(long, default_value = "day")]
        period: String,
    },

    /// Repeat offenders
    Offenders {
        #[command(flatten)]
        range: RangeArgs,

        /// Minimum citations
        #[arg(long, default_value = "2")]
        min: u32,
    },

    /// Citations per apprehending officer
    Officers(RangeArgs),

    /// Outstanding balances by age
    Aging,
}

// ============================================================================
// Audit Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum AuditCommands {
    /// List audit entries, newest first
    List {
        /// Entity type (citation, payment, driver, ...)
        #[arg(long)]
        entity: Option<String>,

        #[arg(long)]
        id: Option<String>,

        #[arg(long = "by")]
        actor: Option<String>,

        /// Action (payment_voided, citation_created, ...)
        #[arg(long)]
        action: Option<String>,

        #[arg(long)]
        from: Option<String>,

        #[arg(long)]
        to: Option<String>,

        #[arg(short, long, default_value = "100")]
        limit: u32,
    },

    /// Full history of one record
    History { entity: String, id: String },
}

// ============================================================================
// Backup Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum BackupCommands {
    /// Take a backup now
    Create {
        /// Directory for the backup file
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Backup history
    List {
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Check a backup's checksum and integrity
    Verify { id: i64 },

    /// Replace the database with a backup file
    Restore { file: PathBuf },

    /// Delete old backups beyond the retention count
    Prune {
        /// Backups to keep (default: retention setting)
        #[arg(long)]
        keep: Option<usize>,
    },

    /// Run the scheduled backup if it is due
    Run,

    /// Show or change the backup schedule
    Settings {
        #[arg(long)]
        enabled: Option<bool>,

        /// daily, weekly or monthly
        #[arg(long)]
        frequency: Option<String>,

        /// Backup directory ("" to use the default)
        #[arg(long)]
        dir: Option<String>,

        /// Backups to keep when pruning
        #[arg(long)]
        retention: Option<i64>,
    },
}

// ============================================================================
// Import Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ImportCommands {
    /// Read a spreadsheet into a staged batch
    Stage {
        file: PathBuf,

        /// Sheet name (default: first sheet)
        #[arg(long)]
        sheet: Option<String>,

        /// Stage a file that was already imported
        #[arg(long)]
        force: bool,
    },

    /// List import batches
    List {
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Show a batch and its rows
    Show {
        batch: String,

        /// Only rows with this status (valid, duplicate, conflict, error, imported, skipped)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Decide how a conflicting row is committed
    Resolve {
        batch: String,

        /// Sheet row number
        row: i64,

        /// Leave the row out
        #[arg(long, conflicts_with_all = ["renumber", "overwrite"])]
        skip: bool,

        /// Import under this ticket number instead
        #[arg(long, conflicts_with = "overwrite")]
        renumber: Option<String>,

        /// Replace the existing unpaid citation
        #[arg(long)]
        overwrite: bool,
    },

    /// Commit a staged batch (use --dry-run to preview)
    Commit { batch: String },

    /// Abandon a staged batch
    Cancel { batch: String },
}
