use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "medreg")]
#[command(about = "medreg: patient registry with correlative code allocation")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the TOML configuration file (default: medreg.toml)
    #[arg(short, long, global = true, env = "MEDREG_CONFIG")]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, Debug, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the embedded database migrations
    Migrate,
    /// Allocate and commit one code for a prefix (e.g. CP)
    Allocate(AllocateArgs),
    /// Register a patient and assign its codes
    Register(RegisterArgs),
    /// Show a patient by id
    Get(GetArgs),
    /// List all patients
    List,
    /// Update a patient from a JSON patch file
    Update(UpdateArgs),
    /// Show committed counter values
    Counters,
}

#[derive(clap::Args)]
pub struct AllocateArgs {
    /// Sequence prefix
    pub prefix: String,
}

#[derive(clap::Args)]
pub struct RegisterArgs {
    /// User account the patient belongs to
    #[arg(long)]
    pub user_id: i64,
    /// Operator recorded as creator
    #[arg(long)]
    pub created_by: String,
    /// JSON file with the clinical fields (camelCase)
    #[arg(long)]
    pub file: Option<String>,
}

#[derive(clap::Args)]
pub struct GetArgs {
    /// Patient id
    pub id: i64,
}

#[derive(clap::Args)]
pub struct UpdateArgs {
    /// Patient id
    pub id: i64,
    /// Operator recorded as last modifier
    #[arg(long)]
    pub updated_by: String,
    /// JSON patch file; absent fields are left unchanged
    #[arg(long)]
    pub file: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_register() {
        let cli = Cli::try_parse_from([
            "medreg",
            "--format",
            "table",
            "register",
            "--user-id",
            "12",
            "--created-by",
            "admin",
        ])
        .unwrap();

        assert_eq!(cli.format, Some(OutputFormat::Table));
        match cli.command {
            Commands::Register(args) => {
                assert_eq!(args.user_id, 12);
                assert_eq!(args.created_by, "admin");
                assert!(args.file.is_none());
            }
            _ => panic!("expected register"),
        }
    }

    #[test]
    fn test_update_requires_file() {
        assert!(Cli::try_parse_from(["medreg", "update", "1", "--updated-by", "nurse"]).is_err());
    }
}
