use clap::Parser;
use std::path::PathBuf;

use crate::store::Delimiter;

/// Command-line arguments for csvduck
#[derive(Parser, Debug, Default)]
#[command(version, about = "Import, edit and plot CSV data backed by DuckDB")]
pub struct Args {
    /// DuckDB database file (":memory:" keeps nothing on disk)
    #[arg(long = "db")]
    pub db: Option<String>,

    /// Table to open at startup
    #[arg(long = "table")]
    pub table: Option<String>,

    /// Import this CSV file into the table at startup
    #[arg(long = "import", requires = "table")]
    pub import: Option<PathBuf>,

    /// Field separator for import and export
    #[arg(long = "delimiter", value_enum)]
    pub delimiter: Option<Delimiter>,

    /// Interface language (en, de, pl, jp)
    #[arg(long = "lang")]
    pub lang: Option<String>,

    /// Enable debug mode to show operational information
    #[arg(long = "debug", action)]
    pub debug: bool,

    /// Write the default configuration file and exit
    #[arg(long = "generate-config", action)]
    pub generate_config: bool,

    /// Overwrite an existing configuration file with --generate-config
    #[arg(long = "force", action, requires = "generate_config")]
    pub force: bool,

    /// Delete the log file and exit
    #[arg(long = "clear-logs", action)]
    pub clear_logs: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "csvduck",
            "--db",
            ":memory:",
            "--table",
            "t",
            "--import",
            "data.csv",
            "--delimiter",
            "comma",
            "--lang",
            "de",
        ])
        .unwrap();
        assert_eq!(args.db.as_deref(), Some(":memory:"));
        assert_eq!(args.table.as_deref(), Some("t"));
        assert_eq!(args.import, Some(PathBuf::from("data.csv")));
        assert_eq!(args.delimiter, Some(Delimiter::Comma));
        assert_eq!(args.lang.as_deref(), Some("de"));
        assert!(!args.debug);
    }

    #[test]
    fn test_import_requires_table() {
        assert!(Args::try_parse_from(["csvduck", "--import", "data.csv"]).is_err());
    }

    #[test]
    fn test_force_requires_generate_config() {
        assert!(Args::try_parse_from(["csvduck", "--force"]).is_err());
        assert!(Args::try_parse_from(["csvduck", "--generate-config", "--force"]).is_ok());
    }
}
