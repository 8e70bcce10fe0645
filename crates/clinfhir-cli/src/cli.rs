use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "clinfhir")]
#[command(about = "Convert clinical records into FHIR-style transaction bundles")]
#[command(version)]
pub struct Cli {
    /// Number of patients to convert
    #[arg(short = 'n', long)]
    pub patients: Option<usize>,

    /// Pick patients randomly instead of in key order
    #[arg(long)]
    pub random: bool,

    /// Maximum number of patients converting concurrently
    #[arg(long)]
    pub pool_size: Option<usize>,

    /// Flush a bundle once it holds this many entries
    #[arg(long)]
    pub bundle_threshold: Option<usize>,

    /// Where finished bundles go: console, file, both or server
    #[arg(short, long)]
    pub output: Option<String>,

    /// Directory for file output modes
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Repository endpoint for server output mode
    #[arg(long, env = "CLINFHIR_SERVER")]
    pub server: Option<String>,

    /// Bearer token for server output mode
    #[arg(long, env = "CLINFHIR_TOKEN")]
    pub token: Option<String>,

    /// Write per-patient timings to this CSV file after the run
    #[arg(long)]
    pub timings: Option<PathBuf>,

    /// Emit pre-admission imaging reports as patient-level bundles
    #[arg(long)]
    pub imaging: bool,

    /// Seed for the synthetic record source
    #[arg(long)]
    pub seed: Option<u64>,

    /// Config file path
    #[arg(short, long, env = "CLINFHIR_CONFIG", default_value = "clinfhir.toml")]
    pub config: PathBuf,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["clinfhir"]);
        assert_eq!(cli.patients, None);
        assert!(!cli.random);
        assert_eq!(cli.config, PathBuf::from("clinfhir.toml"));
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_flags() {
        let cli = Cli::parse_from([
            "clinfhir",
            "-n",
            "25",
            "--random",
            "--pool-size",
            "4",
            "--output",
            "file",
            "--output-dir",
            "/tmp/bundles",
        ]);
        assert_eq!(cli.patients, Some(25));
        assert!(cli.random);
        assert_eq!(cli.pool_size, Some(4));
        assert_eq!(cli.output.as_deref(), Some("file"));
        assert_eq!(cli.output_dir, Some(PathBuf::from("/tmp/bundles")));
    }
}
