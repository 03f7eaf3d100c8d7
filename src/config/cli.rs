use crate::adapters::simulated::AutoplayPolicy;
use crate::utils::error::Result;
use crate::utils::validation::{validate_non_empty_string, validate_url, Validate};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Clone, Parser)]
#[command(name = "ar-session")]
#[command(about = "Image-tracking AR session controller: target preparation and session simulation")]
pub struct CliConfig {
    /// Path to a TOML session configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Validate and normalize a target image or precompiled target
    Prepare(PrepareArgs),
    /// Run a full session against the in-memory platform
    Simulate(SimulateArgs),
}

#[derive(Debug, Clone, clap::Args)]
pub struct PrepareArgs {
    /// URL or local path of the target (.png/.jpg/.webp or .mind)
    pub source: String,

    /// Where to write the processed payload
    #[arg(long)]
    pub out: Option<String>,

    /// Treat the source as a precompiled target regardless of its extension
    #[arg(long)]
    pub precompiled: bool,
}

#[derive(Debug, Clone, clap::Args)]
pub struct SimulateArgs {
    /// Campaign metadata URL (JSON); a built-in demo campaign is used otherwise
    #[arg(long)]
    pub campaign: Option<String>,

    /// Number of zero-size container checks before the container lays out
    #[arg(long, default_value = "0")]
    pub zero_size: u32,

    #[arg(long, help = "Simulate a denied camera permission prompt")]
    pub deny_camera: bool,

    #[arg(long, help = "Make the engine reject every real target buffer")]
    pub corrupt_engine: bool,

    /// Anchor visibility script, e.g. "1,0,1" (one event every 500ms)
    #[arg(long, default_value = "1,0,1")]
    pub detections: String,

    #[arg(long, value_enum, default_value = "allow")]
    pub autoplay: AutoplayArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AutoplayArg {
    Allow,
    Muted,
    Deny,
}

impl From<AutoplayArg> for AutoplayPolicy {
    fn from(arg: AutoplayArg) -> Self {
        match arg {
            AutoplayArg::Allow => AutoplayPolicy::Allow,
            AutoplayArg::Muted => AutoplayPolicy::MutedOnly,
            AutoplayArg::Deny => AutoplayPolicy::Deny,
        }
    }
}

impl SimulateArgs {
    pub fn detection_script(&self) -> Vec<bool> {
        self.detections
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| matches!(s, "1" | "true" | "on"))
            .collect()
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        match &self.command {
            CliCommand::Prepare(args) => validate_non_empty_string("source", &args.source),
            CliCommand::Simulate(args) => {
                if let Some(url) = &args.campaign {
                    validate_url("campaign", url)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simulate() {
        let cli = CliConfig::parse_from([
            "ar-session",
            "simulate",
            "--zero-size",
            "2",
            "--detections",
            "1, 0 ,true",
            "--autoplay",
            "muted",
        ]);
        let CliCommand::Simulate(args) = &cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.zero_size, 2);
        assert_eq!(args.detection_script(), vec![true, false, true]);
        assert_eq!(AutoplayPolicy::from(args.autoplay), AutoplayPolicy::MutedOnly);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_parse_prepare_with_global_flags() {
        let cli = CliConfig::parse_from(["ar-session", "prepare", "poster.jpg", "--out", "t.png", "-v"]);
        assert!(cli.verbose);
        let CliCommand::Prepare(args) = &cli.command else {
            panic!("expected prepare");
        };
        assert_eq!(args.out.as_deref(), Some("t.png"));
        assert!(!args.precompiled);

        let cli = CliConfig::parse_from(["ar-session", "prepare", "https://cdn.example.com/t/abc123", "--precompiled"]);
        let CliCommand::Prepare(args) = &cli.command else {
            panic!("expected prepare");
        };
        assert!(args.precompiled);
    }

    #[test]
    fn test_invalid_campaign_url() {
        let cli = CliConfig::parse_from(["ar-session", "simulate", "--campaign", "nope"]);
        assert!(cli.validate().is_err());
    }
}
