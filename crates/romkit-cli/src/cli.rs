use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "romkit",
    about = "Decompile a cartridge ROM into an editable project and compile it back",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (defaults to $ROMKIT_CONFIG or ~/.config/romkit/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// ROM layout file, overriding the configured one
    #[arg(long, global = true)]
    pub layout: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Extract every resource from a ROM into a new project
    Decompile(DecompileArgs),
    /// Rebuild a ROM from a project and a base ROM
    Compile(CompileArgs),
    /// Migrate a project to the current schema version
    Upgrade(UpgradeArgs),
    /// Re-extract only the text tables into an existing project
    DecompileText(DecompileArgs),
    /// Grow a ROM image to a larger size
    Expand(ExpandArgs),
    /// Prepend a 512-byte copier header
    AddHeader(ConvertArgs),
    /// Remove the 512-byte copier header
    StripHeader(ConvertArgs),
    /// Show size, header, fingerprint and title of a ROM
    Info(InfoArgs),
    /// Show or change tool settings
    Config(ConfigArgs),
    /// Launch the configured emulator on a ROM
    Run(RunArgs),
}

#[derive(Args)]
pub struct DecompileArgs {
    pub rom: PathBuf,
    pub project: PathBuf,
}

#[derive(Args)]
pub struct CompileArgs {
    pub project: PathBuf,
    pub base_rom: PathBuf,
    pub output: PathBuf,
    /// Grow the ROM when free space runs out (overrides the config)
    #[arg(long)]
    pub auto_expand: bool,
}

#[derive(Args)]
pub struct UpgradeArgs {
    pub project: PathBuf,
    pub base_rom: PathBuf,
}

#[derive(Args)]
pub struct ExpandArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Target size in bytes, decimal or 0x-prefixed hex (defaults to the
    /// layout's largest size)
    #[arg(long, value_parser = parse_size)]
    pub size: Option<usize>,
}

#[derive(Args)]
pub struct ConvertArgs {
    pub input: PathBuf,
    pub output: PathBuf,
}

#[derive(Args)]
pub struct InfoArgs {
    pub rom: PathBuf,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the current settings
    Show,
    /// Set one key (layout, auto_expand, emulator)
    Set { key: String, value: String },
}

#[derive(Args)]
pub struct RunArgs {
    pub rom: PathBuf,
    /// Emulator executable (overrides the config)
    #[arg(long)]
    pub emulator: Option<PathBuf>,
}

fn parse_size(s: &str) -> Result<usize, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid size `{s}`: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compile() {
        let cli = Cli::try_parse_from([
            "romkit",
            "--verbose",
            "compile",
            "proj",
            "base.sfc",
            "out.sfc",
            "--auto-expand",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Compile(args) => {
                assert_eq!(args.project, PathBuf::from("proj"));
                assert_eq!(args.output, PathBuf::from("out.sfc"));
                assert!(args.auto_expand);
            }
            _ => panic!("expected compile"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "romkit",
            "decompile-text",
            "rom.sfc",
            "proj",
            "--layout",
            "mother2.toml",
            "--config",
            "cfg.toml",
        ])
        .unwrap();
        assert_eq!(cli.layout, Some(PathBuf::from("mother2.toml")));
        assert_eq!(cli.config, Some(PathBuf::from("cfg.toml")));
        assert!(matches!(cli.command, Command::DecompileText(_)));
    }

    #[test]
    fn expand_size_accepts_hex() {
        let cli = Cli::try_parse_from(["romkit", "expand", "a", "b", "--size", "0x400000"]).unwrap();
        match cli.command {
            Command::Expand(args) => assert_eq!(args.size, Some(0x400000)),
            _ => panic!("expected expand"),
        }
        assert!(Cli::try_parse_from(["romkit", "expand", "a", "b", "--size", "big"]).is_err());
    }

    #[test]
    fn config_set() {
        let cli = Cli::try_parse_from(["romkit", "config", "set", "auto_expand", "true"]).unwrap();
        match cli.command {
            Command::Config(ConfigArgs {
                action: Some(ConfigAction::Set { key, value }),
            }) => {
                assert_eq!(key, "auto_expand");
                assert_eq!(value, "true");
            }
            _ => panic!("expected config set"),
        }
    }

    #[test]
    fn missing_arguments_are_rejected() {
        assert!(Cli::try_parse_from(["romkit", "compile", "proj"]).is_err());
        assert!(Cli::try_parse_from(["romkit"]).is_err());
    }
}
