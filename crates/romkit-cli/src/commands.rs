use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use romkit_core::{
    add_header_file, expand_rom, rom_info, spawn, strip_header_file, Job, OperationReport,
    Orchestrator, ProgressEvent, ToolConfig,
};
use romkit_modules::RomLayout;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(ToolConfig::default_path);
    let mut config = ToolConfig::load(&config_path)?;
    let layout = || config.resolve_layout(cli.layout.as_deref());

    match cli.command {
        Command::Decompile(args) => run_job(
            layout()?,
            &config,
            Job::Decompile {
                rom: args.rom,
                project: args.project,
            },
        ),
        Command::DecompileText(args) => run_job(
            layout()?,
            &config,
            Job::DecompilePartial {
                rom: args.rom,
                project: args.project,
            },
        ),
        Command::Compile(args) => {
            let layout = layout()?;
            config.auto_expand |= args.auto_expand;
            run_job(
                layout,
                &config,
                Job::Compile {
                    project: args.project,
                    base_rom: args.base_rom,
                    output: args.output,
                },
            )
        }
        Command::Upgrade(args) => run_job(
            layout()?,
            &config,
            Job::Upgrade {
                project: args.project,
                base_rom: args.base_rom,
            },
        ),
        Command::Expand(args) => cmd_expand(args, &layout()?),
        Command::AddHeader(args) => {
            add_header_file(&args.input, &args.output)?;
            println!("{} Header added: {}", "✓".green().bold(), args.output.display());
            Ok(())
        }
        Command::StripHeader(args) => {
            strip_header_file(&args.input, &args.output)?;
            println!("{} Header removed: {}", "✓".green().bold(), args.output.display());
            Ok(())
        }
        Command::Info(args) => cmd_info(&args.rom, &layout()?),
        Command::Config(args) => cmd_config(args, config, &config_path),
        Command::Run(args) => cmd_run(args, &config),
    }
}

/// Run one orchestrator job on a worker thread, drawing its progress.
fn run_job(layout: RomLayout, config: &ToolConfig, job: Job) -> anyhow::Result<()> {
    let orchestrator = Arc::new(Orchestrator::new(layout, config));
    let run = spawn(orchestrator, job);

    let mut stderr = std::io::stderr();
    for event in run.events() {
        match event {
            ProgressEvent::Fraction(f) => {
                let _ = write!(stderr, "\r  {:>3}%", (f * 100.0).round() as u32);
            }
            ProgressEvent::BeginIndeterminate => {
                let _ = write!(stderr, "\r  ...  ");
            }
            ProgressEvent::EndIndeterminate => {}
        }
        let _ = stderr.flush();
    }
    let _ = writeln!(stderr);

    match run.wait() {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            if let Some(module) = e.module_id() {
                eprintln!("{} module {} failed", "✗".red().bold(), module.yellow());
            }
            Err(e.into())
        }
    }
}

fn print_report(report: &OperationReport) {
    println!(
        "{} {} finished in {:.2?}",
        "✓".green().bold(),
        report.operation.to_string().bold(),
        report.elapsed
    );
    for module in &report.modules {
        let pointers = if module.pointer_updates > 0 {
            format!(", {} pointers rewritten", module.pointer_updates).cyan().to_string()
        } else {
            String::new()
        };
        println!("  {:<12} {} items{}", module.module.yellow(), module.resources, pointers);
    }
    for (from, to) in &report.migrations {
        println!("  migrated schema {} -> {}", from, to.to_string().green());
    }
    if report.rom_size > 0 {
        println!("  ROM size: {:#x}", report.rom_size);
    }
}

fn cmd_expand(args: ExpandArgs, layout: &RomLayout) -> anyhow::Result<()> {
    let target = args.size.unwrap_or_else(|| layout.max_size());
    let size = expand_rom(&args.input, &args.output, target)?;
    println!("{} Expanded to {:#x} bytes: {}", "✓".green().bold(), size, args.output.display());
    Ok(())
}

fn cmd_info(rom: &Path, layout: &RomLayout) -> anyhow::Result<()> {
    let info = rom_info(rom, layout)?;
    println!("{}", rom.display().to_string().bold());
    let accepted = if info.size_accepted {
        "accepted".green()
    } else {
        format!("not a {} size", layout.name).red()
    };
    println!("  Size: {:#x} ({})", info.size, accepted);
    println!("  Copier header: {}", if info.header_present { "yes" } else { "no" });
    println!("  Title: {}", info.title.as_deref().unwrap_or("-").cyan());
    println!("  Fingerprint: {}", info.fingerprint.dimmed());
    Ok(())
}

fn cmd_config(args: ConfigArgs, mut config: ToolConfig, path: &Path) -> anyhow::Result<()> {
    match args.action {
        Some(ConfigAction::Set { key, value }) => {
            if !config.set(&key, &value) {
                bail!("unknown config key `{key}` (expected layout, auto_expand or emulator)");
            }
            config.save(path)?;
            println!("Set {} = {}", key.bold(), value);
        }
        Some(ConfigAction::Show) | None => {
            println!("{}", path.display().to_string().dimmed());
            let show = |p: &Option<std::path::PathBuf>| {
                p.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "(not set)".into())
            };
            println!("  layout = {}", show(&config.layout));
            println!("  auto_expand = {}", config.auto_expand);
            println!("  emulator = {}", show(&config.emulator));
        }
    }
    Ok(())
}

/// Start the emulator and return without waiting for it.
fn cmd_run(args: RunArgs, config: &ToolConfig) -> anyhow::Result<()> {
    let Some(emulator) = args.emulator.as_ref().or(config.emulator.as_ref()) else {
        bail!("no emulator configured; use `romkit config set emulator <path>`");
    };
    let child = std::process::Command::new(emulator)
        .arg(&args.rom)
        .spawn()
        .with_context(|| format!("failed to launch {}", emulator.display()))?;
    tracing::debug!(pid = child.id(), "emulator started");
    println!("{} Launched {}", "✓".green().bold(), emulator.display());
    Ok(())
}
