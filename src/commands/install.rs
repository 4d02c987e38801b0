use colored::Colorize;
use std::path::Path;
use tapkeg::{InstallRequest, PackageManager, Result};

pub async fn install(pm: &PackageManager, request: &InstallRequest, dry_run: bool) -> Result<()> {
    if dry_run {
        println!("Dry run mode - nothing will be installed");
        let plan = pm.plan(request)?;
        println!("{}", format!("==> Install plan for {}", plan.formula).bold().green());
        for (i, step) in plan.steps.iter().enumerate() {
            println!("  {}. {}", i + 1, step);
        }
        return Ok(());
    }

    println!("Installing {}...", request.formula.bold());

    let result = match pm.install(request).await {
        Ok(result) => result,
        Err(e) => {
            println!("  {} Failed to install {}", "✗".red(), request.formula.bold());
            return Err(e);
        }
    };

    for file in &result.installed_files {
        println!("    ├ {} {}", "✓".green(), display_relative(file, &pm.layout().prefix).dimmed());
    }
    if result.tested {
        println!("    ├ {} {} version", "✓".green(), result.name.dimmed());
    }
    println!(
        "  {} Installed {} {} ({}, {}) in {}ms",
        "✓".green(),
        result.name.bold().green(),
        result.version,
        result.variant,
        result.platform,
        result.time_ms
    );

    println!();
    println!("{}", "==> Caveats".bold());
    print!("{}", result.caveats);

    Ok(())
}

pub fn uninstall(pm: &PackageManager, formula_names: &[String]) -> Result<()> {
    println!(
        "Uninstalling {} formulae...",
        formula_names.len().to_string().bold()
    );

    let mut failed = Vec::new();
    for name in formula_names {
        match pm.uninstall(name) {
            Ok(result) => {
                for file in &result.removed_files {
                    println!("    ├ {} Removed {}", "✓".green(), file.display().to_string().dimmed());
                }
                println!(
                    "  {} Uninstalled {} {}",
                    "✓".green(),
                    name.bold(),
                    result.versions.join(", ").dimmed()
                );
            }
            Err(tapkeg::TapkegError::NotInstalled(_)) => {
                println!("  {} {} not installed", "⚠".yellow(), name.bold());
            }
            Err(e) => {
                println!("  {} Failed to uninstall {}: {}", "✗".red(), name.bold(), e);
                failed.push(name.clone());
            }
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Failed to uninstall: {}", failed.join(", ")).into())
    }
}

pub async fn test(pm: &PackageManager, formula: &str) -> Result<()> {
    println!("Testing {}...", formula.bold());
    pm.test(formula).await?;
    println!("  {} {} passed", "✓".green(), formula.bold());
    Ok(())
}

fn display_relative(path: &Path, prefix: &Path) -> String {
    path.strip_prefix(prefix)
        .unwrap_or(path)
        .display()
        .to_string()
}
