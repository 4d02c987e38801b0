use colored::Colorize;
use tapkeg::{PackageManager, PlatformKey, Result, VariantLabel};

pub fn info(pm: &PackageManager, name: &str, json: bool) -> Result<()> {
    let formula = pm.index().get(name)?;

    if json {
        println!("{}", serde_json::to_string_pretty(formula)?);
        return Ok(());
    }

    println!("{}", format!("==> {}", formula.name).bold().green());
    println!("{}", formula.desc);
    println!("{}: {}", "Homepage".bold(), formula.homepage);
    println!("{}: {}", "Binary".bold(), formula.binary_name());

    for variant in &formula.variants {
        let default = if variant.label == formula.default_variant {
            " (default)"
        } else {
            ""
        };
        let platforms: Vec<String> = variant.artifacts.keys().map(|k| k.to_string()).collect();
        println!(
            "{}: {}{} [{}]",
            variant.label.to_string().bold(),
            variant.version,
            default.dimmed(),
            platforms.join(", ")
        );
    }

    if !formula.completions.is_empty() {
        let shells: Vec<&str> = formula.completions.iter().map(|c| c.shell.as_str()).collect();
        println!("{}: {}", "Completions".bold(), shells.join(", "));
    }

    if !formula.conflicts_with.is_empty() {
        println!("{}:", "Conflicts with".bold());
        for conflict in &formula.conflicts_with {
            match &conflict.because {
                Some(because) => println!("  {} {}", conflict.name.cyan(), format!("(because {because})").dimmed()),
                None => println!("  {}", conflict.name.cyan()),
            }
        }
    }

    let installed = tapkeg::cellar::get_installed_versions(pm.layout(), name)?;
    if installed.is_empty() {
        println!("{}: {}", "Installed".bold(), "no".dimmed());
    } else {
        for pkg in installed {
            let when = pkg
                .receipt
                .installed_at()
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            println!(
                "{}: {} ({}) {}",
                "Installed".bold(),
                pkg.version,
                pkg.receipt.variant,
                when.dimmed()
            );
        }
    }

    Ok(())
}

pub fn list(pm: &PackageManager) -> Result<()> {
    let installed = pm.installed()?;

    if installed.is_empty() {
        println!("No formulae installed");
        return Ok(());
    }

    for pkg in installed {
        println!(
            "{} {} {}",
            pkg.name.bold(),
            pkg.version,
            format!("({}, {})", pkg.receipt.variant, pkg.binary_name()).dimmed()
        );
    }

    Ok(())
}

/// Print the artifact a host would fetch, for handing to a downloader
pub fn resolve(
    pm: &PackageManager,
    name: &str,
    variant: Option<VariantLabel>,
    platform: PlatformKey,
) -> Result<()> {
    let selection = pm.resolve(name, variant, platform)?;

    println!("{}: {}", "Formula".bold(), selection.formula.name);
    println!(
        "{}: {} {}",
        "Variant".bold(),
        selection.variant.label,
        selection.variant.version
    );
    println!("{}: {}", "Platform".bold(), selection.platform);
    println!("{}: {}", "URL".bold(), selection.artifact.url);
    println!("{}: {}", "SHA256".bold(), selection.artifact.sha256);

    Ok(())
}

pub fn caveats(pm: &PackageManager, name: &str, variant: Option<VariantLabel>) -> Result<()> {
    let text = pm.caveats(name, variant)?;
    println!("{}", format!("==> {}: Caveats", name).bold().green());
    print!("{}", text);
    Ok(())
}
