use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use rod_db::{Database, DatabaseConfig, LIBRARY_VERSION};
use rod_meta::{Metadata, Version, METADATA_FILE};
use rod_types::Resource;
use serde_json::json;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Info(args) => cmd_info(args, cli.format),
        Command::Check(args) => cmd_check(args, cli.format),
        Command::Arrange(args) => cmd_arrange(args, cli.format),
    }
}

fn load_metadata(dir: &Path) -> anyhow::Result<Metadata> {
    let path = dir.join(METADATA_FILE);
    Metadata::load(&path).with_context(|| format!("reading {}", path.display()))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<DatabaseConfig> {
    match path {
        Some(path) => DatabaseConfig::from_toml_file(path)
            .with_context(|| format!("reading {}", path.display())),
        None => Ok(DatabaseConfig::default()),
    }
}

/// Descriptors stored in the metadata, rebuilt as compiled resources.
fn stored_resources(metadata: &Metadata) -> anyhow::Result<Vec<Arc<Resource>>> {
    Ok(metadata
        .to_resources()?
        .into_iter()
        .map(Arc::new)
        .collect())
}

// ---------------------------------------------------------------------------
// info
// ---------------------------------------------------------------------------

fn info_json(metadata: &Metadata) -> serde_json::Value {
    let resources: Vec<_> = metadata
        .resources
        .values()
        .map(|r| {
            json!({
                "name": r.name,
                "parent": r.parent,
                "container": r.container,
                "element_size": r.element_size,
                "fields": r.fields.len(),
                "singular": r.singular.len(),
                "plural": r.plural.len(),
                "count": r.count,
                "bytes": r.bytes,
            })
        })
        .collect();
    json!({
        "id": metadata.id.to_string(),
        "version": metadata.version.to_string(),
        "created_at": metadata.created_at().to_rfc3339(),
        "updated_at": metadata.updated_at.to_rfc3339(),
        "resources": resources,
    })
}

fn cmd_info(args: InfoArgs, format: OutputFormat) -> anyhow::Result<()> {
    let metadata = load_metadata(&args.dir)?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&info_json(&metadata))?);
        return Ok(());
    }

    println!("Database {}", args.dir.display().to_string().bold());
    println!("  Id: {}", metadata.id.to_string().cyan());
    println!("  Version: {}", metadata.version.to_string().yellow());
    println!("  Created: {}", metadata.created_at().to_rfc3339());
    println!("  Updated: {}", metadata.updated_at.to_rfc3339());
    println!("  Resources:");
    for r in metadata.resources.values() {
        let parent = r
            .parent
            .as_deref()
            .map(|p| format!(" < {p}"))
            .unwrap_or_default();
        println!(
            "    {}{} in {} ({} bytes/record): {} records, {} payload bytes",
            r.name.bold(),
            parent.dimmed(),
            r.container.cyan(),
            r.element_size,
            r.count,
            r.bytes
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

/// Outcome of checking one database directory.
#[derive(Debug)]
pub struct CheckReport {
    pub version: Version,
    pub running: Version,
    pub compatible: bool,
    /// `(resource, records in metadata, records found)`
    pub counts: Vec<(String, u64, u64)>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.compatible && self.counts.iter().all(|(_, stored, found)| stored == found)
    }
}

fn check(dir: &Path, running: Version, config: DatabaseConfig) -> anyhow::Result<CheckReport> {
    let metadata = load_metadata(dir)?;
    let compatible = metadata.valid(&running);
    let mut report = CheckReport {
        version: metadata.version,
        running,
        compatible,
        counts: Vec::new(),
    };
    if !compatible || running != LIBRARY_VERSION {
        // the containers can only be read by this library's own version
        return Ok(report);
    }

    let resources = stored_resources(&metadata)?;
    let config = DatabaseConfig {
        readonly: true,
        arrange_on_open: false,
        ..config
    };
    let db = Database::open(dir, config, &resources)?;
    for resource in &resources {
        let stored = metadata
            .resource(resource.name())
            .map(|r| r.count)
            .unwrap_or(0);
        let mut found = 0;
        for object in db.each(resource.name())? {
            object?;
            found += 1;
        }
        report.counts.push((resource.name().to_string(), stored, found));
    }
    Ok(report)
}

fn cmd_check(args: CheckArgs, format: OutputFormat) -> anyhow::Result<()> {
    let running = match &args.version {
        Some(v) => v.parse::<Version>()?,
        None => LIBRARY_VERSION,
    };
    let config = load_config(args.config.as_deref())?;
    let report = check(&args.dir, running, config)?;

    if format == OutputFormat::Json {
        let counts: Vec<_> = report
            .counts
            .iter()
            .map(|(name, stored, found)| json!({"resource": name, "stored": stored, "found": found}))
            .collect();
        let out = json!({
            "version": report.version.to_string(),
            "running": report.running.to_string(),
            "compatible": report.compatible,
            "resources": counts,
            "ok": report.is_ok(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        if report.compatible {
            println!(
                "{} Version {} readable by {}",
                "✓".green().bold(),
                report.version.to_string().yellow(),
                report.running
            );
        } else {
            println!(
                "{} Version {} not readable by {}",
                "✗".red().bold(),
                report.version.to_string().yellow(),
                report.running
            );
        }
        for (name, stored, found) in &report.counts {
            let mark = if stored == found {
                "✓".green()
            } else {
                "✗".red()
            };
            println!("  {mark} {}: {found} of {stored} records", name.bold());
        }
    }

    if !report.is_ok() {
        bail!("check failed for {}", args.dir.display());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// arrange
// ---------------------------------------------------------------------------

fn arrange(dir: &Path, config: DatabaseConfig) -> anyhow::Result<usize> {
    let metadata = load_metadata(dir)?;
    let resources = stored_resources(&metadata)?;
    let config = DatabaseConfig {
        arrange_on_open: false,
        ..config
    };
    let moved = Database::with_open(dir, config, &resources, |db| db.arrange())?;
    Ok(moved)
}

fn cmd_arrange(args: ArrangeArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    if config.readonly {
        bail!("{} is configured read-only", args.dir.display());
    }
    let moved = arrange(&args.dir, config)?;
    match format {
        OutputFormat::Json => println!("{}", json!({ "moved": moved })),
        OutputFormat::Text => println!(
            "{} Arranged {}: {} records moved",
            "✓".green().bold(),
            args.dir.display().to_string().bold(),
            moved
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rod_db::{FieldType, Object, ResourceBuilder};
    use tempfile::TempDir;

    fn populated() -> TempDir {
        let dir = TempDir::new().unwrap();
        let base = ResourceBuilder::new("Shape")
            .field("sides", FieldType::Integer)
            .build()
            .unwrap();
        let square = ResourceBuilder::new("Square")
            .inherits(&base)
            .field("side", FieldType::Float)
            .build()
            .unwrap();
        let (base, square) = (Arc::new(base), Arc::new(square));
        let mut db =
            Database::create(dir.path(), DatabaseConfig::default(), &[base.clone(), square.clone()])
                .unwrap();
        for i in 0..4 {
            let mut shape = if i % 2 == 0 {
                let mut s = Object::new(square.clone());
                s.set("side", 2.0).unwrap();
                s
            } else {
                Object::new(base.clone())
            };
            shape.set("sides", 4i64).unwrap();
            db.store(&mut shape).unwrap();
        }
        db.close().unwrap();
        dir
    }

    #[test]
    fn check_reads_every_record() {
        let dir = populated();
        let report = check(dir.path(), LIBRARY_VERSION, DatabaseConfig::default()).unwrap();
        assert!(report.is_ok());
        assert_eq!(
            report.counts,
            vec![("Shape".to_string(), 2, 2), ("Square".to_string(), 2, 2)]
        );
    }

    #[test]
    fn check_against_an_older_library_fails() {
        let dir = populated();
        let report = check(dir.path(), Version::new(0, 1, 0), DatabaseConfig::default()).unwrap();
        assert!(!report.compatible);
        assert!(!report.is_ok());
    }

    #[test]
    fn arrange_moves_interleaved_records_once() {
        let dir = populated();
        assert!(arrange(dir.path(), DatabaseConfig::default()).unwrap() > 0);
        assert_eq!(arrange(dir.path(), DatabaseConfig::default()).unwrap(), 0);
        assert!(check(dir.path(), LIBRARY_VERSION, DatabaseConfig::default())
            .unwrap()
            .is_ok());
    }

    #[test]
    fn info_lists_resources() {
        let dir = populated();
        let info = info_json(&load_metadata(dir.path()).unwrap());
        assert_eq!(info["resources"][0]["name"], "Shape");
        assert_eq!(info["resources"][1]["count"], 2);
    }
}
