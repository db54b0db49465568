use anyhow::{Context, Result, bail};
use bnlearn2rs::common::setup::{ModelSource, parse_configuration_options};
use bnlearn2rs::{BayesianNetwork, Loader, print_blue, print_green, print_red, print_yellow};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

fn rds_files(root: &Path) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        let is_rds = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("rds"));
        if entry.file_type().is_file() && is_rds {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn print_summary(label: &str, model: &BayesianNetwork) {
    print_green!(
        "{}: {} nodes, {} edges",
        label,
        model.node_count(),
        model.edge_count()
    );
    println!("Nodes: {}", model.nodes().collect::<Vec<_>>().join(", "));
    println!("Edges:");
    for (parent, child) in model.edges() {
        println!("  {} -> {}", parent, child);
    }
    println!("CPDs:");
    for cpd in model.cpds() {
        println!("  {}", cpd);
    }
}

fn report(label: &str, model: &BayesianNetwork, json: bool) -> Result<()> {
    if json {
        let text = model
            .to_json()
            .with_context(|| format!("Failed to serialize {}", label))?;
        println!("{}", text);
    } else {
        print_summary(label, model);
    }
    Ok(())
}

fn main() -> Result<()> {
    let options = parse_configuration_options();
    debug!("options: {:?}", options);
    let config = options
        .loader_config()
        .context("Failed to build loader configuration")?;
    let loader = Loader::new(config);

    match &options.source {
        ModelSource::Fetch(name) => {
            print_blue!("Fetching '{}' from {}", name, loader.config().repository_url);
            let (model, _cpds) = loader
                .fetch_model(name)
                .with_context(|| format!("Failed to fetch model '{}'", name))?;
            report(name, &model, options.json)?;
        }
        ModelSource::Path(root) => {
            let files = rds_files(root)?;
            if files.is_empty() {
                print_yellow!("No .rds files found under {}", root.display());
                return Ok(());
            }

            let mut failures = 0;
            for file in &files {
                let label = file.display().to_string();
                match loader.load_model(file) {
                    Ok((model, _cpds)) => report(&label, &model, options.json)?,
                    Err(e) => {
                        warn!("{}: {:?}", label, e);
                        print_red!("{}: {}", label, e);
                        failures += 1;
                    }
                }
            }
            if failures > 0 {
                bail!("{} of {} models failed to load", failures, files.len());
            }
        }
    }
    Ok(())
}
