use clap::{Arg, ArgGroup, ArgMatches, Command, value_parser};
use env_logger::{Builder, Env};
use std::{io::Write, path::PathBuf, time::Duration};

use super::config::LoaderConfig;
use crate::error::BnError;

/// Where the model to convert comes from
#[derive(Clone, Debug, PartialEq)]
pub enum ModelSource {
    /// A `.rds` file, or a directory searched for them
    Path(PathBuf),
    /// A model name in the bnlearn repository
    Fetch(String),
}

/// These options define the inputs from the user.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandLineOptions {
    pub source: ModelSource,
    pub json: bool,
    pub tolerance: Option<f64>,
    pub config_file: Option<PathBuf>,
    pub repository_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl CommandLineOptions {
    /// Config file (or environment) settings with command-line overrides applied
    pub fn loader_config(&self) -> Result<LoaderConfig, BnError> {
        let mut config = match &self.config_file {
            Some(path) => LoaderConfig::from_json_file(path)?,
            None => LoaderConfig::from_env(),
        };
        if let Some(url) = &self.repository_url {
            config.repository_url = url.clone();
        }
        if let Some(tolerance) = self.tolerance {
            config.tolerance = tolerance;
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        Ok(config)
    }
}

pub fn init_logging() {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let file = record.file().unwrap_or("unknown");
            let line = record.line().unwrap_or(0);
            writeln!(
                buf,
                "{} [{}:{}] {}",
                record.level(),
                file,
                line,
                record.args()
            )
        })
        .init();
}

pub fn command() -> Command {
    Command::new("bnlearn2rs")
        .version("0.1")
        .about("Convert bnlearn RDS models into discrete Bayesian networks.")
        .arg(
            Arg::new("path")
                .long("path")
                .value_name("FILE|DIR")
                .value_parser(value_parser!(PathBuf))
                .help("An .rds file, or a directory to search for .rds files"),
        )
        .arg(
            Arg::new("fetch")
                .long("fetch")
                .value_name("NAME")
                .help("Fetch a model by name from the bnlearn repository, e.g. 'asia'"),
        )
        .group(
            ArgGroup::new("source")
                .args(["path", "fetch"])
                .required(true),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the converted model as JSON")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("tolerance")
                .long("tolerance")
                .value_name("NUMBER")
                .value_parser(value_parser!(f64))
                .help("Allowed deviation of CPD column sums from 1"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("JSON loader configuration (optional)"),
        )
        .arg(
            Arg::new("repository_url")
                .long("repository_url")
                .value_name("URL")
                .help("Base URL of the model repository"),
        )
        .arg(
            Arg::new("timeout_secs")
                .long("timeout_secs")
                .value_name("NUMBER")
                .value_parser(value_parser!(u64))
                .help("Download timeout in seconds, 0 for none"),
        )
}

pub fn options_from_matches(matches: &ArgMatches) -> CommandLineOptions {
    let source = match matches.get_one::<PathBuf>("path") {
        Some(path) => ModelSource::Path(path.clone()),
        // the "source" group guarantees one of the two
        None => ModelSource::Fetch(
            matches
                .get_one::<String>("fetch")
                .cloned()
                .unwrap_or_default(),
        ),
    };

    CommandLineOptions {
        source,
        json: matches.get_flag("json"),
        tolerance: matches.get_one::<f64>("tolerance").copied(),
        config_file: matches.get_one::<PathBuf>("config").cloned(),
        repository_url: matches.get_one::<String>("repository_url").cloned(),
        timeout_secs: matches.get_one::<u64>("timeout_secs").copied(),
    }
}

pub fn parse_configuration_options() -> CommandLineOptions {
    init_logging();
    options_from_matches(&command().get_matches())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CommandLineOptions, clap::Error> {
        let mut argv = vec!["bnlearn2rs"];
        argv.extend_from_slice(args);
        command()
            .try_get_matches_from(argv)
            .map(|m| options_from_matches(&m))
    }

    #[test]
    fn test_path_source() {
        let options = parse(&["--path", "models/asia.rds", "--json"]).unwrap();
        assert_eq!(options.source, ModelSource::Path(PathBuf::from("models/asia.rds")));
        assert!(options.json);
        assert_eq!(options.tolerance, None);
    }

    #[test]
    fn test_fetch_with_overrides() {
        let options = parse(&[
            "--fetch",
            "asia",
            "--tolerance",
            "0.001",
            "--repository_url",
            "http://mirror/bn",
            "--timeout_secs",
            "0",
        ])
        .unwrap();
        assert_eq!(options.source, ModelSource::Fetch("asia".to_string()));

        let config = options.loader_config().unwrap();
        assert_eq!(config.tolerance, 0.001);
        assert_eq!(config.repository_url, "http://mirror/bn");
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn test_source_is_required_and_exclusive() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--path", "a.rds", "--fetch", "asia"]).is_err());
        assert!(parse(&["--fetch", "asia", "--tolerance", "small"]).is_err());
    }
}
