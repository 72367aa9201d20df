use std::cmp::Ordering;
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{arg, crate_version, value_parser, ArgAction, ArgMatches, Command};
use itertools::Itertools;
use log::{error, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::error::Error;
use crate::log::{config_default, config_with_file};
use crate::protocol::ProtocolBehavior;
use crate::runner::{Outcome, Runner};
use crate::tree::Conversation;

/// Name of the conversation which runs before and after every batch.
pub const SANITY: &str = "sanity";

/// Where conversations connect to.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl Default for Target {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 4433,
            timeout: Duration::from_secs(5),
        }
    }
}

pub type Factory<PB> = Box<dyn Fn() -> Result<Conversation<PB>, Error>>;

/// Named conversation factories, in registration order.
///
/// Conversations are built fresh for every run since nodes keep per-run state.
pub struct Registry<PB: ProtocolBehavior> {
    entries: Vec<(String, Factory<PB>)>,
}

impl<PB: ProtocolBehavior> Default for Registry<PB> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<PB: ProtocolBehavior> Registry<PB> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S, F>(&mut self, name: S, factory: F) -> Result<(), Error>
    where
        S: Into<String>,
        F: Fn() -> Result<Conversation<PB>, Error> + 'static,
    {
        let name = name.into();
        if self.contains(&name) {
            return Err(Error::Configuration(format!(
                "conversation {} is registered twice",
                name
            )));
        }
        self.entries.push((name, Box::new(factory)));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(known, _)| known == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn build(&self, name: &str) -> Result<Conversation<PB>, Error> {
        let (_, factory) = self
            .entries
            .iter()
            .find(|(known, _)| known == name)
            .ok_or_else(|| Error::Lookup(format!("no conversation named {}", name)))?;
        factory()
    }
}

/// A named set of conversations the binary can run.
pub struct Suite<PB: ProtocolBehavior> {
    pub name: &'static str,
    pub about: &'static str,
    pub build: fn(&Target) -> Result<Registry<PB>, Error>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub target: Target,
    pub suite: Option<String>,
    /// Run only these conversations, besides sanity. Empty means all of them.
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Run a random selection of this many conversations.
    pub sample: Option<usize>,
    pub repeat: usize,
    pub json: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub list: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target: Target::default(),
            suite: None,
            include: Vec::new(),
            exclude: Vec::new(),
            sample: None,
            repeat: 1,
            json: None,
            log_file: None,
            list: false,
        }
    }
}

impl RunConfig {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let defaults = Self::default();
        let strings = |id: &str| -> Vec<String> {
            matches
                .get_many::<String>(id)
                .map(|values| values.cloned().collect())
                .unwrap_or_default()
        };

        Self {
            target: Target {
                host: matches
                    .get_one::<String>("host")
                    .cloned()
                    .unwrap_or(defaults.target.host),
                port: matches
                    .get_one::<u16>("port")
                    .copied()
                    .unwrap_or(defaults.target.port),
                timeout: matches
                    .get_one::<Duration>("timeout")
                    .copied()
                    .unwrap_or(defaults.target.timeout),
            },
            suite: matches.get_one::<String>("suite").cloned(),
            include: strings("names"),
            exclude: strings("exclude"),
            sample: matches.get_one::<usize>("sample").copied(),
            repeat: matches
                .get_one::<usize>("repeat")
                .copied()
                .unwrap_or(defaults.repeat),
            json: matches.get_one::<PathBuf>("json").cloned(),
            log_file: matches.get_one::<PathBuf>("log-file").cloned(),
            list: matches.get_flag("list"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub name: String,
    pub node: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub total: usize,
    pub skipped: usize,
    pub passed: usize,
    pub failed: usize,
    /// Did sanity pass both first and last? If not, the other results mean little.
    pub sanity_ok: bool,
    pub failed_names: Vec<String>,
    pub failures: Vec<FailureRecord>,
}

impl Report {
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.sanity_ok
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str("Test end\n");
        out.push_str(&"=".repeat(20));
        out.push('\n');
        out.push_str(&format!("TOTAL: {}\n", self.total));
        out.push_str(&format!("SKIP: {}\n", self.skipped));
        out.push_str(&format!("PASS: {}\n", self.passed));
        out.push_str(&format!("FAIL: {}\n", self.failed));
        if !self.sanity_ok {
            out.push_str("sanity did not pass, results are inconclusive\n");
        }
        if !self.failed_names.is_empty() {
            out.push_str(&format!(
                "Failed conversations: {}\n",
                self.failed_names.iter().join(", ")
            ));
        }
        out
    }
}

/// Ordering in which embedded numbers compare by value, so `mac -2` sorts before `mac -10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    fn chunks(s: &str) -> Vec<(bool, &str)> {
        let mut out = Vec::new();
        let mut start = 0;
        let mut digits = None;
        for (i, c) in s.char_indices() {
            let is_digit = c.is_ascii_digit();
            if let Some(previous) = digits {
                if previous != is_digit {
                    out.push((previous, &s[start..i]));
                    start = i;
                }
            }
            digits = Some(is_digit);
        }
        if let Some(previous) = digits {
            out.push((previous, &s[start..]));
        }
        out
    }

    let (left, right) = (chunks(a), chunks(b));
    for ((l_digits, l), (r_digits, r)) in left.iter().zip(right.iter()) {
        let ordering = if *l_digits && *r_digits {
            let (l, r) = (l.trim_start_matches('0'), r.trim_start_matches('0'));
            l.len().cmp(&r.len()).then_with(|| l.cmp(r))
        } else {
            l.cmp(r)
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    left.len().cmp(&right.len()).then_with(|| a.cmp(b))
}

/// Order in which conversations run: sanity, the selection, sanity again.
/// Returns the plan and how many conversations were left out.
pub fn plan<PB: ProtocolBehavior, R: Rng>(
    registry: &Registry<PB>,
    config: &RunConfig,
    rng: &mut R,
) -> Result<(Vec<String>, usize), Error> {
    if let Some(unknown) = config
        .include
        .iter()
        .chain(config.exclude.iter())
        .find(|name| !registry.contains(name))
    {
        return Err(Error::Configuration(format!(
            "there is no conversation named {}",
            unknown
        )));
    }

    let regular: Vec<&str> = registry.names().filter(|name| *name != SANITY).collect();
    let mut selected: Vec<String> = regular
        .iter()
        .filter(|name| config.include.is_empty() || config.include.iter().any(|n| n == *name))
        .filter(|name| !config.exclude.iter().any(|n| n == *name))
        .map(|name| name.to_string())
        .collect();

    if let Some(sample) = config.sample {
        if sample < selected.len() {
            selected = selected.choose_multiple(rng, sample).cloned().collect();
        }
    }

    let skipped = regular.len() - selected.len();
    let mut ordered = Vec::with_capacity(selected.len() + 2);
    if registry.contains(SANITY) {
        ordered.push(SANITY.to_string());
        ordered.extend(selected);
        ordered.push(SANITY.to_string());
    } else {
        warn!("no {} conversation registered", SANITY);
        ordered.extend(selected);
    }
    Ok((ordered, skipped))
}

/// Runs every planned conversation `repeat` times. Failures of single conversations are
/// recorded, only broken conversations abort the batch.
pub fn run_batch<PB: ProtocolBehavior>(
    registry: &Registry<PB>,
    config: &RunConfig,
) -> Result<Report, Error> {
    let (ordered, skipped) = plan(registry, config, &mut rand::thread_rng())?;
    let mut report = Report {
        skipped,
        sanity_ok: registry.contains(SANITY),
        ..Report::default()
    };

    for name in &ordered {
        for iteration in 0..config.repeat.max(1) {
            info!("{} ({}/{})", name, iteration + 1, config.repeat.max(1));
            let mut conversation = registry.build(name)?;
            let outcome = Runner::new(&mut conversation, PB::State::default()).run()?;

            report.total += 1;
            match outcome {
                Outcome::Done => {
                    info!("{} ... OK", name);
                    report.passed += 1;
                }
                Outcome::Failed(failure) => {
                    error!("{} ... FAIL at {}: {}", name, failure.description, failure.reason);
                    report.failed += 1;
                    if name == SANITY {
                        report.sanity_ok = false;
                    }
                    report.failures.push(FailureRecord {
                        name: name.clone(),
                        node: failure.description,
                        reason: failure.reason,
                    });
                }
            }
        }
    }

    report.failed_names = report
        .failures
        .iter()
        .map(|failure| failure.name.clone())
        .unique()
        .sorted_by(|a, b| natural_cmp(a, b))
        .collect();
    Ok(report)
}

/// A positive, finite number of seconds.
fn parse_timeout(value: &str) -> Result<Duration, String> {
    let secs: f64 = value.parse().map_err(|err| format!("{}", err))?;
    match Duration::try_from_secs_f64(secs) {
        Ok(timeout) if !timeout.is_zero() => Ok(timeout),
        _ => Err(format!("{} is not a usable number of seconds", value)),
    }
}

pub fn create_app<PB: ProtocolBehavior>(name: &'static str, suites: &[Suite<PB>]) -> Command {
    let suite_help = suites
        .iter()
        .map(|suite| format!("{}: {}", suite.name, suite.about))
        .join("\n");

    Command::new(name)
        .version(crate::GIT_REF)
        .long_version(crate_version!())
        .about("Runs conversations against a TLS server and reports which of them fail")
        .after_help(format!("Suites:\n{}", suite_help))
        .disable_help_flag(true)
        .arg(arg!(--help "Print help").action(ArgAction::Help))
        .arg(arg!(-h --host <host> "Hostname of the server").required(false))
        .arg(
            arg!(-p --port <port> "Port of the server")
                .required(false)
                .value_parser(value_parser!(u16).range(1..)),
        )
        .arg(
            arg!(-s --suite <suite> "Which suite to run, the first one by default")
                .required(false),
        )
        .arg(
            arg!(-e --exclude <name> "Skip the named conversation, may repeat")
                .required(false)
                .action(ArgAction::Append),
        )
        .arg(
            arg!(-n --sample <num> "Run only a random selection of this many conversations")
                .required(false)
                .value_parser(value_parser!(usize)),
        )
        .arg(
            arg!(-r --repeat <num> "How often to run each conversation")
                .required(false)
                .value_parser(value_parser!(usize)),
        )
        .arg(
            arg!(-t --timeout <secs> "Seconds to wait for the server")
                .required(false)
                .value_parser(parse_timeout),
        )
        .arg(
            arg!(--json <file> "Write the report as json")
                .required(false)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            arg!(--"log-file" <file> "Additionally log into this file")
                .required(false)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(arg!(--list "Print the conversations of the suite and exit"))
        .arg(arg!([names] ... "Run only these conversations, besides sanity"))
}

pub fn main<PB: ProtocolBehavior>(name: &'static str, suites: &[Suite<PB>]) -> ExitCode {
    let matches = create_app(name, suites).get_matches();
    let config = RunConfig::from_matches(&matches);

    let log_config = match &config.log_file {
        Some(path) => config_with_file(path),
        None => config_default(),
    };
    let _handle = match log_config.and_then(|c| {
        log4rs::init_config(c).map_err(|err| Error::Configuration(err.to_string()))
    }) {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("Failed to init logging: {}", err);
            return ExitCode::FAILURE;
        }
    };

    info!("Git Version: {}", crate::GIT_REF);

    let suite = match &config.suite {
        Some(wanted) => suites.iter().find(|suite| suite.name == wanted.as_str()),
        None => suites.first(),
    };
    let Some(suite) = suite else {
        error!("Unknown suite {:?}", config.suite);
        return ExitCode::FAILURE;
    };

    let registry = match (suite.build)(&config.target) {
        Ok(registry) => registry,
        Err(err) => {
            error!("Failed to build suite {}: {}", suite.name, err);
            return ExitCode::FAILURE;
        }
    };

    if config.list {
        for name in registry.names() {
            println!("{}", name);
        }
        return ExitCode::SUCCESS;
    }

    info!(
        "Running suite {} against {}:{}",
        suite.name, config.target.host, config.target.port
    );
    let report = match run_batch(&registry, &config) {
        Ok(report) => report,
        Err(err) => {
            error!("Aborting the batch: {}", err);
            return ExitCode::FAILURE;
        }
    };

    println!("{}", report.summary());

    if let Some(path) = &config.json {
        let written = File::create(path)
            .map_err(Error::from)
            .and_then(|file| serde_json::to_writer_pretty(file, &report).map_err(Error::from));
        if let Err(err) = written {
            error!("Failed to write report to {}: {}", path.display(), err);
            return ExitCode::FAILURE;
        }
    }

    if report.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
