use anyhow::{Context, Result};
use clap::Parser;
use flow_gates::{NodeId, PopulationTree};
use flow_workspace::{
    GatingSet, ParseOptions, SampleNameLocation, WorkspaceType, XmlParserOptions,
    parse_workspace_with,
};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

/// Reconstruct the gating hierarchies stored in a FlowJo workspace
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "parse-workspace")]
struct Cli {
    /// Workspace file (.wsp or .xml)
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Sample id to parse; repeat for several. Ids are parsed before names
    #[arg(long = "sample-id", value_name = "ID")]
    sample_ids: Vec<String>,

    /// Sample display name to parse; repeat for several
    #[arg(long = "sample-name", value_name = "NAME")]
    sample_names: Vec<String>,

    /// Parse only the members of this sample group
    #[arg(long)]
    group: Option<String>,

    /// Build the population skeleton only, without gate geometry
    #[arg(long)]
    no_gates: bool,

    /// Where sample names are read from (default: the dialect's choice)
    #[arg(long, value_enum)]
    name_location: Option<NameLocationArg>,

    /// XML parser option; repeat to combine
    #[arg(long = "parser-option", value_enum)]
    parser_options: Vec<ParserOptionArg>,

    /// Workspace dialect
    #[arg(long, value_enum, default_value = "auto")]
    ws_type: WsTypeArg,

    /// Build sample trees in parallel
    #[arg(long)]
    parallel: bool,

    /// Skip requested samples that do not exist instead of failing
    #[arg(long)]
    skip_missing: bool,

    /// Print the gating set as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum NameLocationArg {
    /// The `$FIL` keyword
    Keyword,
    /// The sample node's name attribute
    SampleNode,
}

impl From<NameLocationArg> for SampleNameLocation {
    fn from(arg: NameLocationArg) -> Self {
        match arg {
            NameLocationArg::Keyword => SampleNameLocation::Keyword,
            NameLocationArg::SampleNode => SampleNameLocation::SampleNode,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ParserOptionArg {
    /// Tolerate mismatched end tags and malformed attributes
    Recover,
    /// Keep unknown entities verbatim
    Noent,
    /// Drop whitespace-only text
    Noblanks,
    /// Lift depth and text size limits
    Huge,
}

impl From<ParserOptionArg> for XmlParserOptions {
    fn from(arg: ParserOptionArg) -> Self {
        match arg {
            ParserOptionArg::Recover => XmlParserOptions::RECOVER,
            ParserOptionArg::Noent => XmlParserOptions::NOENT,
            ParserOptionArg::Noblanks => XmlParserOptions::NOBLANKS,
            ParserOptionArg::Huge => XmlParserOptions::HUGE,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum WsTypeArg {
    /// Detect from the version tag
    Auto,
    /// FlowJo for Windows
    Win,
    /// FlowJo for Mac 2.0
    Mac,
    /// FlowJo vX
    Vx,
}

impl WsTypeArg {
    fn workspace_type(self) -> Option<WorkspaceType> {
        match self {
            WsTypeArg::Auto => None,
            WsTypeArg::Win => Some(WorkspaceType::Windows),
            WsTypeArg::Mac => Some(WorkspaceType::MacLegacy),
            WsTypeArg::Vx => Some(WorkspaceType::FlowJoX),
        }
    }
}

impl Cli {
    fn parse_options(&self) -> Result<ParseOptions> {
        let mut builder = ParseOptions::new();
        builder
            .sample_ids(self.sample_ids.clone())
            .sample_names(self.sample_names.clone())
            .parse_gates(!self.no_gates)
            .xml_options(
                self.parser_options
                    .iter()
                    .fold(XmlParserOptions::empty(), |acc, &opt| acc | opt.into()),
            )
            .parallel(self.parallel)
            .skip_missing_samples(self.skip_missing);
        if let Some(group) = &self.group {
            builder.group(group.clone());
        }
        if let Some(location) = self.name_location {
            builder.name_location(SampleNameLocation::from(location));
        }
        if let Some(ws_type) = self.ws_type.workspace_type() {
            builder.workspace_type(ws_type);
        }
        builder.build().context("Invalid parse options")
    }
}

fn print_tree(tree: &PopulationTree) {
    for (id, node) in tree {
        let depth = tree.get_depth(id);
        let count = node
            .count
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        let kind = node
            .gate
            .as_ref()
            .map(|g| format!(" [{}{}]", if g.negated { "not " } else { "" }, g.kind))
            .unwrap_or_default();
        let label = if id == NodeId::ROOT { "root" } else { node.name.as_ref() };
        println!("  {}{} ({}){}", "  ".repeat(depth), label, count, kind);
    }
}

fn print_summary(gating_set: &GatingSet) {
    println!(
        "Workspace type: {} (version {})",
        gating_set.workspace_type(),
        gating_set.version().unwrap_or("?")
    );
    println!(
        "{} samples, {} shared transformations, {} groups",
        gating_set.len(),
        gating_set.transformations().len(),
        gating_set.groups().len()
    );
    for sample in gating_set.iter() {
        println!();
        println!("Sample {} '{}' ({} populations)", sample.id, sample.guid, sample.tree.node_count() - 1);
        if let Some(compensation) = &sample.compensation {
            println!("  compensation '{}' over {} detectors", compensation.name, compensation.parameters().len());
        }
        print_tree(&sample.tree);
    }
}

fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = cli.parse_options()?;

    let start = Instant::now();
    let gating_set = parse_workspace_with(&cli.file, &options)
        .with_context(|| format!("Failed to parse workspace {}", cli.file.display()))?;
    info!(
        "Parsed {} samples in {:.1} ms",
        gating_set.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&gating_set)?);
    } else {
        print_summary(&gating_set);
    }
    Ok(())
}
