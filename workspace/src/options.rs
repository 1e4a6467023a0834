use crate::dispatch::{SampleNameLocation, WorkspaceType};
use crate::document::XmlParserOptions;
use crate::error::Result;
use derive_builder::Builder;

/// Options controlling which samples are parsed and how.
///
/// # Example
///
/// ```rust
/// use flow_workspace::{ParseOptions, SampleNameLocation};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let options = ParseOptions::new()
///     .sample_names(vec!["tube_01.fcs".to_string()])
///     .name_location(SampleNameLocation::SampleNode)
///     .parallel(true)
///     .build()?;
///
/// assert!(options.parse_gates);
/// # Ok(())
/// # }
/// ```
#[derive(Builder, Clone, Debug, PartialEq)]
#[builder(setter(into, strip_option), default)]
pub struct ParseOptions {
    /// Sample ids to parse, in output order
    pub sample_ids: Vec<String>,

    /// Sample display names to parse, after the ids
    pub sample_names: Vec<String>,

    /// Parse only the members of this group
    pub group: Option<String>,

    /// Parse gate geometry; when false only the population skeleton is built
    #[builder(default = "true")]
    pub parse_gates: bool,

    /// Override the dialect's sample name location
    pub name_location: Option<SampleNameLocation>,

    pub xml_options: XmlParserOptions,

    /// Force a dialect instead of detecting it from the version tag
    pub workspace_type: Option<WorkspaceType>,

    /// Build per-sample trees on the rayon thread pool
    pub parallel: bool,

    /// Warn about and skip requested samples that do not exist
    pub skip_missing_samples: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            sample_ids: Vec::new(),
            sample_names: Vec::new(),
            group: None,
            parse_gates: true,
            name_location: None,
            xml_options: XmlParserOptions::empty(),
            workspace_type: None,
            parallel: false,
            skip_missing_samples: false,
        }
    }
}

impl ParseOptions {
    /// Create a new builder for ParseOptions
    pub fn new() -> ParseOptionsBuilder {
        ParseOptionsBuilder::default()
    }

    /// Options equivalent to the positional `parse_workspace` arguments.
    pub fn from_codes(
        sample_ids: Vec<String>,
        sample_names: Vec<String>,
        is_parse_gate: bool,
        samp_nloc: u16,
        xml_parser_option: i32,
        ws_type: u16,
    ) -> Result<Self> {
        Ok(Self {
            sample_ids,
            sample_names,
            parse_gates: is_parse_gate,
            name_location: SampleNameLocation::from_code(samp_nloc)?,
            xml_options: XmlParserOptions::from_raw(xml_parser_option),
            workspace_type: WorkspaceType::from_code(ws_type)?,
            ..Self::default()
        })
    }
}
