//! # flow-workspace
//!
//! Reads FlowJo workspace files (`.wsp`, `.xml`) and rebuilds the gating
//! hierarchy of each sample as a [`flow_gates::PopulationTree`].
//!
//! Three dialects are supported: FlowJo for Windows, FlowJo for Mac (2.0) and
//! FlowJo vX. The dialect is detected from the `Workspace@version` tag or can be
//! forced. Parsing produces a [`GatingSet`]: per-sample population trees with
//! keywords and compensation, the transformations they share, and the
//! declared sample groups.
//!
//! ## Quick Start
//!
//! ```rust
//! use flow_workspace::{ParseOptions, Workspace, XmlParserOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let xml = r#"<Workspace version="20.0"><SampleList><Sample>
//!   <DataSet sampleID="1"/>
//!   <Keywords><Keyword name="$FIL" value="tube.fcs"/></Keywords>
//!   <SampleNode name="tube.fcs" sampleID="1" count="5000"><Subpopulations>
//!     <Population name="Lymph" count="2100"><Gate><gating:RectangleGate>
//!       <gating:dimension gating:min="100" gating:max="900">
//!         <data-type:fcs-dimension data-type:name="FSC-A"/>
//!       </gating:dimension>
//!     </gating:RectangleGate></Gate></Population>
//!   </Subpopulations></SampleNode>
//! </Sample></SampleList></Workspace>"#;
//!
//! let workspace = Workspace::parse_str(xml, XmlParserOptions::empty(), None)?;
//! let gating_set = workspace.gating_set(&ParseOptions::default())?;
//!
//! let sample = gating_set.get("1").ok_or("sample 1 missing")?;
//! assert_eq!(sample.guid, "tube.fcs");
//! assert!(sample.tree.find_by_path("/Lymph").is_some());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every failure is reported as a [`WorkspaceError`] and aborts the whole
//! call; a partially built gating set is never returned.

pub mod assembler;
pub mod builder;
pub mod channels;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod gatingml;
pub mod options;
pub mod samples;
pub mod workspace;

pub use assembler::{GatingSet, SampleGatingHierarchy};
pub use dispatch::{SampleNameLocation, WorkspaceType, resolve_workspace_type};
pub use document::{XmlDocument, XmlElement, XmlParserOptions};
pub use error::{Result, WorkspaceError};
pub use options::{ParseOptions, ParseOptionsBuilder};
pub use samples::SampleEntry;
pub use workspace::{Workspace, parse_workspace, parse_workspace_with};
