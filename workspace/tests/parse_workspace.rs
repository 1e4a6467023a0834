//! End-to-end parsing of workspace fixtures for each dialect.

use flow_gates::{BooleanOperation, GateGeometry, GateKind, Transformation, TransformationKind};
use flow_workspace::*;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Write an edited copy of a fixture to a temporary file.
fn edited_fixture(name: &str, from: &str, to: &str) -> NamedTempFile {
    let source = std::fs::read_to_string(fixture(name)).unwrap();
    assert!(source.contains(from), "fixture {name} does not contain {from:?}");
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(source.replace(from, to).as_bytes()).unwrap();
    file
}

fn paths(sample: &SampleGatingHierarchy) -> Vec<String> {
    sample.tree.iter().map(|(_, n)| n.path.to_string()).collect()
}

#[test]
fn single_sample_by_name() {
    let set = parse_workspace(fixture("vx.wsp"), &[], &strings(&["S1"]), true, 0, 0, 0).unwrap();

    assert_eq!(set.workspace_type(), WorkspaceType::FlowJoX);
    assert_eq!(set.version(), Some("20.0"));
    assert_eq!(set.len(), 1);

    let sample = set.get("1").unwrap();
    assert_eq!(sample.guid, "S1");
    assert_eq!(sample.keywords.get("$CYT").map(String::as_str), Some("LSRFortessa"));
    assert_eq!(
        paths(sample),
        strings(&[
            "/",
            "/Lymphocytes",
            "/Lymphocytes/CD3+",
            "/Lymphocytes/CD3-",
            "/Lymphocytes/not CD3+",
            "/Lymphocytes/Blast",
        ])
    );

    let tree = &sample.tree;
    assert_eq!(tree.get(tree.root()).unwrap().count, Some(10000));

    let cd3_neg = tree.get(tree.find_by_path("/Lymphocytes/CD3-").unwrap()).unwrap();
    let gate = cd3_neg.gate.as_ref().unwrap();
    assert_eq!(gate.kind, GateKind::Range);
    assert!(gate.negated);

    let not_node = tree.find_by_path("/Lymphocytes/not CD3+").unwrap();
    let cd3_pos = tree.find_by_path("/Lymphocytes/CD3+").unwrap();
    let not_gate = tree.get(not_node).unwrap().gate.as_ref().unwrap();
    assert_eq!(not_gate.operation, Some(BooleanOperation::Not));
    assert_eq!(not_gate.references[0].target, Some(cd3_pos));
    assert_eq!(tree.get_linkers(cd3_pos), vec![not_node]);

    let blast = tree.get(tree.find_by_path("/Lymphocytes/Blast").unwrap()).unwrap();
    assert!(matches!(
        blast.gate.as_ref().and_then(|g| g.geometry.as_ref()),
        Some(GateGeometry::Ellipsoid(_))
    ));

    let compensation = sample.compensation.as_ref().unwrap();
    assert_eq!(compensation.coefficient("FITC-A", "PE-A"), Some(0.21));
    assert!(matches!(
        set.transformation_for("1", "Comp-FITC-A"),
        Some(Transformation::Logicle { .. })
    ));
}

#[test]
fn missing_sample_id() {
    let err = parse_workspace(fixture("vx.wsp"), &strings(&["99"]), &[], true, 0, 0, 0).unwrap_err();
    assert!(matches!(err, WorkspaceError::SampleNotFound(_)));
}

#[test]
fn skip_missing_samples() {
    let options = ParseOptions::new()
        .sample_ids(strings(&["99", "2"]))
        .skip_missing_samples(true)
        .build()
        .unwrap();
    let set = parse_workspace_with(fixture("vx.wsp"), &options).unwrap();
    assert_eq!(set.sample_ids().collect::<Vec<_>>(), vec!["2"]);
}

#[test]
fn ambiguous_sample_name() {
    let err = parse_workspace(fixture("vx.wsp"), &[], &strings(&["S2"]), true, 0, 0, 0).unwrap_err();
    match err {
        WorkspaceError::AmbiguousSample { name, candidates } => {
            assert_eq!(name, "S2");
            assert_eq!(candidates, strings(&["2", "3"]));
        }
        other => panic!("expected AmbiguousSample, got {other}"),
    }
}

#[test]
fn name_location_sample_node() {
    let set = parse_workspace(fixture("vx.wsp"), &[], &strings(&["S2-rerun.fcs"]), true, 2, 0, 0).unwrap();
    assert_eq!(set.sample_ids().collect::<Vec<_>>(), vec!["3"]);
    assert_eq!(set.get("3").unwrap().guid, "S2-rerun.fcs");
}

#[test]
fn shared_names_get_disambiguated_guids() {
    let set = parse_workspace(fixture("vx.wsp"), &[], &[], true, 0, 0, 0).unwrap();
    let guids: Vec<&str> = set.iter().map(|s| s.guid.as_str()).collect();
    assert_eq!(guids, vec!["S1", "S2_2", "S2_3"]);
    assert_eq!(set.get_by_guid("S2_3").unwrap().id, "3");
}

#[test]
fn skeleton_has_same_shape() {
    let full = parse_workspace(fixture("vx.wsp"), &[], &[], true, 0, 0, 0).unwrap();
    let skeleton = parse_workspace(fixture("vx.wsp"), &[], &[], false, 0, 0, 0).unwrap();

    assert_eq!(full.len(), skeleton.len());
    for (a, b) in full.iter().zip(skeleton.iter()) {
        assert_eq!(paths(a), paths(b));
        let kinds = |s: &SampleGatingHierarchy| -> Vec<Option<GateKind>> {
            s.tree.iter().map(|(_, n)| n.gate.as_ref().map(|g| g.kind)).collect()
        };
        assert_eq!(kinds(a), kinds(b));
        assert!(b.tree.iter().all(|(_, n)| n.gate.as_ref().is_none_or(|g| g.geometry.is_none())));
    }
}

#[test]
fn unknown_workspace_type_code() {
    let err = parse_workspace(fixture("vx.wsp"), &[], &[], true, 0, 0, 9).unwrap_err();
    assert!(matches!(err, WorkspaceError::UnsupportedWorkspaceType(_)));
}

#[test]
fn unknown_name_location_code() {
    let err = parse_workspace(fixture("vx.wsp"), &[], &[], true, 3, 0, 0).unwrap_err();
    assert!(matches!(err, WorkspaceError::InvalidArgument(_)));
}

#[test]
fn explicit_type_matches_detection() {
    let detected = parse_workspace(fixture("vx.wsp"), &[], &[], true, 0, 0, 0).unwrap();
    let explicit = parse_workspace(fixture("vx.wsp"), &[], &[], true, 0, 0, 3).unwrap();
    assert_eq!(detected, explicit);
}

#[test]
fn parsing_is_deterministic() {
    let first = parse_workspace(fixture("vx.wsp"), &[], &[], true, 0, 0, 0).unwrap();
    let second = parse_workspace(fixture("vx.wsp"), &[], &[], true, 0, 0, 0).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn parallel_matches_sequential() {
    let sequential = parse_workspace_with(fixture("vx.wsp"), &ParseOptions::default()).unwrap();
    let parallel = parse_workspace_with(
        fixture("vx.wsp"),
        &ParseOptions::new().parallel(true).build().unwrap(),
    )
    .unwrap();
    assert_eq!(sequential, parallel);
}

#[test]
fn transformations_interned_once() {
    let set = parse_workspace(fixture("vx.wsp"), &[], &[], true, 0, 0, 0).unwrap();
    // One linear scale shared by FSC-A/SSC-A of two samples, plus "Tlog"
    assert_eq!(set.transformations().len(), 2);
    assert_eq!(
        set.get("1").unwrap().channel_transformations["FSC-A"],
        set.get("2").unwrap().channel_transformations["FSC-A"]
    );
    // Both samples bind "Tlog" to the same definition, stored once
    let tlog = &set.get("1").unwrap().transformation_ids["Tlog"];
    assert_eq!(tlog, &set.get("2").unwrap().transformation_ids["Tlog"]);
    assert!(set.transformations().contains(tlog));
}

/// Two vX samples, each declaring its own transformation `T1`.
fn per_sample_ids(second_width: &str, second_gate_ref: &str) -> String {
    let sample = |id: &str, width: &str, gate_ref: &str| {
        format!(
            r#"<Sample><DataSet sampleID="{id}"/><Keywords><Keyword name="$FIL" value="s{id}.fcs"/></Keywords>
<Transformations><transforms:logicle transforms:id="T1" transforms:T="262144" transforms:W="{width}" transforms:M="4.5" transforms:A="0"><data-type:parameter data-type:name="CD3"/></transforms:logicle></Transformations>
<SampleNode name="s{id}.fcs" sampleID="{id}"><Subpopulations><Population name="CD3+"><Gate><gating:RectangleGate>
<gating:dimension gating:min="1000" gating:transformation-ref="{gate_ref}"><data-type:fcs-dimension data-type:name="CD3"/></gating:dimension>
</gating:RectangleGate></Gate></Population></Subpopulations></SampleNode></Sample>"#
        )
    };
    format!(
        r#"<Workspace version="20.0"><SampleList>{}{}</SampleList></Workspace>"#,
        sample("1", "0.5", "T1"),
        sample("2", second_width, second_gate_ref)
    )
}

fn gating_set_for(xml: &str, ids: &[&str]) -> Result<GatingSet> {
    let workspace = Workspace::parse_str(xml, XmlParserOptions::empty(), None)?;
    workspace.gating_set(&ParseOptions::new().sample_ids(strings(ids)).build().unwrap())
}

#[test]
fn sample_transformation_ids_are_scoped_to_their_sample() {
    let xml = per_sample_ids("1", "T1");
    let alone_1 = gating_set_for(&xml, &["1"]).unwrap();
    let alone_2 = gating_set_for(&xml, &["2"]).unwrap();
    let both = gating_set_for(&xml, &["1", "2"]).unwrap();

    assert_eq!(both.transformations().len(), 2);
    for (alone, id) in [(&alone_1, "1"), (&alone_2, "2")] {
        assert_eq!(both.get(id).unwrap().tree, alone.get(id).unwrap().tree);
        assert_eq!(both.transformation_by_id(id, "T1"), alone.transformation_by_id(id, "T1"));
    }
    assert_ne!(both.transformation_by_id("1", "T1"), both.transformation_by_id("2", "T1"));
}

#[test]
fn gate_transformation_refs_resolve_within_their_sample() {
    // Sample 1 names "Tb", which only sample 2 declares
    let xml = per_sample_ids("0.5", "Tb").replacen(r#"transformation-ref="T1""#, r#"transformation-ref="Tb""#, 1);
    let at = xml.rfind(r#"transforms:id="T1""#).unwrap();
    let xml = format!("{}{}", &xml[..at], xml[at..].replacen("T1", "Tb", 1));

    assert!(gating_set_for(&xml, &["2"]).is_ok());
    for ids in [&["1"][..], &["1", "2"][..]] {
        match gating_set_for(&xml, ids).unwrap_err() {
            WorkspaceError::UnknownTransformation { sample, reference } => {
                assert_eq!(sample, "1");
                assert_eq!(reference, "Tb");
            }
            other => panic!("expected UnknownTransformation, got {other}"),
        }
    }
}

#[test]
fn quadrant_and_reference_gates() {
    let set = parse_workspace(fixture("vx.wsp"), &strings(&["2"]), &[], true, 0, 0, 0).unwrap();
    let tree = &set.get("2").unwrap().tree;

    let quad = tree.get(tree.find_by_path("/Lymphocytes/Quad").unwrap()).unwrap();
    assert_eq!(quad.gate.as_ref().unwrap().kind, GateKind::Quadrant);

    let lymph = tree.find_by_path("/Lymphocytes").unwrap();
    let copy = tree.find_by_path("/Lymphocytes/Lymph copy").unwrap();
    let copy_gate = tree.get(copy).unwrap().gate.as_ref().unwrap();
    assert_eq!(copy_gate.kind, GateKind::Reference);
    assert_eq!(copy_gate.references[0].target, Some(lymph));
}

#[test]
fn dangling_reference_fails_the_call() {
    let file = edited_fixture("vx.wsp", r#"<Dependent name="CD3+"/>"#, r#"<Dependent name="CD19+"/>"#);
    match parse_workspace(file.path(), &[], &[], true, 0, 0, 0).unwrap_err() {
        WorkspaceError::DanglingGateReference {
            sample,
            population,
            reference,
        } => {
            assert_eq!(sample, "1");
            assert_eq!(population, "/Lymphocytes/not CD3+");
            assert_eq!(reference, "CD19+");
        }
        other => panic!("expected DanglingGateReference, got {other}"),
    }

    // The skeleton never looks at references
    assert!(parse_workspace(file.path(), &[], &[], false, 0, 0, 0).is_ok());
}

#[test]
fn invalid_geometry_fails_the_call() {
    let file = edited_fixture(
        "vx.wsp",
        r#"<gating:distanceSquare data-type:value="1"/>"#,
        r#"<gating:distanceSquare data-type:value="0"/>"#,
    );
    match parse_workspace(file.path(), &[], &[], true, 0, 0, 0).unwrap_err() {
        WorkspaceError::InvalidGateGeometry { sample, population, .. } => {
            assert_eq!(sample, "1");
            assert_eq!(population, "/Lymphocytes/Blast");
        }
        other => panic!("expected InvalidGateGeometry, got {other}"),
    }
}

#[test]
fn unknown_transformation_reference() {
    let file = edited_fixture(
        "vx.wsp",
        r#"gating:min="1200" gating:transformation-ref="Tlog">"#,
        r#"gating:min="1200" gating:transformation-ref="Tmissing">"#,
    );
    let err = parse_workspace(file.path(), &[], &[], true, 0, 0, 0).unwrap_err();
    assert!(matches!(err, WorkspaceError::UnknownTransformation { ref reference, .. } if reference == "Tmissing"));
}

#[test]
fn noent_decides_unknown_entities() {
    let file = edited_fixture("vx.wsp", r#"value="LSRFortessa""#, r#"value="LSR &fortessa;""#);

    let err = parse_workspace(file.path(), &[], &[], true, 0, 0, 0).unwrap_err();
    assert!(matches!(err, WorkspaceError::MalformedDocument { .. }));

    let set = parse_workspace(file.path(), &[], &[], true, 0, XmlParserOptions::NOENT.bits() as i32, 0).unwrap();
    assert_eq!(
        set.get("1").unwrap().keywords.get("$CYT").map(String::as_str),
        Some("LSR &fortessa;")
    );
}

#[test]
fn recover_decides_mismatched_end_tags() {
    let file = edited_fixture(
        "vx.wsp",
        "<Keyword name=\"$TOT\" value=\"10000\"/>",
        "<Keyword name=\"$TOT\" value=\"10000\"></Keywrd>",
    );

    let err = parse_workspace(file.path(), &[], &[], true, 0, 0, 0).unwrap_err();
    assert!(matches!(err, WorkspaceError::MalformedDocument { .. }));

    let set = parse_workspace(file.path(), &[], &[], true, 0, XmlParserOptions::RECOVER.bits() as i32, 0).unwrap();
    assert_eq!(set.len(), 3);
}

#[test]
fn missing_file_is_malformed() {
    let err = parse_workspace(fixture("does-not-exist.wsp"), &[], &[], true, 0, 0, 0).unwrap_err();
    assert!(matches!(err, WorkspaceError::MalformedDocument { .. }));
}

#[test]
fn group_selects_members() {
    let options = ParseOptions::new().group("Stained").build().unwrap();
    let set = parse_workspace_with(fixture("vx.wsp"), &options).unwrap();
    assert_eq!(set.sample_ids().collect::<Vec<_>>(), vec!["2", "3"]);
    assert_eq!(set.groups().len(), 2);

    let options = ParseOptions::new().group("Nope").build().unwrap();
    let err = parse_workspace_with(fixture("vx.wsp"), &options).unwrap_err();
    assert!(matches!(err, WorkspaceError::InvalidArgument(_)));
}

#[test]
fn windows_workspace() {
    let set = parse_workspace(fixture("win.wsp"), &[], &[], true, 0, 0, 0).unwrap();
    assert_eq!(set.workspace_type(), WorkspaceType::Windows);

    let sample = set.get("11").unwrap();
    assert_eq!(sample.guid, "tube_01.fcs");
    assert_eq!(sample.compensation, None);

    let tree = &sample.tree;
    let apc = tree.find_by_path("/Cells/APC+").unwrap();
    let pe = tree.find_by_path("/Cells/PE+").unwrap();
    let both = tree.find_by_path("/Cells/double positive").unwrap();
    let and_gate = tree.get(both).unwrap().gate.as_ref().unwrap();
    assert_eq!(and_gate.operation, Some(BooleanOperation::And));
    let targets: Vec<_> = and_gate.references.iter().map(|r| r.target).collect();
    assert_eq!(targets, vec![Some(apc), Some(pe)]);

    assert_eq!(
        set.transformation_for("11", "APC-A").map(Transformation::kind),
        Some(TransformationKind::Biex)
    );
    assert_eq!(
        set.transformation_for("11", "PE-A").map(Transformation::kind),
        Some(TransformationKind::Log)
    );
}

#[test]
fn mac_workspace() {
    let set = parse_workspace(fixture("mac.wsp"), &[], &[], true, 0, 0, 0).unwrap();
    assert_eq!(set.workspace_type(), WorkspaceType::MacLegacy);

    let sample = set.get("7").unwrap();
    assert_eq!(sample.guid, "control.fcs");
    assert_eq!(
        paths(sample),
        strings(&["/", "/Lymphs", "/Lymphs/FL1+", "/Lymphs/Blob"])
    );

    let compensation = sample.compensation.as_ref().unwrap();
    assert_eq!(compensation.compensated_name("FL1-H").as_deref(), Some("<FL1-H>"));

    let tree = &sample.tree;
    let fl1 = tree.get(tree.find_by_path("/Lymphs/FL1+").unwrap()).unwrap();
    let Some(GateGeometry::Range(range)) = fl1.gate.as_ref().and_then(|g| g.geometry.as_ref()) else {
        panic!("expected a range gate");
    };
    assert_eq!(range.bounds("<FL1-H>"), Some((Some(100.0), Some(10000.0))));

    let blob = tree.get(tree.find_by_path("/Lymphs/Blob").unwrap()).unwrap();
    let Some(GateGeometry::Ellipsoid(ellipse)) = blob.gate.as_ref().and_then(|g| g.geometry.as_ref()) else {
        panic!("expected an ellipse gate");
    };
    assert_eq!(ellipse.center().unwrap(), (400.0, 200.0));
}

#[test]
fn mac_group_and_workspace_handle() {
    let workspace = Workspace::open(fixture("mac.wsp"), XmlParserOptions::empty(), None).unwrap();
    assert_eq!(workspace.workspace_type(), WorkspaceType::MacLegacy);
    assert_eq!(workspace.groups()["Controls"], strings(&["7"]));

    let samples = workspace.samples(Some(SampleNameLocation::SampleNode)).unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].name, "control");
}

#[test]
fn handle_keeps_the_settings_it_was_opened_with() {
    let workspace = Workspace::open(fixture("vx.wsp"), XmlParserOptions::NOBLANKS, None).unwrap();
    assert_eq!(workspace.document().options(), XmlParserOptions::NOBLANKS);

    let conflicting = ParseOptions::new()
        .xml_options(XmlParserOptions::RECOVER)
        .workspace_type(WorkspaceType::MacLegacy)
        .build()
        .unwrap();
    let set = workspace.gating_set(&conflicting).unwrap();
    assert_eq!(set.workspace_type(), WorkspaceType::FlowJoX);
    assert_eq!(set, workspace.gating_set(&ParseOptions::default()).unwrap());
}
