use crate::analysis::*;
use crate::il;
use crate::vcfg::*;
use crate::{parse, Error};

mod scenarios;

fn secret_policy() -> Policy {
    Policy::new().cell("secret", SecurityPoint::High)
}

#[test]
fn parse_build_and_render() {
    let source = "\
// bounds check
    beqz ok, Out
    load v, a + i
    load w, b + v   // dependent load
Out:
    skip
";
    let program = parse(source).unwrap();
    assert_eq!(program.len(), 4);
    assert_eq!(program.label_pc("Out"), Some(3));
    assert_eq!(
        program.registers().into_iter().collect::<Vec<String>>(),
        vec!["a", "b", "i", "ok", "v", "w"]
    );
    assert!(program.to_string().contains("    load v, a + i\n"));

    let graph = build_vcfg(&program, &BuildOptions::default()).unwrap();
    assert_eq!(graph.node("n1").unwrap().instruction(), Some("load v, a + i"));
    assert!(graph.node("n3").unwrap().label() == Some("Out"));
    assert!(graph.dot_graph().contains("spec-begin 0"));
}

#[test]
fn bounds_check_bypass() {
    let source = "\
    beqz ok, Out
    load v, a + i
    load w, b + v
Out:
    skip
";
    // The first load is fine when committed, and leaks when the bounds check
    // is mispredicted.
    let options = AnalyzeOptionsBuilder::new()
        .policy(Policy::new().cell("a + i", SecurityPoint::High))
        .build();
    let result = analyze_source(source, &BuildOptions::default(), &options);
    assert_eq!(result.verdict(), Verdict::SniViolation);
    let violation = result.violation().unwrap();
    assert_eq!(violation.node_id(), "n1");
    assert_eq!(violation.execution_mode(), ExecutionMode::Speculative);
    assert_eq!(violation.description(), Some("load v, a + i"));
    assert!(result
        .steps()
        .iter()
        .any(|step| step.node_id() == "n1" && step.execution_mode() == ExecutionMode::NS));
}

#[test]
fn committed_flows_are_not_violations() {
    let source = "\
    load v, secret
    beqz v, Out
    store v, pub
Out:
    skip
";
    let result = analyze_source(
        source,
        &BuildOptions::default(),
        &AnalyzeOptionsBuilder::new().policy(secret_policy()).build(),
    );
    assert!(result.is_secure());
    assert!(result
        .steps()
        .iter()
        .any(|step| step.execution_mode() == ExecutionMode::Speculative));
}

#[test]
fn meta_mode_agrees_with_light_mode() {
    let sources = [
        "beqz c, End\nload x, secret\nEnd: skip",
        "beqz c, End\nspbarr\nload x, secret\nEnd: skip",
        "load x, secret\nbeqz c, End\nload y, secret\nEnd: skip",
        "beqz c, End\nx <- 1\nEnd: skip",
    ];
    for source in sources.iter() {
        for speculation_mode in [SpeculationMode::Discard, SpeculationMode::StackGuard] {
            let verdict = |mode| {
                let build_options = BuildOptionsBuilder::new()
                    .mode(mode)
                    .speculation_mode(speculation_mode)
                    .build();
                let options = AnalyzeOptionsBuilder::new()
                    .policy(secret_policy())
                    .speculation_mode(speculation_mode)
                    .build();
                let result = analyze_source(source, &build_options, &options);
                assert!(result.error().is_none(), "{}", source);
                result.verdict()
            };
            assert_eq!(verdict(BuildMode::Light), verdict(BuildMode::Meta), "{}", source);
        }
    }
}

#[test]
fn nested_speculation_under_stack_guard() {
    let source = "\
    beqz a, Out
    beqz b, Out
    load x, secret
Out:
    skip
";
    let build_options = BuildOptionsBuilder::new()
        .speculation_mode(SpeculationMode::StackGuard)
        .build();
    let options = AnalyzeOptionsBuilder::new()
        .policy(secret_policy())
        .speculation_mode(SpeculationMode::StackGuard)
        .trace_mode(TraceMode::SinglePath)
        .build();
    let result = analyze_source(source, &build_options, &options);
    assert!(result.error().is_none());
    assert_eq!(result.verdict(), Verdict::SniViolation);
}

#[test]
fn graphs_from_json_can_be_analyzed() {
    let json = r#"{
        "nodes": [
            {"id": "n0", "pc": 0, "kind": "ns", "instruction": "load x, secret"},
            {"id": "n1", "pc": 1, "kind": "ns", "instruction": "skip"}
        ],
        "edges": [{"source": "n0", "target": "n1", "kind": "ns"}]
    }"#;
    let graph: StaticGraph = serde_json::from_str(json).unwrap();
    let result = analyze(&graph, &AnalyzeOptionsBuilder::new().policy(secret_policy()).build());
    assert!(result.is_secure());
    assert_eq!(result.steps().len(), 2);
    assert_eq!(
        result.steps()[0].state().obs_mem()["0:secret"],
        LatticeValue::EqHigh
    );
}

#[test]
fn unparseable_node_text_is_an_analysis_error() {
    let mut graph = StaticGraph::new();
    graph
        .insert_node(GraphNode::new("n0", 0, NodeKind::Ns).with_instruction_text("skip"))
        .unwrap();
    graph
        .insert_node(GraphNode::new("n1", 1, NodeKind::Ns).with_instruction_text("fence all"))
        .unwrap();
    graph
        .insert_edge(GraphEdge::new("n0", "n1", EdgeKind::Ns))
        .unwrap();

    let result = analyze(&graph, &AnalyzeOptions::default());
    let error = result.error().unwrap();
    assert_eq!(error.error_type(), crate::ErrorType::AnalysisError);
    assert_eq!(error.detail().unwrap()["nodeId"], "n1");
    assert_eq!(result.steps().len(), 1);
}

#[test]
fn instructions_render_back_to_source() {
    let instruction = il::Instruction::cmov(
        "x",
        il::expr_reg("c"),
        il::Expression::mul(il::expr_reg("y"), il::expr_const(2)),
    );
    let text = instruction.to_string();
    assert_eq!(text, "x <- y * 2 ? c");
    assert_eq!(crate::parser::parse_instruction(&text).unwrap(), instruction);
    assert!(matches!(
        crate::parser::parse_instruction("x <-"),
        Err(Error::Parse(_))
    ));
}
