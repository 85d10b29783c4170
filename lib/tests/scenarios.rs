use crate::analysis::*;
use crate::vcfg::*;
use crate::ErrorType;

const SPECTRE: &str = "beqz c, End\nload x, secret\nEnd: skip";

fn stack_guard() -> (BuildOptions, AnalyzeOptionsBuilder) {
    let build_options = BuildOptionsBuilder::new()
        .speculation_mode(SpeculationMode::StackGuard)
        .build();
    let options = AnalyzeOptionsBuilder::new()
        .speculation_mode(SpeculationMode::StackGuard)
        .trace_mode(TraceMode::SinglePath);
    (build_options, options)
}

#[test]
fn straight_line_is_secure() {
    let result = analyze_source("skip\nskip", &BuildOptions::default(), &AnalyzeOptions::default());
    assert_eq!(result.verdict(), Verdict::Secure);
    assert!(result.error().is_none());

    let graph = result.graph();
    assert!(graph.nodes().iter().all(|node| node.kind() == NodeKind::Ns));
    let edges: Vec<(&str, &str, EdgeKind)> = graph
        .edges()
        .iter()
        .map(|edge| (edge.source(), edge.target(), edge.kind()))
        .collect();
    assert_eq!(edges, vec![("n0", "n1", EdgeKind::Ns)]);
}

#[test]
fn speculative_secret_load_discarded() {
    let options = AnalyzeOptionsBuilder::new()
        .policy(super::secret_policy())
        .speculation_mode(SpeculationMode::Discard)
        .trace_mode(TraceMode::Bfs)
        .build();
    let result = analyze_source(SPECTRE, &BuildOptions::default(), &options);

    assert_eq!(result.verdict(), Verdict::SniViolation);
    let violation = result.violation().unwrap();
    assert_eq!(violation.execution_mode(), ExecutionMode::Speculative);
    assert_eq!(violation.node_id(), "n1");
    assert_eq!(result.steps().last(), Some(violation));
}

#[test]
fn speculative_secret_load_rolled_back() {
    let (build_options, options) = stack_guard();
    let options = options.policy(super::secret_policy()).build();
    let result = analyze_source(SPECTRE, &build_options, &options);

    assert_eq!(result.verdict(), Verdict::SniViolation);
    assert!(result.steps().iter().any(|step| {
        step.node_id() == "n0" && step.execution_mode() == ExecutionMode::NS && step.step_id() > 0
    }));
}

#[test]
fn rolled_back_registers_are_not_visible() {
    let (build_options, options) = stack_guard();
    let options = options
        .policy(Policy::new().reg("h", SecurityPoint::High))
        .build();
    let result = analyze_source("beqz c, End\nx <- h\nEnd: skip", &build_options, &options);

    assert_eq!(result.verdict(), Verdict::Secure);
    assert!(result.error().is_none());

    // x is only ever written speculatively.
    assert!(result.steps().iter().any(|step| {
        step.execution_mode() == ExecutionMode::Speculative && step.state().reg("x").sp() == SecurityPoint::High
    }));

    let returns: Vec<&TraceStep> = result
        .steps()
        .iter()
        .filter(|step| step.node_id() == "n0" && step.step_id() > 0)
        .collect();
    assert!(!returns.is_empty());
    for step in returns {
        assert_eq!(step.execution_mode(), ExecutionMode::NS);
        assert_eq!(step.state().reg("x"), RelValue::low());
        assert_eq!(step.state().reg("x").rel(), LatticeValue::EqLow);
        assert_eq!(step.state().obs_ctrl()["0"], LatticeValue::EqLow);
    }
}

#[test]
fn zero_window_size() {
    let build_options = BuildOptionsBuilder::new().window_size(0).build();
    let error = build_vcfg_from_source("skip", &build_options).unwrap_err();
    assert!(error.to_string().contains("windowSize"));

    let result = analyze_source("skip", &build_options, &AnalyzeOptions::default());
    let error = result.error().unwrap();
    assert_eq!(error.error_type(), ErrorType::AnalysisError);
    assert!(error.message().contains("windowSize"));
    assert_eq!(error.detail().unwrap()["windowSize"], 0);
}

#[test]
fn unresolvable_jump() {
    let error = build_vcfg_from_source("jmp r1", &BuildOptions::default()).unwrap_err();
    assert_eq!(error.error_type(), ErrorType::ParseError);

    let result = analyze_source("x <- 4\njmp x", &BuildOptions::default(), &AnalyzeOptions::default());
    assert_eq!(result.error().unwrap().error_type(), ErrorType::ParseError);
    assert!(result.steps().is_empty());
}

#[test]
fn iteration_cap_on_a_cycle() {
    let options = AnalyzeOptionsBuilder::new().iteration_cap(1).build();
    let result = analyze_source("L: skip\njmp L", &BuildOptions::default(), &options);

    let error = result.error().unwrap();
    assert_eq!(error.error_type(), ErrorType::AnalysisError);
    assert_eq!(error.detail().unwrap()["iterationCap"], 1);
    assert!(!result.steps().is_empty());
}

#[test]
fn cycles_reach_a_fixpoint() {
    let result = analyze_source("L: skip\njmp L", &BuildOptions::default(), &AnalyzeOptions::default());
    assert!(result.is_secure());
    assert!(result.steps().len() < 10);
}

#[test]
fn analysis_is_deterministic() {
    let sources = [SPECTRE, "L: beqz c, L\nload x, secret\njmp L"];
    for source in sources.iter() {
        for trace_mode in [TraceMode::Bfs, TraceMode::SinglePath] {
            let graph = build_vcfg_from_source(source, &BuildOptions::default()).unwrap();
            let options = AnalyzeOptionsBuilder::new()
                .policy(super::secret_policy())
                .trace_mode(trace_mode)
                .build();
            assert_eq!(analyze(&graph, &options), analyze(&graph, &options));
        }
    }
}

#[test]
fn trace_mode_does_not_change_the_verdict() {
    let sources = [
        SPECTRE,
        "beqz c, End\nspbarr\nload x, secret\nEnd: skip",
        "L: x <- x + 1\nbeqz x, L\nstore x, p",
    ];
    for source in sources.iter() {
        let verdict = |trace_mode| {
            let options = AnalyzeOptionsBuilder::new()
                .policy(super::secret_policy())
                .trace_mode(trace_mode)
                .build();
            analyze_source(source, &BuildOptions::default(), &options).verdict()
        };
        assert_eq!(verdict(TraceMode::Bfs), verdict(TraceMode::SinglePath), "{}", source);
    }
}

#[test]
fn to_cfg_leaves_the_graph_alone() {
    let graph = build_vcfg_from_source(
        SPECTRE,
        &BuildOptionsBuilder::new().mode(BuildMode::Meta).build(),
    )
    .unwrap();
    let before = graph.clone();
    let cfg = to_cfg(&graph).unwrap();

    assert_eq!(graph, before);
    assert_eq!(cfg.num_nodes(), 3);
    assert_eq!(to_cfg(&cfg).unwrap(), cfg);
}
