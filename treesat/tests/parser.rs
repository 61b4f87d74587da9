use std::path::Path;
use treesat::error::ParseError;
use treesat::parser::{build_decomposition, build_formula};
use treesat::{BagKind, ErrorKind, LiteralWeights};

#[test]
fn formula_from_file() {
    let formula = build_formula(Some(Path::new("./tests/data/chain.cnf"))).unwrap();
    assert_eq!(formula.num_variables, 3);
    assert_eq!(formula.clauses.len(), 4);
    assert_eq!(formula.clauses[2], vec![2, -3]);
    assert!(!formula.is_weighted());

    let formula = build_formula(Some(Path::new("./tests/data/independent.cnf"))).unwrap();
    assert!(formula.is_weighted());
    let weights = formula.weights_of(2);
    assert!((weights.positive - 0.6).abs() < 1e-12);
    assert!((weights.negative - 0.4).abs() < 1e-12);
    assert_ne!(formula.weights_of(1), LiteralWeights::default());
}

#[test]
fn decomposition_from_file() {
    let decomposition = build_decomposition(Path::new("./tests/data/chain.td"), None).unwrap();
    assert_eq!(decomposition.len(), 3);
    assert_eq!(decomposition.width(), 3);

    let root = &decomposition[decomposition.root];
    assert_eq!(root.label, 1);
    assert_eq!(root.variables, vec![1, 2]);
    assert_eq!(root.kind(), BagKind::IntroduceForget);

    // both leaves get an adapter with the scope of the join
    let decomposition = build_decomposition(Path::new("./tests/data/join.td"), None).unwrap();
    assert_eq!(decomposition.len(), 5);
    let root = &decomposition[decomposition.root];
    assert_eq!(root.kind(), BagKind::Join);
    for &child in &root.children {
        assert_eq!(decomposition[child].variables, root.variables);
    }
}

#[test]
fn errors_name_the_line() {
    assert_eq!(
        build_formula(Some(Path::new("./tests/data/broken.cnf"))),
        Err(ErrorKind::Parse(ParseError::Line(3)))
    );

    match build_decomposition(Path::new("./tests/data/missing.td"), None) {
        Err(ErrorKind::Parse(ParseError::Io(message))) => {
            assert!(message.starts_with("./tests/data/missing.td"))
        }
        other => panic!("expected an io error, got {other:?}"),
    }
}
