use caraway_lang::{compile, diag, Environment, Error, Expr, ParseMode, Parser};

fn parse(query: &str) -> Expr {
    let env = Environment::new();
    compile(&env, query).unwrap()
}

fn parse_err(query: &str) -> Error {
    let env = Environment::new();
    compile(&env, query).expect_err("expected parse failure")
}

/// Flattened dump with single spaces, convenient for shape assertions.
fn shape(query: &str) -> String {
    parse(query)
        .dump()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[test]
fn literals_fold_to_constants() {
    assert_eq!(shape("42"), "Const 42");
    assert_eq!(shape("1.5"), "Const 1.5");
    assert_eq!(shape("'hi'"), "Const \"hi\"");
    assert_eq!(shape("true"), "Const true");
    assert_eq!(shape("null"), "Const null");
    assert_eq!(shape("1 + 2 * 3"), "Const 7");
    assert_eq!(shape("-5"), "Const -5");
}

#[test]
fn constant_sequences_fold_to_multiconst() {
    assert_eq!(shape("range(1,3)..."), "MultiConst [1, 2, 3]");
    assert_eq!(shape("arr(1, 'x')"), "MultiConst [1, \"x\"]");
}

#[test]
fn fields_and_paths() {
    assert_eq!(shape("name"), "Field name");
    assert_eq!(shape("a.b"), "Path . Field a Field b");
    assert_eq!(shape("a.b.c"), "Path . Path . Field a Field b Field c");
    assert_eq!(shape("sub.*"), "Path . Field sub AnyChild *");
    assert_eq!(shape("**.a"), "Path . Wildcard ** Field a");
}

#[test]
fn product_binds_tighter_than_term() {
    assert_eq!(
        shape("a + b * c"),
        "Binary + Field a Binary * Field b Field c"
    );
}

#[test]
fn comparison_binds_tighter_than_logic() {
    assert_eq!(
        shape("a < b and c"),
        "And Binary < Field a Field b Field c"
    );
    assert_eq!(
        shape("a and b or c"),
        "Or And Field a Field b Field c"
    );
}

#[test]
fn path_binds_tighter_than_arithmetic() {
    assert_eq!(
        shape("a.b + c.d"),
        "Binary + Path . Field a Field b Path . Field c Field d"
    );
}

#[test]
fn subscripts_and_subselects() {
    assert_eq!(shape("a[0]"), "Subscript [] Field a Const 0");
    assert_eq!(shape("a{b}"), "SubExpr {} Field a Field b");
    assert_eq!(
        shape("[0]"),
        "Subscript [] This _ Const 0"
    );
    assert_eq!(shape("{a}"), "SubExpr {} This _ Field a");
}

#[test]
fn postfix_operators() {
    assert_eq!(shape("a?"), "Unary ? Field a");
    assert_eq!(shape("a exists"), "Exists Field a");
    assert_eq!(shape("a..."), "Unpack ... Field a");
    assert_eq!(shape("a as int"), "Cast as int Field a");
    assert_eq!(shape("a as null"), "Cast as null Field a");
}

#[test]
fn unary_operators() {
    assert_eq!(shape("-a"), "Unary - Field a");
    assert_eq!(shape("~a"), "Unary ~ Field a");
    assert_eq!(shape("not a"), "Unary not Field a");
    assert_eq!(shape("#a"), "Unary # Field a");
    assert_eq!(shape("typeof a"), "Unary typeof Field a");
}

#[test]
fn unary_binds_looser_than_path() {
    assert_eq!(shape("-a.b"), "Unary - Path . Field a Field b");
    assert_eq!(shape("#a.b"), "Unary # Path . Field a Field b");
}

#[test]
fn word_operator_prefers_infix() {
    assert_eq!(
        shape("a within b"),
        "WordBinary within Field a Field b"
    );
    // The right-hand side binds paths before the word resolves.
    assert_eq!(
        shape("a within b.c"),
        "WordBinary within Field a Path . Field b Field c"
    );
}

#[test]
fn word_operator_falls_back_to_postfix() {
    assert_eq!(shape("a within"), "WordUnary within Field a");
    assert_eq!(
        shape("a within and b"),
        "And WordUnary within Field a Field b"
    );
}

#[test]
fn calls_cache_their_function() {
    match parse("count(a, b)") {
        Expr::Call { name, args, .. } => {
            assert_eq!(name, "count");
            assert_eq!(args.len(), 2);
        }
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn unknown_function_fails_at_compile_time() {
    assert!(matches!(parse_err("bogus(1)"), Error::UnknownFunction(_)));
}

#[test]
fn trailing_input_is_expected_eof() {
    assert!(matches!(parse_err("1 2"), Error::ExpectedEof { .. }));
}

#[test]
fn unbalanced_groups_fail() {
    assert!(matches!(parse_err("(a"), Error::Parser { .. }));
    assert!(matches!(parse_err("a["), Error::Parser { .. }));
    assert!(matches!(parse_err("a{b"), Error::Parser { .. }));
}

#[test]
fn compile_phase_warnings() {
    let env = Environment::new();
    compile(&env, "1 == 1").unwrap();
    let warnings = env.take_warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("true"), "{:?}", warnings);

    compile(&env, "1 + null").unwrap();
    let warnings = env.take_warnings();
    assert!(
        warnings[0].message.contains("null"),
        "expected always-null warning, got {:?}",
        warnings
    );
}

#[test]
fn non_constant_expressions_do_not_warn() {
    let env = Environment::new();
    compile(&env, "a == 1").unwrap();
    assert!(env.take_warnings().is_empty());
}

#[test]
fn division_by_zero_surfaces_during_folding() {
    assert!(matches!(parse_err("1 / 0"), Error::DivisionByZero));
}

#[test]
fn relaxed_mode_recovers_at_end_of_input() {
    let env = Environment::new();
    let mut parser = Parser::with_mode(&env, "a.", ParseMode::Relaxed).unwrap();
    let expr = parser.parse().unwrap();
    // The missing right-hand side becomes an empty field hole.
    assert!(expr.dump().contains("Path"));

    let mut parser = Parser::with_mode(&env, "(a", ParseMode::Relaxed).unwrap();
    assert!(parser.parse().is_ok());
}

#[test]
fn strict_mode_rejects_what_relaxed_recovers() {
    let env = Environment::new();
    assert!(matches!(compile(&env, "a."), Err(Error::Parser { .. })));
}

#[test]
fn completion_anchors_on_the_caret_field() {
    let env = Environment::new();
    env.strings().insert("number").unwrap();
    env.strings().insert("name").unwrap();
    env.strings().insert("nested").unwrap();
    env.strings().insert("other").unwrap();

    let out = diag::complete(&env, "na", 2);
    assert_eq!(out, vec!["name".to_string()]);

    let out = diag::complete(&env, "n", 1);
    assert_eq!(out, vec!["name", "nested", "number"]);

    // Case-insensitive prefix match.
    let out = diag::complete(&env, "NUM", 3);
    assert_eq!(out, vec!["number"]);
}

#[test]
fn completion_after_a_path_dot() {
    let env = Environment::new();
    env.strings().insert("alpha").unwrap();
    let out = diag::complete(&env, "sub.", 4);
    // The hole after the dot matches everything.
    assert!(out.contains(&"alpha".to_string()));
}

#[test]
fn spans_cover_their_source() {
    let expr = parse("abc + de");
    let span = expr.span();
    assert_eq!(span.start, 0);
    assert_eq!(span.end, 8);
}
