use std::sync::Arc;

use caraway_lang::arena::{FixedArena, GrowableArena};
use caraway_lang::model::{COL_BOOL, COL_I16, COL_U16};
use caraway_lang::{
    compile, evaluate_root, parse_document, value_to_json, Environment, ModelPool, Node, NodeAddr,
    StringPool,
};
use serde_json::json;

const DOC: &str = r#"{
    "number": 123,
    "string": "text",
    "a": 1,
    "b": 2,
    "c": ["a", "b", "c"],
    "d": [0, 1, 2],
    "sub": {"a": "sub a", "b": "sub b", "sub": {"a": "sub sub a", "b": "sub sub b"}}
}"#;

#[test]
fn interner_round_trip_and_case_folding() {
    let strings = StringPool::new();
    let h = strings.insert("Number").unwrap();
    assert_eq!(strings.insert("number").unwrap(), h);
    assert_eq!(strings.insert("NUMBER").unwrap(), h);
    assert_eq!(strings.resolve(h).as_deref(), Some("Number"));

    // lookup never allocates: repeated lookups keep missing
    assert_eq!(strings.lookup("unseen-key"), 0);
    let misses_before = strings.stats().misses;
    assert_eq!(strings.lookup("unseen-key"), 0);
    assert!(strings.stats().misses > misses_before);
}

#[test]
fn small_scalar_addresses_round_trip_bits() {
    for v in [0i64, 1, 7, 255, 65535] {
        let mut pool = ModelPool::new();
        let addr = pool.add_int(v).unwrap();
        assert_eq!(addr.column(), COL_U16);
        match pool.resolve(addr) {
            Node::Int(out) => assert_eq!(out, v),
            other => panic!("expected int, got {:?}", other),
        }
        assert_eq!(NodeAddr::from_raw(addr.raw()), addr);
    }
    for v in [-1i64, -7, -32768] {
        let mut pool = ModelPool::new();
        let addr = pool.add_int(v).unwrap();
        assert_eq!(addr.column(), COL_I16);
        match pool.resolve(addr) {
            Node::Int(out) => assert_eq!(out, v),
            other => panic!("expected int, got {:?}", other),
        }
    }
    for b in [true, false] {
        let addr = NodeAddr::from_bool(b);
        assert_eq!(addr.column(), COL_BOOL);
        let pool = ModelPool::new();
        match pool.resolve(addr) {
            Node::Bool(out) => assert_eq!(out, b),
            other => panic!("expected bool, got {:?}", other),
        }
    }
}

#[test]
fn growable_arena_laws() {
    let mut arena: GrowableArena<u64> = GrowableArena::new();
    let a = arena.new_array().unwrap();

    for i in 0..1000u64 {
        arena.push_back(a, i * i);
        // push_back then at(size-1) sees the pushed element
        assert_eq!(arena.at(a, arena.size(a) - 1), Some(&(i * i)));
    }

    // iteration order equals insertion order
    let mut seen = Vec::new();
    arena.iterate(a, |v| {
        seen.push(*v);
        true
    });
    let expected: Vec<u64> = (0..1000).map(|i| i * i).collect();
    assert_eq!(seen, expected);

    arena.clear();
    assert_eq!(arena.size(a), 0);
}

#[test]
fn fixed_arena_bounds() {
    let mut arena: FixedArena<u32, 24, 8> = FixedArena::new();
    let run = arena.alloc(4).unwrap();
    for i in 0..4 {
        arena.set(run, i, i + 10);
    }
    assert_eq!(arena.at(run, 3), Some(&13));
    assert_eq!(arena.at(run, 4), None);
    assert!(arena.alloc(1 << 8).is_err());
}

#[test]
fn pool_serialization_preserves_documents_and_keys() {
    let env = Environment::new();
    let mut pool = ModelPool::with_strings(env.strings().clone());
    parse_document(&mut pool, DOC).unwrap();

    let mut buf = Vec::new();
    pool.write(&mut buf).unwrap();

    // Rebuild against a fresh interner.
    let strings = Arc::new(StringPool::new());
    let restored = ModelPool::read(strings.clone(), &mut buf.as_slice()).unwrap();
    assert_eq!(restored.roots().len(), pool.roots().len());

    // Identical scalar values and key strings, checked through queries.
    let env2 = Environment::with_strings(strings);
    for query in ["number", "string", "sub.sub.a", "c[2]", "keys(sub)"] {
        let e1 = compile(&env, query).unwrap();
        let e2 = compile(&env2, query).unwrap();
        let v1: Vec<_> = evaluate_root(&env, &e1, &pool, 0)
            .unwrap()
            .iter()
            .map(value_to_json)
            .collect();
        let v2: Vec<_> = evaluate_root(&env2, &e2, &restored, 0)
            .unwrap()
            .iter()
            .map(value_to_json)
            .collect();
        assert_eq!(v1, v2, "query '{}' diverged after round-trip", query);
    }
}

#[test]
fn pools_can_share_one_interner() {
    let env = Environment::new();
    let mut first = ModelPool::with_strings(env.strings().clone());
    let mut second = ModelPool::with_strings(env.strings().clone());
    parse_document(&mut first, r#"{"shared": 1}"#).unwrap();
    parse_document(&mut second, r#"{"shared": 2}"#).unwrap();

    // Same handle on both pools, so a compiled expression's cached
    // handle is valid across them.
    let expr = compile(&env, "shared").unwrap();
    let v1: Vec<_> = evaluate_root(&env, &expr, &first, 0)
        .unwrap()
        .iter()
        .map(value_to_json)
        .collect();
    let v2: Vec<_> = evaluate_root(&env, &expr, &second, 0)
        .unwrap()
        .iter()
        .map(value_to_json)
        .collect();
    assert_eq!(v1, vec![json!(1)]);
    assert_eq!(v2, vec![json!(2)]);
}

#[test]
fn multiple_roots_in_one_pool() {
    let env = Environment::new();
    let mut pool = ModelPool::with_strings(env.strings().clone());
    parse_document(&mut pool, r#"{"v": 1}"#).unwrap();
    parse_document(&mut pool, r#"{"v": 2}"#).unwrap();

    let expr = compile(&env, "v").unwrap();
    let first: Vec<_> = evaluate_root(&env, &expr, &pool, 0)
        .unwrap()
        .iter()
        .map(value_to_json)
        .collect();
    let second: Vec<_> = evaluate_root(&env, &expr, &pool, 1)
        .unwrap()
        .iter()
        .map(value_to_json)
        .collect();
    assert_eq!(first, vec![json!(1)]);
    assert_eq!(second, vec![json!(2)]);
}

#[test]
fn field_hits_feed_diagnostics() {
    let env = Environment::new();
    let mut pool = ModelPool::with_strings(env.strings().clone());
    parse_document(&mut pool, DOC).unwrap();

    let expr = compile(&env, "sub.a").unwrap();
    evaluate_root(&env, &expr, &pool, 0).unwrap();
    evaluate_root(&env, &expr, &pool, 0).unwrap();

    let hits = caraway_lang::diag::field_hits(&expr);
    assert_eq!(hits.get("sub"), Some(&2));
    assert_eq!(hits.get("a"), Some(&2));

    let diagnostics = caraway_lang::diag::Diagnostics::new();
    diagnostics.aggregate(&expr);
    assert_eq!(diagnostics.hits().get("sub"), Some(&2));
}

#[test]
fn comparator_flags_record_operand_types() {
    let env = Environment::new();
    let mut pool = ModelPool::with_strings(env.strings().clone());
    parse_document(&mut pool, DOC).unwrap();

    let expr = compile(&env, "number > 100").unwrap();
    evaluate_root(&env, &expr, &pool, 0).unwrap();

    let flags = caraway_lang::diag::comparator_flags(&expr);
    assert_eq!(flags.len(), 1);
    let names = caraway_lang::diag::type_bit_names(flags[0].1);
    assert!(names.contains(&"int"), "{:?}", names);
}
