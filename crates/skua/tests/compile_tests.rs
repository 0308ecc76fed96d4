//! Compiler-level properties: constant-pool deduplication, disassembly and
//! the lexer/parser round trip on a curated corpus.

use pretty_assertions::assert_eq;
use skua::Runner;

#[test]
fn constant_pool_deduplicates_repeated_literals() {
    let runner = Runner::new("const a = 'dup'; const b = 'dup'; const c = 'dup'; a + b + c", "t.js").unwrap();
    let occurrences = runner
        .program()
        .constants
        .iter()
        .filter(|c| c.as_str() == "dup")
        .count();
    assert_eq!(occurrences, 1);
}

#[test]
fn disassembly_names_opcodes_and_constants() {
    let runner = Runner::new("let greeting = 'hi';", "t.js").unwrap();
    let listing = runner.disassemble();
    assert!(listing.contains("PUSH_SCOPE"), "{listing}");
    assert!(listing.contains("LOAD_CONST"), "{listing}");
    assert!(listing.contains("\"hi\""), "{listing}");
    assert!(listing.contains("RET"), "{listing}");
}

#[test]
fn source_positions_are_recorded_at_call_sites() {
    let runner = Runner::new("function f(){ return 1; }\nf();", "t.js").unwrap();
    let has_line_two = runner.program().source_map.values().any(|p| p.line == 1);
    assert!(has_line_two, "expected a source-map entry on line 2");
}

/// Parsing then re-reading each token span must reconstruct the original
/// character sequence, modulo whitespace and comments.
#[test]
fn lexer_round_trips_a_curated_corpus() {
    let corpus = [
        "let x = 1 + 2;",
        "const s = 'str\\'ing';",
        "function f(a, b = 2, ...rest) { return a; }",
        "for (const [k, v] of pairs) log(k, v);",
        "x?.y?.[0]?.();",
        "`head${a + 1}tail`",
        "/re[g/]ex/gi",
        "class A extends B { get v() { return 1; } }",
        "a === b ? c ?? d : e ** 2",
        "42n + 0x1Fn",
    ];
    for source in corpus {
        let chars: Vec<char> = source.chars().collect();
        let lexer = skua::lexer::Lexer::new(&chars);
        let mut pos = skua::lexer::Position::default();
        let mut rebuilt = String::new();
        while !lexer.is_end(pos) {
            lexer.skip_invisible(&mut pos).unwrap();
            if lexer.is_end(pos) {
                break;
            }
            let before = pos;
            let token = lexer
                .read_string(&mut pos)
                .unwrap()
                .or_else(|| lexer.read_bigint(&mut pos).unwrap())
                .or_else(|| lexer.read_number(&mut pos).unwrap())
                .or_else(|| lexer.read_regex(&mut pos).unwrap())
                .or_else(|| {
                    lexer
                        .read_template_open(&mut pos)
                        .unwrap()
                        .map(|(token, _)| token)
                })
                .or_else(|| {
                    // Outside a real parse, `}` only opens a template
                    // continuation when one actually closes; treat lexing
                    // failures as a non-match and let the symbol reader
                    // take the brace.
                    lexer
                        .read_template_part(&mut pos)
                        .ok()
                        .flatten()
                        .map(|(token, _)| token)
                })
                .or_else(|| lexer.read_identifier(&mut pos).unwrap())
                .or_else(|| lexer.read_keyword(&mut pos).unwrap())
                .or_else(|| lexer.read_symbol(&mut pos).unwrap());
            let Some(token) = token else {
                panic!("no reader matched at {before:?} in {source}");
            };
            rebuilt.push_str(&token.loc.to_string(&chars));
            rebuilt.push(' ');
        }
        let stripped: String = source.split_whitespace().collect::<Vec<_>>().join(" ");
        let rebuilt_normalized: String = rebuilt.split_whitespace().collect::<Vec<_>>().join(" ");
        // Every character of every token is preserved; only whitespace
        // differs.
        let flatten = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        assert_eq!(flatten(&rebuilt_normalized), flatten(&stripped), "{source}");
    }
}

#[test]
fn binding_pass_is_stable_under_reparse() {
    let source = "let a = 1; function f(b){ return a + b; } f(a);";
    let first = skua::parser::parse(source, "t.js").unwrap();
    let second = skua::parser::parse(source, "t.js").unwrap();
    assert_eq!(first.scopes.reference_count(), second.scopes.reference_count());
    assert_eq!(first.scopes.len(), second.scopes.len());
}

#[test]
fn closure_names_identify_free_variables() {
    let source = "let outer = 1; function f(){ let inner = 2; return function g(){ return outer + inner; }; }";
    let parsed = skua::parser::parse(source, "t.js").unwrap();
    // The program scope declares `outer` and `f`; f's scope declares
    // `inner` and the nested g closes over both `outer` and `inner`.
    let root = skua::scope::SourceScopeId(0);
    let f_scope = parsed.scopes.get(root).children[0];
    let free = parsed.scopes.closure_names(f_scope);
    assert_eq!(free, vec!["outer".to_owned()]);
    let g_scope = parsed.scopes.get(f_scope).children[0];
    let free = parsed.scopes.closure_names(g_scope);
    assert!(free.contains(&"outer".to_owned()), "{free:?}");
    assert!(free.contains(&"inner".to_owned()), "{free:?}");
}
